//! The per-connection session engine (§4.5): one method per IMAP
//! command, each built on [`SelectedView`] and the shared
//! [`mailbox_model::MailboxSet`].

use std::collections::{BTreeSet, HashMap};
use std::num::NonZeroU32;
use std::sync::Arc;

use mailbox_model::{AppendMessage, Flag, Mailbox, MailboxSet, Message, SequenceSet, Uid, UidValidity};

use crate::candidate::Candidate;
use crate::error::{Error, Result};
use crate::headers;
use crate::view::{RefreshReport, SelectedView};
use crate::wait;

/// STORE's three update modes (§4.5): overwrite, union, or subtract the
/// requested flags against the mailbox's permitted set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreMode {
    Replace,
    Add,
    Remove,
}

/// LIST/LSUB mailbox-name attributes (§4.5). Only `Noselect` has a
/// concrete source in this workspace's scope — the delimiter probe
/// (empty filter) is the one case spec'd concretely enough to test.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attribute {
    Noselect,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListEntry {
    pub name: String,
    pub delimiter: char,
    pub attrs: Vec<Attribute>,
}

#[derive(Clone, Debug)]
pub struct SelectReport {
    pub uid_validity: UidValidity,
    pub next_uid: Uid,
    pub readonly: bool,
    pub permanent_flags: Vec<Flag>,
    pub session_flags: Vec<Flag>,
    pub refresh: RefreshReport,
}

#[derive(Clone, Debug)]
pub struct AppendReport {
    pub uid_validity: UidValidity,
    pub uid: Uid,
}

#[derive(Clone, Debug)]
pub struct CopyUidReport {
    pub uid_validity: UidValidity,
    /// `(source_uid, destination_uid)` pairs, in the order copied —
    /// what APPENDUID/COPYUID report back to the client (§4.5).
    pub mapping: Vec<(Uid, Uid)>,
}

pub struct FetchedMessage<Msg> {
    pub seq: u32,
    pub uid: Uid,
    pub recent: bool,
    pub message: Msg,
}

#[derive(Clone, Debug)]
pub struct StoredMessage {
    pub seq: u32,
    pub uid: Uid,
    pub flags: BTreeSet<Flag>,
    pub recent: bool,
}

/// Dynamic-programming match of a LIST pattern (`%`/`*` wildcards)
/// against a mailbox name: `%` matches any run not containing the
/// hierarchy delimiter, `*` matches any run including it.
pub fn matches_wildcard(pattern: &str, name: &str, delimiter: char) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    let mut dp = vec![vec![false; n.len() + 1]; p.len() + 1];
    dp[0][0] = true;
    for i in 1..=p.len() {
        if matches!(p[i - 1], '*' | '%') {
            dp[i][0] = dp[i - 1][0];
        }
    }
    for i in 1..=p.len() {
        for j in 1..=n.len() {
            dp[i][j] = match p[i - 1] {
                '*' => dp[i - 1][j] || dp[i][j - 1],
                '%' => dp[i - 1][j] || (dp[i][j - 1] && n[j - 1] != delimiter),
                c => dp[i - 1][j - 1] && c == n[j - 1],
            };
        }
    }
    dp[p.len()][n.len()]
}

/// One client's view of the mailbox store: at most one selected
/// mailbox at a time, exactly as IMAP's state machine requires (§2).
pub struct Session<MS: MailboxSet> {
    mailboxes: Arc<MS>,
    selected: Option<SelectedView<MS::Mailbox>>,
}

impl<MS: MailboxSet> Session<MS> {
    pub fn new(mailboxes: Arc<MS>) -> Self {
        Self {
            mailboxes,
            selected: None,
        }
    }

    pub fn is_selected(&self) -> bool {
        self.selected.is_some()
    }

    fn require_selected(&self) -> Result<&SelectedView<MS::Mailbox>> {
        self.selected.as_ref().ok_or(Error::NoMailboxSelected)
    }

    fn require_selected_mut(&mut self) -> Result<&mut SelectedView<MS::Mailbox>> {
        self.selected.as_mut().ok_or(Error::NoMailboxSelected)
    }

    // -- mailbox list management (§4.5) --------------------------------

    /// LIST/LSUB (§4.5). An empty `pattern` is the conventional
    /// "delimiter probe" (RFC 3501 §6.3.8): the client is asking for the
    /// hierarchy delimiter and root name, not enumerating mailboxes, so
    /// it gets back exactly one `\Noselect` entry regardless of what the
    /// backend holds.
    pub async fn list(
        &self,
        reference: &str,
        pattern: &str,
        subscribed_only: bool,
    ) -> Result<Vec<ListEntry>> {
        let delimiter = self.mailboxes.delimiter();

        if pattern.is_empty() {
            return Ok(vec![ListEntry {
                name: String::new(),
                delimiter,
                attrs: vec![Attribute::Noselect],
            }]);
        }

        let mut names = if subscribed_only {
            self.mailboxes.list_subscribed().await?
        } else {
            self.mailboxes.list_mailboxes().await?
        };
        // Seed with INBOX (§4.5): every account has it, independent of
        // whether this particular backend's enumeration already
        // includes it. Only for LIST, not LSUB — LSUB must still only
        // report names the client actually subscribed to.
        if !subscribed_only && !names.iter().any(|n| n.eq_ignore_ascii_case("INBOX")) {
            names.push("INBOX".to_string());
        }

        let full_pattern = format!("{reference}{pattern}");
        Ok(names
            .into_iter()
            .filter(|name| matches_wildcard(&full_pattern, name, delimiter))
            .map(|name| ListEntry {
                name,
                delimiter,
                attrs: Vec::new(),
            })
            .collect())
    }

    pub async fn create(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidMailboxName(name.to_string()));
        }
        self.mailboxes.add_mailbox(name).await?;
        Ok(())
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        if name.eq_ignore_ascii_case("INBOX") {
            return Err(Error::InvalidMailboxName(name.to_string()));
        }
        self.mailboxes.delete_mailbox(name).await?;
        Ok(())
    }

    pub async fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.mailboxes.rename_mailbox(from, to).await?;
        Ok(())
    }

    /// SUBSCRIBE/UNSUBSCRIBE (§4.5). Resolves INBOX first — an Open
    /// Question in spec §9 about what purpose this serves; preserved
    /// faithfully as an existence/liveness probe on the account rather
    /// than dropped, since a backend whose INBOX cannot be resolved has
    /// nothing sensible to subscribe against either.
    pub async fn set_subscribed(&self, name: &str, subscribed: bool) -> Result<()> {
        self.mailboxes.get_mailbox("INBOX", false).await?;
        self.mailboxes.set_subscribed(name, subscribed).await?;
        Ok(())
    }

    // -- selection lifecycle (§4.2, §4.5) -------------------------------

    pub async fn select(&mut self, name: &str, readonly: bool) -> Result<SelectReport> {
        let mailbox = self.mailboxes.get_mailbox(name, false).await?;
        let effective_readonly = readonly || mailbox.readonly();
        let (view, refresh) = SelectedView::select(mailbox, effective_readonly).await?;

        let report = SelectReport {
            uid_validity: view.uid_validity(),
            next_uid: view.mailbox().next_uid(),
            readonly: view.readonly(),
            permanent_flags: view.permanent_flags(),
            session_flags: view.session_flags(),
            refresh,
        };
        self.selected = Some(view);
        Ok(report)
    }

    /// CLOSE/LOGOUT: releases the view (and its [`Registration`],
    /// dropping this session out of `any_selected`).
    pub fn close(&mut self) {
        self.selected = None;
    }

    // -- append, check, idle (§4.4, §4.5) -------------------------------

    pub async fn append(&mut self, name: &str, message: AppendMessage) -> Result<AppendReport> {
        let mailbox = self.mailboxes.get_mailbox(name, true).await?;
        if mailbox.readonly() {
            return Err(Error::ReadOnly);
        }
        let uid_validity = mailbox.uid_validity();
        // A message delivered while nobody has the mailbox open is the
        // only case `\Recent` needs to announce on the backend — a
        // session that already has it selected sees the new message
        // via its own EXISTS growth on its next refresh regardless
        // (§9). But the backend's own bit is deliberately left unset
        // in that branch, so the recent-set's ownership has to land
        // somewhere: if *this* session is the one holding the live
        // view on `mailbox`, it claims the uid directly here, the same
        // way pymap's `dest_selected.session_flags.add_recent(uid)`
        // does at the equivalent APPEND call site.
        let recent = !mailbox.selected_set().any_selected();
        let parsed = mailbox.parse_message(message)?;
        let stored = mailbox.add(parsed, recent).await?;
        mailbox.selected_set().notify_update();

        if !recent {
            if let Some(selected) = self.selected.as_mut() {
                if Arc::ptr_eq(selected.mailbox(), &mailbox) {
                    selected.claim_recent(stored.uid());
                }
            }
        }

        Ok(AppendReport {
            uid_validity,
            uid: stored.uid(),
        })
    }

    /// NOOP/CHECK (§4.5): optionally waits for an update (IDLE's wakeup,
    /// §4.4) or a caller-supplied cancellation event, optionally runs
    /// backend housekeeping, then always refreshes — matching §4.4's
    /// `check_mailbox(view, wait_on?, housekeeping?)` contract exactly,
    /// including that a timeout on the wait is swallowed silently and
    /// the refresh still runs.
    pub async fn check_mailbox(
        &mut self,
        wait_on: Option<&tokio::sync::Notify>,
        housekeeping: bool,
    ) -> Result<RefreshReport> {
        let view = self.require_selected_mut()?;
        if wait_on.is_some() {
            wait::wait_for_update_or_cancel(view.mailbox(), wait_on).await;
        }
        if housekeeping {
            view.mailbox().cleanup().await?;
        }
        view.refresh().await.map_err(Into::into)
    }

    /// Blocks until the selected mailbox changes, a caller-supplied
    /// cancellation event fires, or 10s elapse (§4.4); callers follow
    /// this with [`Session::check_mailbox`] to turn the wakeup into a
    /// concrete report. IDLE's own "wait, then always refresh" shape is
    /// also available directly via `check_mailbox(Some(cancel), false)`.
    pub async fn idle_wait(&self, cancel: Option<&tokio::sync::Notify>) -> Result<()> {
        let view = self.require_selected()?;
        wait::wait_for_update_or_cancel(view.mailbox(), cancel).await;
        Ok(())
    }

    // -- data-bearing commands (§4.5) -----------------------------------

    /// `set_seen` is true when the requested attribute list implies the
    /// implicit `\Seen`-setting semantics of a non-`.PEEK` body fetch
    /// (§4.5): matched messages gain `\Seen` and are persisted, provided
    /// the view is writable.
    pub async fn fetch(
        &mut self,
        set: &SequenceSet,
        uid_addressed: bool,
        set_seen: bool,
    ) -> Result<Vec<FetchedMessage<<MS::Mailbox as Mailbox>::Message>>> {
        let view = self.require_selected_mut()?;
        let hits = view.mailbox().find(set, uid_addressed).await?;
        let mailbox = view.mailbox().clone();

        let mark_seen = set_seen && !view.readonly();
        let mut to_save = Vec::new();
        let mut out = Vec::new();
        for (seq, uid, msg) in hits {
            let Some(mut message) = msg else { continue };
            if mark_seen && !message.permanent_flags().contains(&Flag::seen()) {
                message.permanent_flags_mut().insert(Flag::seen());
                view.record_flags(uid, message.permanent_flags().clone());
                to_save.push(message.clone());
            }
            out.push(FetchedMessage {
                seq: view.seq_of(uid).unwrap_or(seq),
                uid,
                recent: view.is_recent(uid),
                message,
            });
        }
        if !to_save.is_empty() {
            mailbox.save_flags(&to_save).await?;
            mailbox.selected_set().notify_update();
        }
        Ok(out)
    }

    pub async fn search(&self, report_uid: bool, program: &[u8]) -> Result<Vec<u32>> {
        let view = self.require_selected()?;
        let key = imap_search::parse_search_program(program)?;
        let requirement = key.requirement();
        let params = imap_search::SearchParams {
            max_seq: view.max_seq(),
            max_uid: view.max_uid(),
        };

        let bodies: HashMap<Uid, <MS::Mailbox as Mailbox>::Message> =
            if requirement >= imap_search::FetchRequirement::Metadata {
                view.mailbox()
                    .messages()
                    .await?
                    .into_iter()
                    .map(|m| (m.uid(), m))
                    .collect()
            } else {
                HashMap::new()
            };

        let mut hits = Vec::new();
        for (seq, uid, flags) in view.entries() {
            let message = bodies.get(&uid);

            let parsed_headers = if requirement >= imap_search::FetchRequirement::Headers {
                message.map(|m| headers::parse_headers(m.content()))
            } else {
                None
            };
            let body_text = match (&parsed_headers, requirement >= imap_search::FetchRequirement::Body) {
                (Some((_, body)), true) => Some(String::from_utf8_lossy(body).into_owned()),
                _ => None,
            };

            let candidate = Candidate {
                uid,
                flags,
                recent: view.is_recent(uid),
                internal_date: message
                    .map(|m| headers::epoch_to_date(m.internal_date()))
                    .unwrap_or(chrono::NaiveDate::MIN),
                size: message.map(|m| m.size() as u64).unwrap_or(0),
                headers: parsed_headers.as_ref().map(|(h, _)| h),
                body_text: body_text.as_deref(),
            };

            if imap_search::evaluate(&key, seq, &candidate, &params) {
                hits.push(if report_uid { uid.get() } else { seq });
            }
        }
        Ok(hits)
    }

    pub async fn store(
        &mut self,
        set: &SequenceSet,
        uid_addressed: bool,
        mode: StoreMode,
        requested: &[Flag],
    ) -> Result<Vec<StoredMessage>> {
        let view = self.require_selected_mut()?;
        if view.readonly() {
            return Err(Error::ReadOnly);
        }

        let permanent: BTreeSet<Flag> = view.permanent_flags().into_iter().collect();
        let permitted: BTreeSet<Flag> = requested
            .iter()
            .filter(|f| permanent.contains(f))
            .cloned()
            .collect();

        let hits = view.mailbox().find(set, uid_addressed).await?;
        let mailbox = view.mailbox().clone();

        let mut out = Vec::new();
        let mut to_save = Vec::new();
        for (_, uid, msg) in hits {
            let Some(mut msg) = msg else { continue };
            let current = msg.permanent_flags().clone();
            let updated = match mode {
                StoreMode::Replace => permitted.clone(),
                StoreMode::Add => current.union(&permitted).cloned().collect(),
                StoreMode::Remove => current.difference(&permitted).cloned().collect(),
            };
            *msg.permanent_flags_mut() = updated.clone();
            to_save.push(msg);

            view.record_flags(uid, updated.clone());
            out.push(StoredMessage {
                seq: view.seq_of(uid).unwrap_or(0),
                uid,
                flags: updated,
                recent: view.is_recent(uid),
            });
        }
        mailbox.save_flags(&to_save).await?;
        mailbox.selected_set().notify_update();
        Ok(out)
    }

    /// EXPUNGE (§4.5): removes every `\Deleted` message, reporting
    /// their pre-removal sequence numbers highest-first.
    pub async fn expunge(&mut self) -> Result<Vec<u32>> {
        let view = self.require_selected_mut()?;
        if view.readonly() {
            return Err(Error::ReadOnly);
        }

        let deleted: Vec<Uid> = view
            .entries()
            .filter(|(_, _, flags)| flags.contains(&Flag::deleted()))
            .map(|(_, uid, _)| uid)
            .collect();
        let mut seqs: Vec<u32> = deleted.iter().filter_map(|uid| view.seq_of(*uid)).collect();
        seqs.sort_unstable_by(|a, b| b.cmp(a));

        let mailbox = view.mailbox().clone();
        mailbox.delete(&deleted).await?;
        for uid in &deleted {
            view.forget(*uid);
        }
        mailbox.selected_set().notify_update();
        Ok(seqs)
    }

    pub async fn copy(
        &mut self,
        set: &SequenceSet,
        uid_addressed: bool,
        dest_name: &str,
    ) -> Result<CopyUidReport> {
        let hits = {
            let view = self.require_selected()?;
            view.mailbox().find(set, uid_addressed).await?
        };

        let dest = self.mailboxes.get_mailbox(dest_name, true).await?;
        if dest.readonly() {
            return Err(Error::ReadOnly);
        }
        let dest_uid_validity = dest.uid_validity();
        let dest_recent_default = !dest.selected_set().any_selected();

        let mut mapping = Vec::new();
        let mut new_uids = Vec::new();
        for (_, src_uid, msg) in hits {
            let Some(msg) = msg else { continue };
            let append = AppendMessage {
                content: msg.content().to_vec(),
                flags: msg.permanent_flags().iter().cloned().collect(),
                internal_date: Some(msg.internal_date()),
            };
            let parsed = dest.parse_message(append)?;
            let stored = dest.add(parsed, dest_recent_default).await?;
            mapping.push((src_uid, stored.uid()));
            new_uids.push(stored.uid());
        }
        dest.selected_set().notify_update();

        // Same ownership-transfer as `append` (§9): the backend's bit
        // was left unset because a view already exists on `dest`; if
        // it happens to be this session's own selected view, claim the
        // copied uids into it directly rather than relying on a
        // refresh that will never see them as recent.
        if !dest_recent_default {
            if let Some(selected) = self.selected.as_mut() {
                if Arc::ptr_eq(selected.mailbox(), &dest) {
                    for uid in new_uids {
                        selected.claim_recent(uid);
                    }
                }
            }
        }

        Ok(CopyUidReport {
            uid_validity: dest_uid_validity,
            mapping,
        })
    }
}

/// Convenience for callers building a single-id sequence set (e.g. the
/// `r#move` = COPY + STORE \Deleted + EXPUNGE idiom some clients use).
pub fn single_uid_set(uid: Uid) -> SequenceSet {
    SequenceSet::single(NonZeroU32::new(uid.get()).expect("Uid is always nonzero"))
}
