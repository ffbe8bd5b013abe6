//! The selected-mailbox view (§4.2) and the refresh protocol that
//! keeps it in sync with the backend (§4.3).

use std::collections::BTreeSet;
use std::sync::Arc;

use im::OrdMap;
use mailbox_model::{Flag, Mailbox, Registration, Uid, UidValidity};

use crate::error::{Error, Result};

/// What changed the last time this view was reconciled against the
/// backend (§4.3) — the untagged responses a command handler needs to
/// emit, already translated from UIDs to the sequence numbers the
/// wire protocol speaks in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub exists: u32,
    pub recent: u32,
    /// Sequence numbers that vanished, highest first (RFC 3501 3.4:
    /// report each EXPUNGE against the numbering still in effect
    /// before any earlier one in this batch is applied).
    pub expunged: Vec<u32>,
    /// Messages whose flags changed or that are newly visible, as
    /// `(sequence number, uid, flags, is_recent)`.
    pub fetched: Vec<(u32, Uid, BTreeSet<Flag>, bool)>,
}

impl RefreshReport {
    fn is_empty(&self) -> bool {
        self.expunged.is_empty() && self.fetched.is_empty()
    }
}

pub struct SelectedView<Mbx: Mailbox> {
    mailbox: Arc<Mbx>,
    _registration: Registration,
    uid_validity: UidValidity,
    readonly: bool,
    /// UID -> permanent flags, ascending by UID; position is the
    /// sequence number minus one (§4.2).
    known: OrdMap<Uid, BTreeSet<Flag>>,
    /// UIDs this session currently reports as `\Recent`.
    recent: BTreeSet<Uid>,
}

impl<Mbx: Mailbox> SelectedView<Mbx> {
    /// Opens a new view (SELECT/EXAMINE, §4.5) and performs the first
    /// refresh so the caller gets a complete initial snapshot.
    pub async fn select(mailbox: Arc<Mbx>, readonly: bool) -> Result<(Self, RefreshReport)> {
        let registration = mailbox.selected_set().register();
        let uid_validity = mailbox.uid_validity();
        let mut view = Self {
            mailbox,
            _registration: registration,
            uid_validity,
            readonly,
            known: OrdMap::new(),
            recent: BTreeSet::new(),
        };
        let report = view.refresh().await?;
        Ok((view, report))
    }

    pub fn mailbox(&self) -> &Arc<Mbx> {
        &self.mailbox
    }

    pub fn uid_validity(&self) -> UidValidity {
        self.uid_validity
    }

    pub fn readonly(&self) -> bool {
        self.readonly
    }

    pub fn exists(&self) -> u32 {
        self.known.len() as u32
    }

    pub fn recent_count(&self) -> u32 {
        self.recent.len() as u32
    }

    pub fn permanent_flags(&self) -> Vec<Flag> {
        self.mailbox.permanent_flags()
    }

    pub fn session_flags(&self) -> Vec<Flag> {
        self.mailbox.session_flags()
    }

    pub fn flags_of(&self, uid: Uid) -> Option<&BTreeSet<Flag>> {
        self.known.get(&uid)
    }

    pub fn is_recent(&self, uid: Uid) -> bool {
        self.recent.contains(&uid)
    }

    pub fn seq_of(&self, uid: Uid) -> Option<u32> {
        self.known
            .keys()
            .position(|u| *u == uid)
            .map(|pos| (pos + 1) as u32)
    }

    pub fn uid_at(&self, seq: u32) -> Option<Uid> {
        let idx = seq.checked_sub(1)?;
        self.known.keys().nth(idx as usize).copied()
    }

    pub fn max_seq(&self) -> u32 {
        self.exists()
    }

    pub fn max_uid(&self) -> u32 {
        self.known
            .keys()
            .next_back()
            .map(|u| u.get())
            .unwrap_or(0)
    }

    /// All known UIDs in ascending order, paired with their sequence
    /// numbers — the backbone FETCH/SEARCH/STORE walk over.
    pub fn entries(&self) -> impl Iterator<Item = (u32, Uid, &BTreeSet<Flag>)> {
        self.known
            .iter()
            .enumerate()
            .map(|(i, (uid, flags))| ((i + 1) as u32, *uid, flags))
    }

    /// Records a local flag change (STORE, §4.5) without going back to
    /// the backend — the caller already persisted it there and is
    /// updating the view to match so it does not re-report its own
    /// change as if another session had made it.
    pub fn record_flags(&mut self, uid: Uid, flags: BTreeSet<Flag>) {
        self.known.insert(uid, flags);
    }

    pub fn forget(&mut self, uid: Uid) {
        self.known.remove(&uid);
        self.recent.remove(&uid);
    }

    /// Claims `\Recent` ownership of `uid` directly into this view's
    /// session-local set, bypassing the backend (§3, §9). Used by
    /// APPEND/COPY when the destination's backend-level bit was left
    /// unset because a view already existed there (`any_selected()`
    /// was true) and that view turns out to be this one — the
    /// ownership still has to land somewhere, and a later `refresh()`
    /// would never discover it since the backend never marked it
    /// recent in the first place.
    pub fn claim_recent(&mut self, uid: Uid) {
        self.recent.insert(uid);
    }

    /// Reconciles this view against the current backend state (§4.3).
    /// Idempotent: calling it back-to-back with nothing changed yields
    /// an empty report. New messages are claimed as `\Recent` for this
    /// session and immediately cleared on the backend so no later
    /// `select` elsewhere reports them again (§3, §9).
    pub async fn refresh(&mut self) -> Result<RefreshReport> {
        if self.mailbox.uid_validity() != self.uid_validity {
            return Err(Error::UidValidityChanged);
        }

        let items = self.mailbox.items().await?;
        let new_known: OrdMap<Uid, BTreeSet<Flag>> = items
            .iter()
            .map(|(uid, flags, _)| (*uid, flags.clone()))
            .collect();

        let mut expunged: Vec<u32> = self
            .known
            .keys()
            .enumerate()
            .filter(|(_, uid)| !new_known.contains_key(uid))
            .map(|(pos, _)| (pos + 1) as u32)
            .collect();
        expunged.sort_unstable_by(|a, b| b.cmp(a));

        let mut newly_recent = Vec::new();
        let mut fetched = Vec::new();
        for (uid, flags, backend_recent) in &items {
            let previously_known = self.known.contains_key(uid);
            let flags_changed = self
                .known
                .get(uid)
                .map(|old| old != flags)
                .unwrap_or(false);

            // A read-only view reports `\Recent` without claiming
            // ownership of it — EXAMINE must have no side effect on the
            // mailbox, so the bit stays unclaimed for the next SELECT
            // (§4.5 "If not read-only, …").
            if !previously_known && *backend_recent {
                self.recent.insert(*uid);
                if !self.readonly {
                    newly_recent.push(*uid);
                }
            }

            if !previously_known || flags_changed {
                fetched.push((*uid, flags.clone()));
            }
        }

        self.known = new_known;
        if !newly_recent.is_empty() {
            self.mailbox.clear_recent(&newly_recent).await?;
        }

        let fetched = fetched
            .into_iter()
            .filter_map(|(uid, flags)| {
                self.seq_of(uid)
                    .map(|seq| (seq, uid, flags, self.recent.contains(&uid)))
            })
            .collect();

        let report = RefreshReport {
            exists: self.exists(),
            recent: self.recent_count(),
            expunged,
            fetched,
        };
        if report.is_empty() {
            tracing::trace!(mailbox = %self.mailbox.name(), "refresh: no changes");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailbox_model::memory::MemoryMailboxSet;
    use mailbox_model::{AppendMessage, MailboxSet};

    async fn inbox() -> Arc<mailbox_model::memory::MemoryMailbox> {
        let set = MemoryMailboxSet::with_inbox('/').await;
        set.get_mailbox("INBOX", false).await.unwrap()
    }

    #[tokio::test]
    async fn select_on_empty_mailbox_reports_nothing() {
        let mbx = inbox().await;
        let (view, report) = SelectedView::select(mbx, false).await.unwrap();
        assert_eq!(view.exists(), 0);
        assert_eq!(report.exists, 0);
        assert_eq!(report.recent, 0);
        assert!(report.fetched.is_empty());
    }

    #[tokio::test]
    async fn refresh_reports_appended_message_as_recent_then_clears_it() {
        let mbx = inbox().await;
        let (mut view, _) = SelectedView::select(mbx.clone(), false).await.unwrap();

        let msg = mbx
            .parse_message(AppendMessage {
                content: b"hi".to_vec(),
                flags: vec![],
                internal_date: None,
            })
            .unwrap();
        mbx.add(msg, true).await.unwrap();

        let report = view.refresh().await.unwrap();
        assert_eq!(report.exists, 1);
        assert_eq!(report.recent, 1);
        assert!(view.is_recent(Uid::new(1).unwrap()));

        // A second session selecting afterwards must not see it as
        // recent again — ownership already transferred.
        let (other, other_report) = SelectedView::select(mbx, false).await.unwrap();
        assert_eq!(other_report.recent, 0);
        assert!(!other.is_recent(Uid::new(1).unwrap()));
    }

    #[tokio::test]
    async fn examine_does_not_claim_recent_ownership() {
        let mbx = inbox().await;
        let msg = mbx
            .parse_message(AppendMessage {
                content: b"hi".to_vec(),
                flags: vec![],
                internal_date: None,
            })
            .unwrap();
        mbx.add(msg, true).await.unwrap();

        let (examined, report) = SelectedView::select(mbx.clone(), true).await.unwrap();
        assert_eq!(report.recent, 1);
        assert!(examined.is_recent(Uid::new(1).unwrap()));

        // EXAMINE must not have claimed the bit: a later SELECT still
        // sees the message as recent.
        let (_selected, select_report) = SelectedView::select(mbx, false).await.unwrap();
        assert_eq!(select_report.recent, 1);
    }

    #[tokio::test]
    async fn refresh_is_idempotent() {
        let mbx = inbox().await;
        let (mut view, _) = SelectedView::select(mbx, false).await.unwrap();
        let first = view.refresh().await.unwrap();
        let second = view.refresh().await.unwrap();
        assert!(first.is_empty());
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn expunge_is_reported_against_pre_update_sequence_numbers() {
        let mbx = inbox().await;
        for _ in 0..3 {
            let msg = mbx
                .parse_message(AppendMessage {
                    content: b"x".to_vec(),
                    flags: vec![],
                    internal_date: None,
                })
                .unwrap();
            mbx.add(msg, true).await.unwrap();
        }
        let (mut view, _) = SelectedView::select(mbx.clone(), false).await.unwrap();
        mbx.delete(&[Uid::new(1).unwrap(), Uid::new(3).unwrap()])
            .await
            .unwrap();

        let report = view.refresh().await.unwrap();
        // uid 3 was sequence 3, uid 1 was sequence 1 — reported
        // highest-first.
        assert_eq!(report.expunged, vec![3, 1]);
        assert_eq!(view.exists(), 1);
    }
}
