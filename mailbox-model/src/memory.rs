//! A minimal, in-process backend implementing the [`MailboxSet`]/[`Mailbox`]
//! contract. Not a mandated storage format (§1 Non-goals) — it exists so
//! the session engine has a concrete backend to run its tests against,
//! the same role `aero-user`'s `MemDb` plays for the login/storage
//! interfaces elsewhere in this ecosystem.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::backend::{AppendMessage, Mailbox, MailboxSet, MailboxSnapshot, Message, SelectedSet};
use crate::error::Error;
use crate::flag::Flag;
use crate::sequence::SequenceSet;
use crate::uid::{Uid, UidValidity};
use crate::Result;

#[derive(Clone, Debug)]
pub struct MemoryMessage {
    uid: Uid,
    flags: BTreeSet<Flag>,
    recent: bool,
    internal_date: i64,
    content: Vec<u8>,
}

impl Message for MemoryMessage {
    fn uid(&self) -> Uid {
        self.uid
    }

    fn permanent_flags(&self) -> &BTreeSet<Flag> {
        &self.flags
    }

    fn permanent_flags_mut(&mut self) -> &mut BTreeSet<Flag> {
        &mut self.flags
    }

    fn recent(&self) -> bool {
        self.recent
    }

    fn set_recent(&mut self, recent: bool) {
        self.recent = recent;
    }

    fn internal_date(&self) -> i64 {
        self.internal_date
    }

    fn size(&self) -> usize {
        self.content.len()
    }

    fn content(&self) -> &[u8] {
        &self.content
    }
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

struct Inner {
    name: String,
    messages: BTreeMap<Uid, MemoryMessage>,
    next_uid: Uid,
    uid_validity: UidValidity,
}

pub struct MemoryMailbox {
    inner: Mutex<Inner>,
    readonly: bool,
    selected_set: SelectedSet,
}

impl MemoryMailbox {
    fn new(name: impl Into<String>, uid_validity: u32) -> Self {
        Self::with_readonly(name, uid_validity, false)
    }

    fn with_readonly(name: impl Into<String>, uid_validity: u32, readonly: bool) -> Self {
        Self {
            inner: Mutex::new(Inner {
                name: name.into(),
                messages: BTreeMap::new(),
                next_uid: Uid::new(1).unwrap(),
                uid_validity: UidValidity::new(uid_validity.max(1)).unwrap(),
            }),
            readonly,
            selected_set: SelectedSet::new(),
        }
    }
}

#[async_trait]
impl Mailbox for MemoryMailbox {
    type Message = MemoryMessage;

    fn name(&self) -> String {
        self.inner.lock().unwrap().name.clone()
    }

    fn uid_validity(&self) -> UidValidity {
        self.inner.lock().unwrap().uid_validity
    }

    fn next_uid(&self) -> Uid {
        self.inner.lock().unwrap().next_uid
    }

    fn readonly(&self) -> bool {
        self.readonly
    }

    fn permanent_flags(&self) -> Vec<Flag> {
        vec![
            Flag::new("\\Answered"),
            Flag::new("\\Flagged"),
            Flag::new("\\Deleted"),
            Flag::new("\\Draft"),
            Flag::seen(),
        ]
    }

    fn session_flags(&self) -> Vec<Flag> {
        vec![Flag::recent()]
    }

    fn selected_set(&self) -> &SelectedSet {
        &self.selected_set
    }

    async fn snapshot(&self) -> Result<MailboxSnapshot> {
        let g = self.inner.lock().unwrap();
        Ok(MailboxSnapshot {
            name: g.name.clone(),
            uid_validity: g.uid_validity,
            next_uid: g.next_uid,
            exists: g.messages.len() as u32,
            readonly: self.readonly,
        })
    }

    async fn messages(&self) -> Result<Vec<MemoryMessage>> {
        Ok(self.inner.lock().unwrap().messages.values().cloned().collect())
    }

    async fn items(&self) -> Result<Vec<(Uid, BTreeSet<Flag>, bool)>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .messages
            .iter()
            .map(|(uid, m)| (*uid, m.flags.clone(), m.recent))
            .collect())
    }

    async fn clear_recent(&self, uids: &[Uid]) -> Result<()> {
        let mut g = self.inner.lock().unwrap();
        for uid in uids {
            if let Some(m) = g.messages.get_mut(uid) {
                m.recent = false;
            }
        }
        Ok(())
    }

    async fn find(
        &self,
        set: &SequenceSet,
        uid_mode: bool,
    ) -> Result<Vec<(u32, Uid, Option<MemoryMessage>)>> {
        let g = self.inner.lock().unwrap();
        let ordered: Vec<(Uid, &MemoryMessage)> = g.messages.iter().map(|(u, m)| (*u, m)).collect();

        if uid_mode {
            let max_uid = ordered.last().map(|(u, _)| u.get()).unwrap_or(0);
            Ok(set
                .resolve(max_uid)
                .into_iter()
                .filter_map(|raw| {
                    let uid = Uid::new(raw)?;
                    match ordered.iter().position(|(u, _)| *u == uid) {
                        Some(pos) => Some(((pos + 1) as u32, uid, Some(ordered[pos].1.clone()))),
                        // UID no longer present (already expunged, or never existed): a
                        // miss the caller can still report against (e.g. STORE's empty
                        // effective flag set, §4.5), with no meaningful sequence number.
                        None => Some((0, uid, None)),
                    }
                })
                .collect())
        } else {
            let max_seq = ordered.len() as u32;
            Ok(set
                .resolve(max_seq)
                .into_iter()
                .filter_map(|seq| {
                    let (uid, msg) = ordered.get((seq - 1) as usize)?;
                    Some((seq, *uid, Some((*msg).clone())))
                })
                .collect())
        }
    }

    fn parse_message(&self, append: AppendMessage) -> Result<MemoryMessage> {
        Ok(MemoryMessage {
            uid: Uid::new(1).unwrap(),
            flags: append.flags.into_iter().collect(),
            recent: false,
            internal_date: append.internal_date.unwrap_or_else(now),
            content: append.content,
        })
    }

    async fn add(&self, mut msg: MemoryMessage, recent: bool) -> Result<MemoryMessage> {
        let mut g = self.inner.lock().unwrap();
        let uid = g.next_uid;
        msg.uid = uid;
        msg.recent = recent;
        g.messages.insert(uid, msg.clone());
        g.next_uid = Uid::new(uid.get() + 1).unwrap();
        Ok(msg)
    }

    async fn save_flags(&self, msgs: &[MemoryMessage]) -> Result<()> {
        let mut g = self.inner.lock().unwrap();
        for m in msgs {
            if let Some(slot) = g.messages.get_mut(&m.uid()) {
                *slot = m.clone();
            }
        }
        Ok(())
    }

    async fn delete(&self, uids: &[Uid]) -> Result<()> {
        let mut g = self.inner.lock().unwrap();
        for uid in uids {
            g.messages.remove(uid);
        }
        tracing::debug!(mailbox = %g.name, count = uids.len(), "deleted messages");
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        tracing::trace!(mailbox = %self.name(), "housekeeping: nothing to do for an in-memory mailbox");
        Ok(())
    }
}

pub struct MemoryMailboxSet {
    delimiter: char,
    mailboxes: Mutex<HashMap<String, Arc<MemoryMailbox>>>,
    subscribed: Mutex<BTreeSet<String>>,
    next_uidvalidity: Mutex<u32>,
}

impl MemoryMailboxSet {
    pub fn new(delimiter: char) -> Self {
        Self {
            delimiter,
            mailboxes: Mutex::new(HashMap::new()),
            subscribed: Mutex::new(BTreeSet::new()),
            next_uidvalidity: Mutex::new(1),
        }
    }

    /// Convenience constructor matching the one mailbox IMAP guarantees
    /// always exists.
    pub async fn with_inbox(delimiter: char) -> Self {
        let set = Self::new(delimiter);
        set.add_mailbox("INBOX").await.expect("create INBOX");
        set
    }

    /// Creates `name` as a mailbox the backend itself marks read-only
    /// (e.g. a shared/public folder), independent of whether the
    /// session asked for EXAMINE — used to test §4.5's `MailboxReadOnly`
    /// failure path for APPEND/COPY destinations.
    pub async fn add_readonly_mailbox(&self, name: &str) {
        let mut mailboxes = self.mailboxes.lock().unwrap();
        if mailboxes.contains_key(name) {
            return;
        }
        let uid_validity = {
            let mut next = self.next_uidvalidity.lock().unwrap();
            let v = *next;
            *next += 1;
            v
        };
        mailboxes.insert(
            name.to_string(),
            Arc::new(MemoryMailbox::with_readonly(name, uid_validity, true)),
        );
    }
}

#[async_trait]
impl MailboxSet for MemoryMailboxSet {
    type Mailbox = MemoryMailbox;

    async fn get_mailbox(&self, name: &str, try_create: bool) -> Result<Arc<MemoryMailbox>> {
        if let Some(mbx) = self.mailboxes.lock().unwrap().get(name) {
            return Ok(mbx.clone());
        }
        if try_create {
            self.add_mailbox(name).await?;
            return self
                .mailboxes
                .lock()
                .unwrap()
                .get(name)
                .cloned()
                .ok_or(Error::MailboxNotFound);
        }
        Err(Error::MailboxNotFound)
    }

    async fn list_mailboxes(&self) -> Result<Vec<String>> {
        Ok(self.mailboxes.lock().unwrap().keys().cloned().collect())
    }

    async fn list_subscribed(&self) -> Result<Vec<String>> {
        Ok(self.subscribed.lock().unwrap().iter().cloned().collect())
    }

    async fn add_mailbox(&self, name: &str) -> Result<()> {
        let mut mailboxes = self.mailboxes.lock().unwrap();
        if mailboxes.contains_key(name) {
            return Ok(());
        }
        let uid_validity = {
            let mut next = self.next_uidvalidity.lock().unwrap();
            let v = *next;
            *next += 1;
            v
        };
        mailboxes.insert(name.to_string(), Arc::new(MemoryMailbox::new(name, uid_validity)));
        tracing::debug!(%name, %uid_validity, "created mailbox");
        Ok(())
    }

    async fn delete_mailbox(&self, name: &str) -> Result<()> {
        let removed = self.mailboxes.lock().unwrap().remove(name);
        match removed {
            Some(_) => {
                tracing::debug!(%name, "deleted mailbox");
                Ok(())
            }
            None => {
                tracing::error!(%name, "delete_mailbox: no such mailbox");
                Err(Error::MailboxNotFound)
            }
        }
    }

    async fn rename_mailbox(&self, from: &str, to: &str) -> Result<()> {
        let mut mailboxes = self.mailboxes.lock().unwrap();
        let mbx = mailboxes.remove(from).ok_or(Error::MailboxNotFound)?;
        mbx.inner.lock().unwrap().name = to.to_string();
        mailboxes.insert(to.to_string(), mbx);
        Ok(())
    }

    async fn set_subscribed(&self, name: &str, subscribed: bool) -> Result<()> {
        let mut subs = self.subscribed.lock().unwrap();
        if subscribed {
            subs.insert(name.to_string());
        } else {
            subs.remove(name);
        }
        Ok(())
    }

    fn delimiter(&self) -> char {
        self.delimiter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_assigns_increasing_uids() {
        let set = MemoryMailboxSet::with_inbox('/').await;
        let mbx = set.get_mailbox("INBOX", false).await.unwrap();

        for i in 0..3 {
            let msg = mbx
                .parse_message(AppendMessage {
                    content: format!("body {i}").into_bytes(),
                    flags: vec![],
                    internal_date: None,
                })
                .unwrap();
            let stored = mbx.add(msg, true).await.unwrap();
            assert_eq!(stored.uid().get(), i + 1);
        }

        assert_eq!(mbx.next_uid().get(), 4);
        assert_eq!(mbx.snapshot().await.unwrap().exists, 3);
    }

    #[tokio::test]
    async fn find_reports_uid_gaps_as_misses() {
        let set = MemoryMailboxSet::with_inbox('/').await;
        let mbx = set.get_mailbox("INBOX", false).await.unwrap();

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
        mbx.delete(&[Uid::new(2).unwrap()]).await.unwrap();

        let hits = mbx.find(&SequenceSet::all(), true).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits
            .iter()
            .any(|(seq, uid, msg)| *seq == 0 && uid.get() == 2 && msg.is_none()));
    }
}
