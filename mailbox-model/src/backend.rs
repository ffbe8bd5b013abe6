use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::flag::Flag;
use crate::uid::{Uid, UidValidity};
use crate::Result;

/// A message to be stored via APPEND, before the backend has assigned
/// it a UID (§4.5 APPEND).
#[derive(Clone, Debug)]
pub struct AppendMessage {
    pub content: Vec<u8>,
    pub flags: Vec<Flag>,
    /// Seconds since epoch; `None` means "now".
    pub internal_date: Option<i64>,
}

/// A point-in-time summary of a mailbox, returned alongside a refreshed
/// view by commands that resolve a mailbox object (§4.1, §4.3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailboxSnapshot {
    pub name: String,
    pub uid_validity: UidValidity,
    pub next_uid: Uid,
    pub exists: u32,
    pub readonly: bool,
}

/// A message as the backend stores it: permanent flags are mutable and
/// persisted, the recent bit is transient and owned by at most one
/// session at a time (§3).
pub trait Message: Clone + Send + Sync + 'static {
    fn uid(&self) -> Uid;
    fn permanent_flags(&self) -> &BTreeSet<Flag>;
    fn permanent_flags_mut(&mut self) -> &mut BTreeSet<Flag>;
    fn recent(&self) -> bool;
    fn set_recent(&mut self, recent: bool);
    /// Seconds since epoch.
    fn internal_date(&self) -> i64;
    fn size(&self) -> usize;
    fn content(&self) -> &[u8];
}

/// The registry of all live selected views over one mailbox (§3, §5):
/// tracks whether *any* session currently has the mailbox open (used to
/// decide recent-bit ownership on APPEND/COPY) and hosts the
/// change-notification event views wait on for IDLE/NOOP.
///
/// Sessions do not hand the registry a reference to their view; they
/// just hold a [`Registration`] for as long as the view is open. This
/// keeps `mailbox-model` from needing to know anything about
/// `imap-session`'s view type, mirroring how the source's
/// `selected_set.any_selected` query never inspects the views
/// themselves.
#[derive(Debug, Default)]
pub struct SelectedSet {
    live: Arc<AtomicUsize>,
    updated: Notify,
}

/// RAII handle: a session holds one of these for as long as its view of
/// the mailbox is open. Dropping it (close/logout/reselect) releases
/// the registration.
#[derive(Debug)]
pub struct Registration {
    live: Arc<AtomicUsize>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

impl SelectedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new live view; the returned guard must be kept alive
    /// for as long as the view is selected.
    pub fn register(&self) -> Registration {
        self.live.fetch_add(1, Ordering::AcqRel);
        Registration {
            live: self.live.clone(),
        }
    }

    /// Is any session currently selected on this mailbox? Drives
    /// recent-bit ownership transfer on APPEND/COPY (§4.5, §9).
    pub fn any_selected(&self) -> bool {
        self.live.load(Ordering::Acquire) > 0
    }

    /// Signals that the mailbox changed. Edge-triggered and immediately
    /// reusable: every view currently waiting wakes, and a future wait
    /// blocks again until the next signal (§5).
    pub fn notify_update(&self) {
        self.updated.notify_waiters();
    }

    pub fn updated(&self) -> &Notify {
        &self.updated
    }
}

/// The sole coupling between the session engine and persistent storage
/// (§4.1). One mailbox, as exposed to a single authenticated user.
#[async_trait]
pub trait Mailbox: Send + Sync {
    type Message: Message;

    fn name(&self) -> String;
    fn uid_validity(&self) -> UidValidity;
    fn next_uid(&self) -> Uid;
    fn readonly(&self) -> bool;
    fn permanent_flags(&self) -> Vec<Flag>;
    fn session_flags(&self) -> Vec<Flag>;
    fn selected_set(&self) -> &SelectedSet;

    async fn snapshot(&self) -> Result<MailboxSnapshot>;

    /// All messages, in ascending sequence-number order.
    async fn messages(&self) -> Result<Vec<Self::Message>>;

    /// `(uid, permanent flags, recent)` triples, in ascending UID
    /// order — the minimal data `refresh` needs to reconcile a view
    /// (§4.3): flag changes, and which messages are still carrying an
    /// unclaimed `\Recent` bit.
    async fn items(&self) -> Result<Vec<(Uid, BTreeSet<Flag>, bool)>>;

    /// Clears the backend-level `\Recent` bit for `uids`, transferring
    /// ownership away from whichever session first observes them
    /// (§3, §9): once one session's `refresh` has reported a message
    /// as recent, no later session selecting the mailbox should see it
    /// as recent again.
    async fn clear_recent(&self, uids: &[Uid]) -> Result<()>;

    /// Resolves a sequence set (UID- or sequence-number-addressed per
    /// `uid_mode`) against the current mailbox contents. Yields
    /// `(sequence_number, uid, message)` triples; `message` is `None`
    /// for ids with no current message (§4.1).
    async fn find(
        &self,
        set: &crate::sequence::SequenceSet,
        uid_mode: bool,
    ) -> Result<Vec<(u32, Uid, Option<Self::Message>)>>;

    fn parse_message(&self, append: AppendMessage) -> Result<Self::Message>;

    /// Adds a message, optionally already carrying the recent bit.
    /// Returns the stored message (with its assigned UID).
    async fn add(&self, msg: Self::Message, recent: bool) -> Result<Self::Message>;

    async fn save_flags(&self, msgs: &[Self::Message]) -> Result<()>;

    async fn delete(&self, uids: &[Uid]) -> Result<()>;

    /// Backend-specific housekeeping (compaction, GC, …), invoked
    /// opportunistically by `check_mailbox` (§4.4).
    async fn cleanup(&self) -> Result<()>;
}

/// Manages the set of mailboxes available to one authenticated user
/// (§4.1).
#[async_trait]
pub trait MailboxSet: Send + Sync {
    type Mailbox: Mailbox;

    /// Resolves `name`; fails with `MailboxNotFound` unless `try_create`
    /// and creation is permitted.
    async fn get_mailbox(&self, name: &str, try_create: bool) -> Result<Arc<Self::Mailbox>>;

    async fn list_mailboxes(&self) -> Result<Vec<String>>;
    async fn list_subscribed(&self) -> Result<Vec<String>>;

    async fn add_mailbox(&self, name: &str) -> Result<()>;
    async fn delete_mailbox(&self, name: &str) -> Result<()>;
    async fn rename_mailbox(&self, from: &str, to: &str) -> Result<()>;
    async fn set_subscribed(&self, name: &str, subscribed: bool) -> Result<()>;

    /// The character separating hierarchy levels in mailbox names
    /// (e.g. `/` or `.`), used to evaluate LIST wildcards (§4.5).
    fn delimiter(&self) -> char;
}
