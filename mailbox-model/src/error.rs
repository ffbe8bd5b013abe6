use thiserror::Error;

/// Error kinds the session engine can recover from (§7).
///
/// `TimeoutError` has no variant here: it never leaves the wait/notify
/// primitive, so there is nothing for callers to match on.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("mailbox not found")]
    MailboxNotFound,
    #[error("mailbox is read-only")]
    MailboxReadOnly,
}
