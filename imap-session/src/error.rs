use thiserror::Error;

/// Everything a command dispatch loop needs to turn into a tagged NO/BAD
/// response (§7). Backend failures and search-grammar failures each
/// keep their own variant so the caller can tell a storage problem from
/// a client mistake.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Mailbox(#[from] mailbox_model::Error),

    #[error(transparent)]
    Search(#[from] imap_search::SearchParseError),

    #[error("no mailbox is currently selected")]
    NoMailboxSelected,

    #[error("mailbox is selected read-only")]
    ReadOnly,

    #[error("UIDVALIDITY changed since this mailbox was selected")]
    UidValidityChanged,

    #[error("{0} is not a valid mailbox name")]
    InvalidMailboxName(String),
}

pub type Result<T> = std::result::Result<T, Error>;
