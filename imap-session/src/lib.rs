//! The mailbox session core (§2): a selected-mailbox view with its
//! refresh protocol, the IDLE/NOOP wait primitive, and the per-command
//! session engine built on top of [`mailbox_model`] and
//! [`imap_search`].

pub mod candidate;
pub mod error;
pub mod headers;
pub mod session;
pub mod view;
pub mod wait;

pub use error::{Error, Result};
pub use session::{
    matches_wildcard, single_uid_set, AppendReport, Attribute, CopyUidReport, FetchedMessage,
    ListEntry, Session, SelectReport, StoreMode, StoredMessage,
};
pub use view::{RefreshReport, SelectedView};
