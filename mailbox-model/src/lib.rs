pub mod backend;
pub mod error;
pub mod flag;
pub mod memory;
pub mod sequence;
pub mod uid;

pub use backend::{AppendMessage, Mailbox, MailboxSet, MailboxSnapshot, Message, Registration, SelectedSet};
pub use error::Error;
pub use flag::Flag;
pub use sequence::{SeqOrUid, Sequence, SequenceSet};
pub use uid::{Uid, UidValidity};

pub type Result<T> = std::result::Result<T, Error>;
