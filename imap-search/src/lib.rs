//! The IMAP4rev1 SEARCH key grammar: model, recursive-descent parser,
//! and cost-aware evaluator (§4.6, §4.7). Deliberately ignorant of any
//! particular backend — it consumes a [`SearchCandidate`] the session
//! engine builds from whatever it already loaded.

pub mod error;
pub mod eval;
pub mod model;
pub mod parser;

pub use error::SearchParseError;
pub use eval::{evaluate, SearchCandidate, SearchParams};
pub use model::{AddressField, FetchRequirement, SearchKey, SearchKeyBody};
pub use parser::{parse_one, parse_search_program};
