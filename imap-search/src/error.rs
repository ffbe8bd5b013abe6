use thiserror::Error;

/// Failure modes of the SEARCH grammar (§4.6, §7). All are the client's
/// fault (a malformed command), never the backend's.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchParseError {
    #[error("could not parse a search key from {0:?}")]
    NotParseable(String),
    #[error("{0} is a system flag and cannot be used with KEYWORD/UNKEYWORD")]
    SystemFlagAsKeyword(String),
    #[error("invalid date literal {0:?}, expected DD-Mon-YYYY")]
    InvalidDate(String),
    #[error("trailing input after a complete search program: {0:?}")]
    TrailingInput(String),
    #[error("empty search program")]
    Empty,
}
