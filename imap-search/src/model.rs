use chrono::NaiveDate;
use mailbox_model::{Flag, SequenceSet};

/// How much of a message the evaluator needs in hand before it can test
/// a key against it (§4.6, §4.7, §9 "Polymorphism of search filters").
/// Ordered from cheapest to most expensive so a tree's overall
/// requirement is the max of its parts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum FetchRequirement {
    /// Sequence numbers, UIDs, and flags the session already tracks.
    None,
    /// Size, internal date, stored flags not already in the view.
    Metadata,
    /// Parsed header fields (From/To/Cc/Bcc/Subject/Date/arbitrary).
    Headers,
    /// Message body text.
    Body,
}

/// One parsed SEARCH key: a keyword tag carrying its typed filter
/// payload, plus the `NOT` bit (§4.6). The parser picks the variant;
/// the evaluator pattern-matches it. No dynamic type introspection.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchKey {
    pub body: SearchKeyBody,
    pub inverse: bool,
}

impl SearchKey {
    pub fn new(body: SearchKeyBody) -> Self {
        Self {
            body,
            inverse: false,
        }
    }

    /// Applies `NOT`: toggles the inverse bit without touching the body.
    pub fn negate(self) -> Self {
        Self {
            body: self.body,
            inverse: !self.inverse,
        }
    }

    pub fn requirement(&self) -> FetchRequirement {
        self.body.requirement()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressField {
    Bcc,
    Cc,
    From,
    To,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SearchKeyBody {
    All,
    Answered,
    Deleted,
    Flagged,
    New,
    Old,
    Recent,
    Seen,
    Unanswered,
    Undeleted,
    Unflagged,
    Unseen,
    Draft,
    Undraft,

    Address(AddressField, String),
    Subject(String),
    Body(String),
    Text(String),
    Header(String, String),

    Before(NaiveDate),
    On(NaiveDate),
    Since(NaiveDate),
    SentBefore(NaiveDate),
    SentOn(NaiveDate),
    SentSince(NaiveDate),

    Keyword(Flag),
    Unkeyword(Flag),

    Larger(u64),
    Smaller(u64),

    /// A sequence-set literal. `uid_mode` distinguishes a bare
    /// sequence-set (sequence numbers) from one following `UID`
    /// (UIDs) — both carry the same `SEQSET` tag (§4.6).
    SequenceSet { set: SequenceSet, uid_mode: bool },

    Or(Box<SearchKey>, Box<SearchKey>),

    /// A parenthesized list of sub-keys, or the implicit top-level
    /// list of space-separated keys (§4.6): both are a conjunction.
    KeySet(Vec<SearchKey>),
}

impl SearchKeyBody {
    pub fn requirement(&self) -> FetchRequirement {
        use FetchRequirement::*;
        use SearchKeyBody::*;
        match self {
            All | SequenceSet { .. } => None,
            KeySet(keys) => keys
                .iter()
                .map(SearchKey::requirement)
                .max()
                .unwrap_or(FetchRequirement::None),
            Or(l, r) => l.requirement().max(r.requirement()),
            Address(..) | Subject(_) | Header(..) | SentBefore(_) | SentOn(_) | SentSince(_) => {
                Headers
            }
            Body(_) | Text(_) => FetchRequirement::Body,
            _ => Metadata,
        }
    }
}
