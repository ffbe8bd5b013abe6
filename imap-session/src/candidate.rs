use std::collections::BTreeSet;

use chrono::NaiveDate;
use imap_search::{AddressField, SearchCandidate};
use mailbox_model::{Flag, Uid};

use crate::headers::ParsedHeaders;

/// Adapts one message (plus the view's session-local state) to the
/// shape `imap-search`'s evaluator expects (§4.7). Built fresh per
/// SEARCH, only as deep as the query's `FetchRequirement` demands.
pub struct Candidate<'a> {
    pub uid: Uid,
    pub flags: &'a BTreeSet<Flag>,
    pub recent: bool,
    pub internal_date: NaiveDate,
    pub size: u64,
    pub headers: Option<&'a ParsedHeaders>,
    pub body_text: Option<&'a str>,
}

impl<'a> SearchCandidate for Candidate<'a> {
    fn uid(&self) -> Uid {
        self.uid
    }

    fn permanent_flags(&self) -> &BTreeSet<Flag> {
        self.flags
    }

    fn is_recent(&self) -> bool {
        self.recent
    }

    fn internal_date(&self) -> NaiveDate {
        self.internal_date
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers.and_then(|h| h.header(name))
    }

    fn subject(&self) -> Option<&str> {
        self.headers.and_then(|h| h.subject.as_deref())
    }

    fn addresses(&self, field: AddressField) -> Option<&[String]> {
        self.headers.map(|h| h.addresses(field))
    }

    fn sent_date(&self) -> Option<NaiveDate> {
        self.headers.and_then(|h| h.date)
    }

    fn body_text(&self) -> Option<&str> {
        self.body_text
    }
}
