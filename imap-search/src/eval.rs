//! Evaluating a parsed [`SearchKey`] tree against one candidate message
//! (§4.7). The session engine decides, from [`SearchKey::requirement`],
//! how much of each message to load before calling [`evaluate`]; the
//! evaluator itself never triggers a fetch.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use mailbox_model::{Flag, Uid};

use crate::model::{AddressField, SearchKey, SearchKeyBody};

/// The bounds a sequence-set-valued key resolves `*` and ranges against
/// (§4.7): the highest sequence number and UID currently in the
/// mailbox, taken once per command rather than per message so a
/// concurrent append mid-SEARCH cannot shift the answer out from under
/// already-evaluated messages.
#[derive(Clone, Copy, Debug)]
pub struct SearchParams {
    pub max_seq: u32,
    pub max_uid: u32,
}

/// The data the evaluator needs about one message. Header and body
/// fields are `Option` because a cheap query (e.g. just `SEEN`) never
/// loads them — see [`SearchKey::requirement`].
pub trait SearchCandidate {
    fn uid(&self) -> Uid;
    fn permanent_flags(&self) -> &BTreeSet<Flag>;
    /// Session-local, not part of `permanent_flags`: looked up via the
    /// view, not the stored message (§3, §4.7).
    fn is_recent(&self) -> bool;
    fn internal_date(&self) -> NaiveDate;
    fn size(&self) -> u64;

    fn header(&self, name: &str) -> Option<&str>;
    fn subject(&self) -> Option<&str>;
    fn addresses(&self, field: AddressField) -> Option<&[String]>;
    fn sent_date(&self) -> Option<NaiveDate>;
    fn body_text(&self) -> Option<&str>;
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn any_address_contains(addrs: Option<&[String]>, needle: &str) -> bool {
    addrs
        .map(|list| list.iter().any(|a| contains_ci(a, needle)))
        .unwrap_or(false)
}

/// Evaluates `key` for the message at sequence number `seq` (its
/// current position; `uid` is read from `candidate` directly).
/// Applies the key's own `NOT` bit last, so `Or`/`KeySet` children
/// apply theirs before being combined.
pub fn evaluate(key: &SearchKey, seq: u32, candidate: &dyn SearchCandidate, params: &SearchParams) -> bool {
    eval_body(&key.body, seq, candidate, params) ^ key.inverse
}

fn eval_body(body: &SearchKeyBody, seq: u32, c: &dyn SearchCandidate, p: &SearchParams) -> bool {
    use SearchKeyBody::*;
    match body {
        All => true,
        Answered => c.permanent_flags().contains(&Flag::new("\\Answered")),
        Deleted => c.permanent_flags().contains(&Flag::deleted()),
        Flagged => c.permanent_flags().contains(&Flag::new("\\Flagged")),
        New => c.is_recent() && !c.permanent_flags().contains(&Flag::seen()),
        Old => !c.is_recent(),
        Recent => c.is_recent(),
        Seen => c.permanent_flags().contains(&Flag::seen()),
        Unanswered => !c.permanent_flags().contains(&Flag::new("\\Answered")),
        Undeleted => !c.permanent_flags().contains(&Flag::deleted()),
        Unflagged => !c.permanent_flags().contains(&Flag::new("\\Flagged")),
        Unseen => !c.permanent_flags().contains(&Flag::seen()),
        Draft => c.permanent_flags().contains(&Flag::new("\\Draft")),
        Undraft => !c.permanent_flags().contains(&Flag::new("\\Draft")),

        Address(field, needle) => any_address_contains(c.addresses(*field), needle),
        Subject(needle) => c.subject().map(|s| contains_ci(s, needle)).unwrap_or(false),
        Body(needle) => c.body_text().map(|b| contains_ci(b, needle)).unwrap_or(false),
        Text(needle) => {
            let in_body = c.body_text().map(|b| contains_ci(b, needle)).unwrap_or(false);
            let in_headers = c.subject().map(|s| contains_ci(s, needle)).unwrap_or(false)
                || any_address_contains(c.addresses(AddressField::From), needle)
                || any_address_contains(c.addresses(AddressField::To), needle)
                || any_address_contains(c.addresses(AddressField::Cc), needle)
                || any_address_contains(c.addresses(AddressField::Bcc), needle);
            in_body || in_headers
        }
        Header(name, needle) => c.header(name).map(|v| contains_ci(v, needle)).unwrap_or(false),

        Before(d) => c.internal_date() < *d,
        On(d) => c.internal_date() == *d,
        Since(d) => c.internal_date() >= *d,
        SentBefore(d) => c.sent_date().map(|sd| sd < *d).unwrap_or(false),
        SentOn(d) => c.sent_date().map(|sd| sd == *d).unwrap_or(false),
        SentSince(d) => c.sent_date().map(|sd| sd >= *d).unwrap_or(false),

        Keyword(f) => c.permanent_flags().contains(f),
        Unkeyword(f) => !c.permanent_flags().contains(f),

        Larger(n) => c.size() > *n,
        Smaller(n) => c.size() < *n,

        SequenceSet { set, uid_mode } => {
            let (id, max) = if *uid_mode {
                (c.uid().get(), p.max_uid)
            } else {
                (seq, p.max_seq)
            };
            set.contains(id, max)
        }

        Or(l, r) => evaluate(l, seq, c, p) || evaluate(r, seq, c, p),
        KeySet(keys) => keys.iter().all(|k| evaluate(k, seq, c, p)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_search_program;

    struct Fixture {
        uid: Uid,
        flags: BTreeSet<Flag>,
        recent: bool,
        internal_date: NaiveDate,
        size: u64,
        subject: Option<String>,
    }

    impl SearchCandidate for Fixture {
        fn uid(&self) -> Uid {
            self.uid
        }
        fn permanent_flags(&self) -> &BTreeSet<Flag> {
            &self.flags
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
        fn header(&self, _name: &str) -> Option<&str> {
            None
        }
        fn subject(&self) -> Option<&str> {
            self.subject.as_deref()
        }
        fn addresses(&self, _field: AddressField) -> Option<&[String]> {
            None
        }
        fn sent_date(&self) -> Option<NaiveDate> {
            None
        }
        fn body_text(&self) -> Option<&str> {
            None
        }
    }

    fn fixture(uid: u32, flags: &[&str], recent: bool, size: u64, subject: &str) -> Fixture {
        Fixture {
            uid: Uid::new(uid).unwrap(),
            flags: flags.iter().map(|f| Flag::new(*f)).collect(),
            recent,
            internal_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            size,
            subject: Some(subject.to_string()),
        }
    }

    #[test]
    fn compound_query_combines_not_or_and_size() {
        let key = parse_search_program(br#"UNSEEN NOT (LARGER 1024 OR SUBJECT "urgent")"#).unwrap();
        let params = SearchParams {
            max_seq: 3,
            max_uid: 3,
        };

        let candidates = vec![
            fixture(1, &[], true, 500, "weekly digest"),
            fixture(2, &[], true, 2048, "weekly digest"),
            fixture(3, &["\\Seen"], false, 100, "urgent"),
        ];

        let matches: Vec<u32> = candidates
            .iter()
            .enumerate()
            .filter(|(i, c)| evaluate(&key, (*i + 1) as u32, *c, &params))
            .map(|(i, _)| (i + 1) as u32)
            .collect();

        assert_eq!(matches, vec![1]);
    }

    #[test]
    fn or_short_circuits_to_true_if_either_side_matches() {
        let key = parse_search_program(b"OR ANSWERED DELETED").unwrap();
        let params = SearchParams { max_seq: 1, max_uid: 1 };
        let c = fixture(1, &["\\Deleted"], false, 10, "x");
        assert!(evaluate(&key, 1, &c, &params));
    }

    #[test]
    fn not_inverts_the_inner_predicate() {
        let key = parse_search_program(b"NOT DELETED").unwrap();
        let params = SearchParams { max_seq: 1, max_uid: 1 };
        let c = fixture(1, &["\\Deleted"], false, 10, "x");
        assert!(!evaluate(&key, 1, &c, &params));
    }

    #[test]
    fn uid_search_key_resolves_against_uid_not_sequence_number() {
        let key = parse_search_program(b"UID 2").unwrap();
        let params = SearchParams { max_seq: 5, max_uid: 9 };
        let c = fixture(2, &[], false, 1, "x");
        // sequence number 7 but UID 2: must match on UID, not seq.
        assert!(evaluate(&key, 7, &c, &params));
    }
}
