use std::num::NonZeroU32;

/// One endpoint of a sequence range: an explicit id or `*` (meaning
/// "the largest value currently known", resolved at evaluation time so
/// that `*` still means something sensible if the mailbox grows
/// mid-command, per §4.7).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeqOrUid {
    Value(NonZeroU32),
    Asterisk,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sequence {
    Single(SeqOrUid),
    Range(SeqOrUid, SeqOrUid),
}

/// An IMAP sequence-set expression: a non-empty list of single ids or
/// ranges, each possibly open-ended with `*` (glossary: "Sequence set").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequenceSet(pub Vec<Sequence>);

impl SequenceSet {
    /// `1:*` — matches everything.
    pub fn all() -> Self {
        Self(vec![Sequence::Range(
            SeqOrUid::Value(NonZeroU32::MIN),
            SeqOrUid::Asterisk,
        )])
    }

    pub fn single(v: NonZeroU32) -> Self {
        Self(vec![Sequence::Single(SeqOrUid::Value(v))])
    }

    /// Resolves this set against the caller-supplied upper bound
    /// (`max_seq` or `max_uid` from `SearchParams`/the backend snapshot,
    /// §4.7), returning the sorted, deduplicated list of concrete ids.
    /// A bound of `0` (nothing exists yet) yields an empty list.
    pub fn resolve(&self, max: u32) -> Vec<u32> {
        let mut out: Vec<u32> = self
            .0
            .iter()
            .flat_map(|seq| resolve_one(seq, max))
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// True iff `id` (sequence number or UID, depending on what `max`
    /// represents) is covered by this set.
    pub fn contains(&self, id: u32, max: u32) -> bool {
        self.0.iter().any(|seq| contains_one(seq, id, max))
    }
}

fn value_of(v: SeqOrUid, max: u32) -> u32 {
    match v {
        SeqOrUid::Value(n) => n.get(),
        SeqOrUid::Asterisk => max,
    }
}

fn resolve_one(seq: &Sequence, max: u32) -> Vec<u32> {
    if max == 0 {
        return Vec::new();
    }
    match seq {
        Sequence::Single(v) => {
            let v = value_of(*v, max);
            if v <= max {
                vec![v]
            } else {
                Vec::new()
            }
        }
        Sequence::Range(a, b) => {
            let mut lo = value_of(*a, max);
            let mut hi = value_of(*b, max);
            if lo > hi {
                std::mem::swap(&mut lo, &mut hi);
            }
            hi = hi.min(max);
            if lo > hi {
                Vec::new()
            } else {
                (lo..=hi).collect()
            }
        }
    }
}

fn contains_one(seq: &Sequence, id: u32, max: u32) -> bool {
    match seq {
        Sequence::Single(v) => value_of(*v, max) == id,
        Sequence::Range(a, b) => {
            let mut lo = value_of(*a, max);
            let mut hi = value_of(*b, max);
            if lo > hi {
                std::mem::swap(&mut lo, &mut hi);
            }
            id >= lo && id <= hi
        }
    }
}
