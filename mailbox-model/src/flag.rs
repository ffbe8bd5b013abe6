use std::fmt;

/// The well-known IMAP system flags, plus the "keyword" bucket for
/// anything else. Flags are stored as plain strings in the index
/// (mirroring the backend's own representation) but classified here so
/// SEARCH/STORE/KEYWORD can tell a system flag from a keyword.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Flag(String);

pub const SEEN: &str = "\\Seen";
pub const ANSWERED: &str = "\\Answered";
pub const FLAGGED: &str = "\\Flagged";
pub const DELETED: &str = "\\Deleted";
pub const DRAFT: &str = "\\Draft";
pub const RECENT: &str = "\\Recent";

const SYSTEM_FLAGS: [&str; 6] = [SEEN, ANSWERED, FLAGGED, DELETED, DRAFT, RECENT];

impl Flag {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn seen() -> Self {
        Self::new(SEEN)
    }

    pub fn deleted() -> Self {
        Self::new(DELETED)
    }

    pub fn recent() -> Self {
        Self::new(RECENT)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the backslash-prefixed flags defined by RFC 3501,
    /// i.e. everything that is not a client-defined keyword.
    pub fn is_system(&self) -> bool {
        SYSTEM_FLAGS.iter().any(|f| f.eq_ignore_ascii_case(&self.0))
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Flag {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Flag {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_flags_are_recognized_case_insensitively() {
        assert!(Flag::new("\\Seen").is_system());
        assert!(Flag::new("\\DELETED").is_system());
        assert!(!Flag::new("$Important").is_system());
        assert!(!Flag::new("custom-tag").is_system());
    }
}
