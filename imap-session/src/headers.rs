//! A minimal RFC 822 header-block scanner — distinct from MIME parsing
//! (multipart bodies, encoded words, content-transfer-decoding), which
//! stays out of scope (§1 Non-goals). This exists only so SEARCH's
//! header-valued keys (`SUBJECT`, `FROM`, `HEADER`, …) have something
//! to test against; it reads the RFC 822 header block of a message and
//! nothing more.

use chrono::NaiveDate;

use imap_search::AddressField;

#[derive(Clone, Debug, Default)]
pub struct ParsedHeaders {
    pub subject: Option<String>,
    pub from: Vec<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub date: Option<NaiveDate>,
    fields: Vec<(String, String)>,
}

impl ParsedHeaders {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn addresses(&self, field: AddressField) -> &[String] {
        match field {
            AddressField::Bcc => &self.bcc,
            AddressField::Cc => &self.cc,
            AddressField::From => &self.from,
            AddressField::To => &self.to,
        }
    }
}

/// Converts a `Message::internal_date` (seconds since epoch) into the
/// calendar date SEARCH's `BEFORE`/`ON`/`SINCE` compare against.
pub fn epoch_to_date(epoch_secs: i64) -> NaiveDate {
    chrono::DateTime::from_timestamp(epoch_secs, 0)
        .map(|dt| dt.date_naive())
        .unwrap_or(NaiveDate::MIN)
}

fn split_addresses(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn unfold(header_block: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in header_block.split('\n') {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        if (raw.starts_with(' ') || raw.starts_with('\t')) && !lines.is_empty() {
            let last = lines.last_mut().unwrap();
            last.push(' ');
            last.push_str(raw.trim_start());
        } else if !raw.is_empty() {
            lines.push(raw.to_string());
        }
    }
    lines
}

/// Splits `content` into its RFC 822 header block and body, parsing the
/// handful of headers SEARCH cares about. The body is returned
/// untouched — decoding content-transfer-encoding is MIME parsing, and
/// stays out of scope.
pub fn parse_headers(content: &[u8]) -> (ParsedHeaders, &[u8]) {
    let boundary = content
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| (i, 4))
        .or_else(|| content.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2)));

    let (header_bytes, body) = match boundary {
        Some((pos, len)) => (&content[..pos], &content[pos + len..]),
        None => (content, &content[content.len()..]),
    };

    let text = String::from_utf8_lossy(header_bytes);
    let mut headers = ParsedHeaders::default();

    for line in unfold(&text) {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        match name.to_ascii_lowercase().as_str() {
            "subject" => headers.subject = Some(value.to_string()),
            "from" => headers.from = split_addresses(value),
            "to" => headers.to = split_addresses(value),
            "cc" => headers.cc = split_addresses(value),
            "bcc" => headers.bcc = split_addresses(value),
            "date" => {
                headers.date = chrono::DateTime::parse_from_rfc2822(value)
                    .ok()
                    .map(|dt| dt.date_naive());
            }
            _ => {}
        }
        headers.fields.push((name.to_string(), value.to_string()));
    }

    (headers, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_headers_and_body_on_blank_line() {
        let msg = b"Subject: hello\r\nFrom: a@example.com\r\n\r\nbody text";
        let (headers, body) = parse_headers(msg);
        assert_eq!(headers.subject.as_deref(), Some("hello"));
        assert_eq!(headers.from, vec!["a@example.com".to_string()]);
        assert_eq!(body, b"body text");
    }

    #[test]
    fn unfolds_continuation_lines() {
        let msg = b"Subject: hello\r\n  world\r\n\r\nbody";
        let (headers, _) = parse_headers(msg);
        assert_eq!(headers.subject.as_deref(), Some("hello world"));
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let msg = b"X-Spam: yes\r\n\r\n";
        let (headers, _) = parse_headers(msg);
        assert_eq!(headers.header("x-spam"), Some("yes"));
    }
}
