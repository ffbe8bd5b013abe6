//! The SEARCH key grammar (§4.6), hand-rolled with `nom` the way the
//! teacher decodes SASL continuations: small combinators composed with
//! `alt`/`tuple`/`preceded`, one function per grammar production.

use chrono::NaiveDate;
use nom::branch::alt;
use nom::bytes::complete::{tag_no_case, take_while1};
use nom::character::complete::{char, digit1};
use nom::combinator::{map, map_res, opt, value};
use nom::multi::separated_list1;
use nom::sequence::{preceded, separated_pair, tuple};
use nom::Err as NomErr;

use mailbox_model::{Flag, SeqOrUid, Sequence, SequenceSet};

use crate::error::SearchParseError;
use crate::model::{AddressField, SearchKey, SearchKeyBody};

type Input<'a> = &'a [u8];

/// Carries semantic rejections (a system flag used with KEYWORD, an
/// unparsable date) through `nom`'s error machinery instead of
/// collapsing everything to "could not parse".
#[derive(Debug, Clone, PartialEq, Eq)]
enum PErr {
    Generic,
    SystemFlag(String),
    InvalidDate(String),
}

impl<'a> nom::error::ParseError<Input<'a>> for PErr {
    fn from_error_kind(_input: Input<'a>, _kind: nom::error::ErrorKind) -> Self {
        PErr::Generic
    }

    fn append(_input: Input<'a>, _kind: nom::error::ErrorKind, other: Self) -> Self {
        other
    }
}

type PResult<'a, O> = nom::IResult<Input<'a>, O, PErr>;

fn sp0(i: Input) -> PResult<()> {
    value((), nom::bytes::complete::take_while(|c| c == b' '))(i)
}

fn sp1(i: Input) -> PResult<()> {
    value((), take_while1(|c| c == b' '))(i)
}

fn is_atom_char(c: u8) -> bool {
    !matches!(c, b' ' | b'(' | b')' | b'\r' | b'\n' | b'"')
}

fn atom(i: Input) -> PResult<&[u8]> {
    take_while1(is_atom_char)(i)
}

fn quoted_string(i: Input) -> PResult<String> {
    let (mut rest, _) = char('"')(i)?;
    let mut out = Vec::new();
    loop {
        match rest.first() {
            None => return Err(NomErr::Failure(PErr::Generic)),
            Some(b'"') => {
                rest = &rest[1..];
                break;
            }
            Some(b'\\') if rest.len() > 1 => {
                out.push(rest[1]);
                rest = &rest[2..];
            }
            Some(&c) => {
                out.push(c);
                rest = &rest[1..];
            }
        }
    }
    Ok((rest, String::from_utf8_lossy(&out).into_owned()))
}

/// An IMAP `astring`, simplified to the two forms that make sense over
/// an already-materialized buffer: a quoted string or a bare atom.
/// Non-synchronous literals (`{n}\r\n...`) need wire-level continuation
/// handling, which §1 places outside this component, so they are not
/// accepted here.
fn astring(i: Input) -> PResult<String> {
    alt((
        quoted_string,
        map(atom, |b| String::from_utf8_lossy(b).into_owned()),
    ))(i)
}

fn date_literal(i: Input) -> PResult<NaiveDate> {
    let (rest, raw) = astring(i)?;
    match NaiveDate::parse_from_str(&raw, "%d-%b-%Y") {
        Ok(d) => Ok((rest, d)),
        Err(_) => Err(NomErr::Failure(PErr::InvalidDate(raw))),
    }
}

fn flag_literal(i: Input) -> PResult<Flag> {
    map(atom, |b| Flag::new(String::from_utf8_lossy(b).into_owned()))(i)
}

fn integer(i: Input) -> PResult<u64> {
    map_res(digit1, |b: &[u8]| {
        std::str::from_utf8(b).unwrap().parse::<u64>()
    })(i)
}

fn nonzero_u32(i: Input) -> PResult<std::num::NonZeroU32> {
    map_res(digit1, |b: &[u8]| {
        std::str::from_utf8(b)
            .unwrap()
            .parse::<u32>()
            .ok()
            .and_then(std::num::NonZeroU32::new)
            .ok_or(())
    })(i)
}

fn seq_or_uid(i: Input) -> PResult<SeqOrUid> {
    alt((
        value(SeqOrUid::Asterisk, char('*')),
        map(nonzero_u32, SeqOrUid::Value),
    ))(i)
}

fn one_sequence(i: Input) -> PResult<Sequence> {
    alt((
        map(
            separated_pair(seq_or_uid, char(':'), seq_or_uid),
            |(a, b)| Sequence::Range(a, b),
        ),
        map(seq_or_uid, Sequence::Single),
    ))(i)
}

fn sequence_set(i: Input) -> PResult<SequenceSet> {
    map(separated_list1(char(','), one_sequence), SequenceSet)(i)
}

/// One search key, recursively. Production order follows §4.6: `NOT`
/// prefix, a sequence-set literal, a parenthesized conjunction, then
/// the keyword atoms.
fn search_key(i: Input) -> PResult<SearchKey> {
    let (i, _) = sp0(i)?;
    alt((not_key, seqset_key, keyset_key, atom_key))(i)
}

fn not_key(i: Input) -> PResult<SearchKey> {
    map(
        preceded(tuple((tag_no_case("NOT"), sp1)), search_key),
        SearchKey::negate,
    )(i)
}

fn seqset_key(i: Input) -> PResult<SearchKey> {
    map(sequence_set, |set| {
        SearchKey::new(SearchKeyBody::SequenceSet {
            set,
            uid_mode: false,
        })
    })(i)
}

fn keyset_key(i: Input) -> PResult<SearchKey> {
    let (i, _) = char('(')(i)?;
    let (i, _) = sp0(i)?;
    let (i, keys) = separated_list1(sp1, search_key)(i)?;
    let (i, _) = sp0(i)?;
    let (i, _) = char(')')(i)?;
    Ok((i, SearchKey::new(SearchKeyBody::KeySet(keys))))
}

fn atom_key(i: Input) -> PResult<SearchKey> {
    let (i, word) = atom(i)?;
    let upper = String::from_utf8_lossy(word).to_ascii_uppercase();
    dispatch(&upper, i)
}

fn dispatch<'a>(keyword: &str, i: Input<'a>) -> PResult<'a, SearchKey> {
    use SearchKeyBody::*;

    macro_rules! nullary {
        ($i:expr, $body:expr) => {
            Ok(($i, SearchKey::new($body)))
        };
    }
    macro_rules! astring_arg {
        ($i:expr, $wrap:expr) => {{
            let (i, _) = sp1($i)?;
            let (i, s) = astring(i)?;
            Ok((i, SearchKey::new($wrap(s))))
        }};
    }
    macro_rules! date_arg {
        ($i:expr, $wrap:expr) => {{
            let (i, _) = sp1($i)?;
            let (i, d) = date_literal(i)?;
            Ok((i, SearchKey::new($wrap(d))))
        }};
    }
    macro_rules! int_arg {
        ($i:expr, $wrap:expr) => {{
            let (i, _) = sp1($i)?;
            let (i, n) = integer(i)?;
            Ok((i, SearchKey::new($wrap(n))))
        }};
    }

    match keyword {
        "ALL" => nullary!(i, All),
        "ANSWERED" => nullary!(i, Answered),
        "DELETED" => nullary!(i, Deleted),
        "FLAGGED" => nullary!(i, Flagged),
        "NEW" => nullary!(i, New),
        "OLD" => nullary!(i, Old),
        "RECENT" => nullary!(i, Recent),
        "SEEN" => nullary!(i, Seen),
        "UNANSWERED" => nullary!(i, Unanswered),
        "UNDELETED" => nullary!(i, Undeleted),
        "UNFLAGGED" => nullary!(i, Unflagged),
        "UNSEEN" => nullary!(i, Unseen),
        "DRAFT" => nullary!(i, Draft),
        "UNDRAFT" => nullary!(i, Undraft),

        "BCC" => astring_arg!(i, |s| Address(AddressField::Bcc, s)),
        "CC" => astring_arg!(i, |s| Address(AddressField::Cc, s)),
        "FROM" => astring_arg!(i, |s| Address(AddressField::From, s)),
        "TO" => astring_arg!(i, |s| Address(AddressField::To, s)),
        "SUBJECT" => astring_arg!(i, Subject),
        "BODY" => astring_arg!(i, Body),
        "TEXT" => astring_arg!(i, Text),

        "HEADER" => {
            let (i, _) = sp1(i)?;
            let (i, name) = astring(i)?;
            let (i, _) = sp1(i)?;
            let (i, value) = astring(i)?;
            Ok((i, SearchKey::new(Header(name, value))))
        }

        "BEFORE" => date_arg!(i, Before),
        "ON" => date_arg!(i, On),
        "SINCE" => date_arg!(i, Since),
        "SENTBEFORE" => date_arg!(i, SentBefore),
        "SENTON" => date_arg!(i, SentOn),
        "SENTSINCE" => date_arg!(i, SentSince),

        "KEYWORD" => {
            let (i, _) = sp1(i)?;
            let (i, flag) = flag_literal(i)?;
            if flag.is_system() {
                return Err(NomErr::Failure(PErr::SystemFlag(flag.as_str().to_string())));
            }
            Ok((i, SearchKey::new(Keyword(flag))))
        }
        "UNKEYWORD" => {
            let (i, _) = sp1(i)?;
            let (i, flag) = flag_literal(i)?;
            if flag.is_system() {
                return Err(NomErr::Failure(PErr::SystemFlag(flag.as_str().to_string())));
            }
            Ok((i, SearchKey::new(Unkeyword(flag))))
        }

        "LARGER" => int_arg!(i, Larger),
        "SMALLER" => int_arg!(i, Smaller),

        "UID" => {
            let (i, _) = sp1(i)?;
            let (i, set) = sequence_set(i)?;
            Ok((
                i,
                SearchKey::new(SequenceSet {
                    set,
                    uid_mode: true,
                }),
            ))
        }

        "OR" => {
            let (i, _) = sp1(i)?;
            let (i, left) = search_key(i)?;
            let (i, _) = sp1(i)?;
            let (i, right) = search_key(i)?;
            Ok((i, SearchKey::new(Or(Box::new(left), Box::new(right)))))
        }

        _ => Err(NomErr::Error(PErr::Generic)),
    }
}

/// Parses one search key, returning the unconsumed remainder (§4.6).
pub fn parse_one(input: &[u8]) -> Result<(SearchKey, &[u8]), SearchParseError> {
    match search_key(input) {
        Ok((rest, key)) => Ok((key, rest)),
        Err(e) => Err(to_parse_error(input, e)),
    }
}

/// Parses a full SEARCH program: a space-separated list of one or more
/// top-level search keys, implicitly ANDed (the same conjunction the
/// grammar already gives parenthesized lists). A single key is
/// returned unwrapped so `requirement()`/`evaluate()` do not pay for an
/// unnecessary `KeySet` wrapper on the common case.
pub fn parse_search_program(input: &[u8]) -> Result<SearchKey, SearchParseError> {
    let trimmed = trim_leading_space(input);
    if trimmed.is_empty() {
        return Err(SearchParseError::Empty);
    }

    let parse_all = tuple((
        separated_list1(sp1, search_key),
        opt(sp0),
    ));

    match parse_all(trimmed) {
        Ok((rest, (mut keys, _))) => {
            if !rest.is_empty() {
                return Err(SearchParseError::TrailingInput(
                    String::from_utf8_lossy(rest).into_owned(),
                ));
            }
            if keys.len() == 1 {
                Ok(keys.remove(0))
            } else {
                Ok(SearchKey::new(SearchKeyBody::KeySet(keys)))
            }
        }
        Err(e) => Err(to_parse_error(trimmed, e)),
    }
}

fn trim_leading_space(input: &[u8]) -> &[u8] {
    let mut i = 0;
    while i < input.len() && input[i] == b' ' {
        i += 1;
    }
    &input[i..]
}

fn to_parse_error(original: &[u8], e: NomErr<PErr>) -> SearchParseError {
    match e {
        NomErr::Error(PErr::SystemFlag(f)) | NomErr::Failure(PErr::SystemFlag(f)) => {
            SearchParseError::SystemFlagAsKeyword(f)
        }
        NomErr::Error(PErr::InvalidDate(d)) | NomErr::Failure(PErr::InvalidDate(d)) => {
            SearchParseError::InvalidDate(d)
        }
        _ => SearchParseError::NotParseable(String::from_utf8_lossy(original).into_owned()),
    }
}
