//! ADIF-style `<TAG:len>value` field handling.
//!
//! JS8Call reports logged contacts as a blob of length-prefixed fields, and
//! every downstream logger we feed expects the same encoding back. This
//! module extracts single fields from free text and encodes records.
//!
//! # Format
//!
//! ```text
//! <CALL:4>W1AW <MODE:4>MFSK <SUBMODE:3>JS8 <FREQ:9>14.078000 <EOR>
//! ```

use nom::{
    IResult, Parser,
    character::complete::{char, digit1, space0},
    combinator::map_res,
    sequence::{delimited, terminated},
};

use crate::text::find_ignore_case_within;

/// Parse the `len>` part that follows `<TAG:`.
fn parse_length(input: &str) -> IResult<&str, usize> {
    terminated(
        map_res(delimited(space0, digit1, space0), |s: &str| s.parse::<usize>()),
        char('>'),
    )
    .parse(input)
}

/// Read the value of the field whose `<TAG:` opener starts at `open`.
fn value_at(text: &str, open: usize, opener_len: usize) -> Option<&str> {
    let rest = text.get(open + opener_len..)?;
    let (rest, len) = parse_length(rest).ok()?;

    // The declared length may run past the end of the text.
    let value = match rest.char_indices().nth(len) {
        Some((idx, _)) => &rest[..idx],
        None => rest,
    };

    if value.is_empty() { None } else { Some(value) }
}

/// Find the next `<TAG:` opener at or after `from`.
fn find_opener(text: &str, opener: &str, from: usize) -> Option<usize> {
    find_ignore_case_within(text, opener, from, text.len())
}

/// Extract the first occurrence of `tag` from `text`.
///
/// The tag match is case-insensitive. Returns `None` when the tag, its length
/// or the closing `>` is missing, when the length is not a number, or when the
/// value is empty.
///
/// # Example
///
/// ```
/// use js8_monitor::adif::extract_field;
///
/// let text = "<call:4>W1AW <gridsquare:4>FN31";
/// assert_eq!(extract_field(text, "CALL").as_deref(), Some("W1AW"));
/// assert_eq!(extract_field(text, "NAME"), None);
/// ```
pub fn extract_field(text: &str, tag: &str) -> Option<String> {
    let opener = format!("<{}:", tag);
    let open = find_opener(text, &opener, 0)?;
    value_at(text, open, opener.len()).map(str::to_string)
}

/// Extract `tag`, letting a non-empty second occurrence win over the first.
///
/// JS8Call writes `MODE` twice in some logged records; the later one is the
/// mode the operator actually selected.
pub fn extract_field_last(text: &str, tag: &str) -> Option<String> {
    let opener = format!("<{}:", tag);
    let open = find_opener(text, &opener, 0)?;
    let first = value_at(text, open, opener.len());
    let second = find_opener(text, &opener, open + 1)
        .and_then(|next| value_at(text, next, opener.len()));

    second.or(first).map(str::to_string)
}

/// Encode one field as `<tag:len>value`.
///
/// The length counts characters, not bytes.
pub fn encode_field(out: &mut String, tag: &str, value: &str) {
    out.push('<');
    out.push_str(tag);
    out.push(':');
    out.push_str(&value.chars().count().to_string());
    out.push('>');
    out.push_str(value);
}

/// Encode a record, writing `separator` after every field and after `<eor>`.
pub fn encode_record<K, V>(fields: &[(K, V)], separator: &str) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut out = String::with_capacity(fields.len() * 24);
    for (tag, value) in fields {
        encode_field(&mut out, tag.as_ref(), value.as_ref());
        out.push_str(separator);
    }
    out.push_str("<eor>");
    out.push_str(separator);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_basic() {
        assert_eq!(extract_field("<CALL:4>W1AW", "CALL").as_deref(), Some("W1AW"));
        assert_eq!(
            extract_field("junk <call:4>K1ABC", "CALL").as_deref(),
            Some("K1AB")
        );
    }

    #[test]
    fn test_extract_length_past_end() {
        assert_eq!(extract_field("<CALL:10>W1AW", "CALL").as_deref(), Some("W1AW"));
    }

    #[test]
    fn test_extract_missing_pieces() {
        assert_eq!(extract_field("<CALL:4W1AW", "CALL"), None);
        assert_eq!(extract_field("<CALL:x>W1AW", "CALL"), None);
        assert_eq!(extract_field("<CALL:>W1AW", "CALL"), None);
        assert_eq!(extract_field("CALL W1AW", "CALL"), None);
    }

    #[test]
    fn test_extract_empty_is_absent() {
        assert_eq!(extract_field("<NAME:0><CALL:4>W1AW", "NAME"), None);
    }

    #[test]
    fn test_extract_does_not_match_longer_tag() {
        // "<MODE:" must not match inside "<SUBMODE:"
        let text = "<SUBMODE:3>JS8";
        assert_eq!(extract_field(text, "MODE"), None);
    }

    #[test]
    fn test_extract_second_occurrence_wins() {
        let text = "<MODE:4>MFSK <SUBMODE:3>JS8 <MODE:3>JS8";
        assert_eq!(extract_field(text, "MODE").as_deref(), Some("MFSK"));
        assert_eq!(extract_field_last(text, "MODE").as_deref(), Some("JS8"));
    }

    #[test]
    fn test_extract_second_occurrence_empty_keeps_first() {
        let text = "<MODE:4>MFSK <MODE:0>";
        assert_eq!(extract_field_last(text, "MODE").as_deref(), Some("MFSK"));
        assert_eq!(
            extract_field_last("<MODE:4>MFSK", "MODE").as_deref(),
            Some("MFSK")
        );
    }

    #[test]
    fn test_encode_record() {
        let fields = [("call", "W1AW"), ("band", "20m")];
        assert_eq!(encode_record(&fields, ""), "<call:4>W1AW<band:3>20m<eor>");
        assert_eq!(
            encode_record(&fields, " "),
            "<call:4>W1AW <band:3>20m <eor> "
        );
    }

    #[test]
    fn test_encode_empty_value() {
        let fields = [("comment", "")];
        assert_eq!(encode_record(&fields, ""), "<comment:0><eor>");
    }
}
