//! Case-insensitive search helpers for the loosely delimited text JS8Call
//! hands us.
//!
//! All positions are byte offsets. Inputs are expected to be ASCII already
//! (the envelope parser strips everything else), but every slice goes through
//! `str::get` so a stray multi-byte character degrades to "not found".

/// Remove every non-ASCII character.
pub fn strip_non_ascii(s: &str) -> String {
    s.chars().filter(char::is_ascii).collect()
}

/// Find the first ASCII case-insensitive occurrence of `needle`.
#[inline]
pub fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    find_ignore_case_within(haystack, needle, 0, haystack.len())
}

/// Whether `haystack` contains `needle`, ignoring ASCII case.
#[inline]
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    find_ignore_case(haystack, needle).is_some()
}

/// Find `needle` fully inside the window `[start, end)` of `haystack`,
/// ignoring ASCII case. The window is clamped to the haystack.
///
/// Returns the absolute offset of the match.
pub fn find_ignore_case_within(
    haystack: &str,
    needle: &str,
    start: usize,
    end: usize,
) -> Option<usize> {
    let end = end.min(haystack.len());
    if start > end {
        return None;
    }
    let window = haystack.as_bytes().get(start..end)?;
    let needle = needle.as_bytes();
    if needle.is_empty() {
        return Some(start);
    }
    window
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle))
        .map(|pos| start + pos)
}

/// Find an exact character inside the window `[start, end)`.
pub fn find_char_within(haystack: &str, c: char, start: usize, end: usize) -> Option<usize> {
    let end = end.min(haystack.len());
    haystack
        .get(start..end)
        .and_then(|window| window.find(c))
        .map(|pos| start + pos)
}

/// Slice `[start, end)` out of `s`, clamped, returning an empty string when
/// the bounds fall inside a multi-byte character.
pub fn slice_clamped(s: &str, start: usize, end: usize) -> &str {
    let end = end.min(s.len());
    let start = start.min(end);
    s.get(start..end).unwrap_or("")
}

/// Keep at most `max` characters.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
