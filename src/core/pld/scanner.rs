//! Byte-pattern scanning over raw `.pld` buffers.
//!
//! Label templates mix binary structure with embedded plain text, so every
//! scan here works on bytes and reports offsets into the original buffer.

use std::ops::Range;

/// Minimum length of a printable-ASCII run worth inspecting
pub const DEFAULT_MIN_SPAN: usize = 6;

pub fn is_ascii_printable(b: u8) -> bool {
    (32..=126).contains(&b)
}

/// All maximal runs of printable ASCII (32..=126) of at least `min_len` bytes
pub fn find_ascii_spans(buf: &[u8], min_len: usize) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut i = 0;
    while i < buf.len() {
        if !is_ascii_printable(buf[i]) {
            i += 1;
            continue;
        }
        let start = i;
        while i < buf.len() && is_ascii_printable(buf[i]) {
            i += 1;
        }
        if i - start >= min_len {
            spans.push(start..i);
        }
    }
    spans
}

/// Maximal ASCII digit runs (not adjacent to other digits) with a length in
/// `min_len..=max_len`. Runs are bounded by the slice edges.
pub fn digit_runs(buf: &[u8], min_len: usize, max_len: usize) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut i = 0;
    while i < buf.len() {
        if !buf[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < buf.len() && buf[i].is_ascii_digit() {
            i += 1;
        }
        let len = i - start;
        if (min_len..=max_len).contains(&len) {
            runs.push(start..i);
        }
    }
    runs
}

/// Four ASCII digits forming a plausible month-day (MM 01-12, DD 01-31)
pub fn looks_like_mmdd(token: &[u8]) -> bool {
    if token.len() != 4 || !token.iter().all(u8::is_ascii_digit) {
        return false;
    }
    let mm = (token[0] - b'0') * 10 + (token[1] - b'0');
    let dd = (token[2] - b'0') * 10 + (token[3] - b'0');
    (1..=12).contains(&mm) && (1..=31).contains(&dd)
}

/// Offsets of every standalone 4-digit month-day token in `buf`
pub fn standalone_mmdd(buf: &[u8]) -> Vec<usize> {
    digit_runs(buf, 4, 4)
        .into_iter()
        .filter(|r| looks_like_mmdd(&buf[r.clone()]))
        .map(|r| r.start)
        .collect()
}

/// Digit ranges of every non-overlapping `*NNNNNN*` token (6-20 digits)
pub fn star_numbers(buf: &[u8]) -> Vec<Range<usize>> {
    let mut hits = Vec::new();
    let mut i = 0;
    while i < buf.len() {
        if buf[i] != b'*' {
            i += 1;
            continue;
        }
        let start = i + 1;
        let mut j = start;
        while j < buf.len() && buf[j].is_ascii_digit() {
            j += 1;
        }
        let len = j - start;
        if (6..=20).contains(&len) && j < buf.len() && buf[j] == b'*' {
            hits.push(start..j);
            i = j + 1;
        } else {
            i += 1;
        }
    }
    hits
}

/// First occurrence of `needle` in `haystack`
pub fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Every non-overlapping occurrence of `needle`, as ranges
pub fn find_all_bytes(haystack: &[u8], needle: &[u8]) -> Vec<Range<usize>> {
    let mut hits = Vec::new();
    if needle.is_empty() {
        return hits;
    }
    let mut from = 0;
    while let Some(pos) = find_bytes(&haystack[from..], needle) {
        let start = from + pos;
        hits.push(start..start + needle.len());
        from = start + needle.len();
    }
    hits
}
