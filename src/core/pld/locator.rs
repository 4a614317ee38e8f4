//! Field locators: byte offsets of semantic fields inside a template.
//!
//! Every locator is pure and returns an empty list or `None` when the field is
//! not present; deciding what a miss means is left to the patcher.

use std::ops::Range;

use super::encoding::{gbk_encode_lossy, label_patterns};
use super::scanner::{digit_runs, find_all_bytes, find_bytes, star_numbers};

/// Lookahead after a label when searching for its value
pub const LABEL_LOOKAHEAD: usize = 3000;
/// Lookahead after a depot label
pub const DEPOT_FIELD_LOOKAHEAD: usize = 256;
/// Window after the city anchor searched for the `-CHN` suffix
pub const DEPOT_ANCHOR_WINDOW: usize = 1024;
/// Region width used when the anchor has no `-CHN` suffix
pub const DEPOT_ANCHOR_FALLBACK: usize = 120;
pub const DEPOT_MIN_WIDTH: usize = 8;

pub const DEPOT_LABELS: [&str; 2] = ["目的库房", "目的仓"];
const DEPOT_STOP_LABELS: [&str; 5] = ["目的地", "供应商", "采购", "箱唛", "序号"];

/// Placeholder supplier token in blank templates
pub const SUPPLIER_PLACEHOLDER: &[u8] = b"stsnb";

/// Sorted, de-duplicated offsets where `label` appears as GBK, UTF-16LE or UTF-8
pub fn find_label_positions(buf: &[u8], label: &str) -> Vec<usize> {
    let mut hits: Vec<usize> = label_patterns(label)
        .iter()
        .flat_map(|p| find_all_bytes(buf, p))
        .map(|r| r.start)
        .collect();
    hits.sort_unstable();
    hits.dedup();
    hits
}

/// Digit runs of `min_len..=max_len` inside `buf[offset..offset + max_lookahead]`.
///
/// Runs are maximal within the window. With `find_all == false` at most the
/// first run is returned.
pub fn find_next_digits_after(
    buf: &[u8],
    offset: usize,
    max_lookahead: usize,
    min_len: usize,
    max_len: usize,
    find_all: bool,
) -> Vec<Range<usize>> {
    let start = offset.min(buf.len());
    let end = offset.saturating_add(max_lookahead).min(buf.len());
    let mut runs: Vec<Range<usize>> = digit_runs(&buf[start..end], min_len, max_len)
        .into_iter()
        .map(|r| start + r.start..start + r.end)
        .collect();
    if !find_all {
        runs.truncate(1);
    }
    runs
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.')
}

/// First run of `[A-Za-z0-9_.-]` after `offset` (at most 64 bytes)
pub fn find_ascii_word_after(buf: &[u8], offset: usize, max_lookahead: usize) -> Option<Range<usize>> {
    let start = offset.min(buf.len());
    let end = offset.saturating_add(max_lookahead).min(buf.len());
    let window = &buf[start..end];
    let first = window.iter().position(|&b| is_word_byte(b))?;
    let len = window[first..]
        .iter()
        .take(64)
        .take_while(|&&b| is_word_byte(b))
        .count();
    Some(start + first..start + first + len)
}

/// First occurrence of `token` not touching other `[A-Za-z0-9]` bytes
pub fn find_bounded_token(buf: &[u8], token: &[u8]) -> Option<Range<usize>> {
    find_all_bytes(buf, token).into_iter().find(|r| {
        let before = r.start.checked_sub(1).map(|i| buf[i]);
        let after = buf.get(r.end).copied();
        !before.is_some_and(|b| b.is_ascii_alphanumeric())
            && !after.is_some_and(|b| b.is_ascii_alphanumeric())
    })
}

/// Digit ranges of every `*NNNNNN*` barcode text
pub fn find_star_po_spans(buf: &[u8]) -> Vec<Range<usize>> {
    star_numbers(buf)
}

/// Every 6-20 digit run within [`LABEL_LOOKAHEAD`] bytes after each "采购单号"
pub fn find_po_after_labels(buf: &[u8]) -> Vec<Range<usize>> {
    let mut regions: Vec<Range<usize>> = find_label_positions(buf, "采购单号")
        .into_iter()
        .flat_map(|pos| find_next_digits_after(buf, pos, LABEL_LOOKAHEAD, 6, 20, true))
        .collect();
    regions.sort_by_key(|r| r.start);
    regions.dedup();
    regions
}

/// The two longest 6-20 digit runs of the whole buffer
pub fn find_longest_digit_runs(buf: &[u8], count: usize) -> Vec<Range<usize>> {
    let mut runs = digit_runs(buf, 6, 20);
    // stable: equal lengths keep buffer order
    runs.sort_by(|a, b| b.len().cmp(&a.len()));
    runs.truncate(count);
    runs
}

/// Depot value after the first GBK "目的库房" (then "目的仓") label.
///
/// Leading spaces, tabs and line breaks are skipped; the value stops at a line
/// break or where the bytes ahead start with a neighbouring label. Windows
/// narrower than [`DEPOT_MIN_WIDTH`] are rejected.
pub fn find_depot_field_window(buf: &[u8]) -> Option<Range<usize>> {
    let stops: Vec<Vec<u8>> = DEPOT_STOP_LABELS.iter().map(|l| gbk_encode_lossy(l)).collect();

    for label in DEPOT_LABELS {
        let pattern = gbk_encode_lossy(label);
        let Some(pos) = find_bytes(buf, &pattern) else {
            continue;
        };
        let label_end = pos + pattern.len();
        let region = &buf[label_end..label_end.saturating_add(DEPOT_FIELD_LOOKAHEAD).min(buf.len())];

        let i = region
            .iter()
            .position(|b| !matches!(b, 0x20 | 0x09 | 0x0D | 0x0A))
            .unwrap_or(region.len());
        let mut j = i;
        while j < region.len() {
            if matches!(region[j], 0x0D | 0x0A) {
                break;
            }
            if j > i && stops.iter().any(|s| region[j..].starts_with(s)) {
                break;
            }
            j += 1;
        }

        if j - i >= DEPOT_MIN_WIDTH {
            return Some(label_end + i..label_end + j);
        }
    }
    None
}

/// Depot region anchored on the last GBK occurrence of the city name.
///
/// Ends after the first `-CHN` within [`DEPOT_ANCHOR_WINDOW`] bytes, otherwise
/// [`DEPOT_ANCHOR_FALLBACK`] bytes after the anchor, clamped to the buffer.
///
/// The region is only stable across re-patching when the written depot starts
/// with the city name and keeps its `-CHN` suffix. Otherwise a second call
/// anchors on an earlier city occurrence or falls back to the fixed width, so
/// it can return a different range.
pub fn find_depot_by_city_anchor(buf: &[u8], city: &str) -> Option<Range<usize>> {
    let pattern = gbk_encode_lossy(city);
    let anchor = find_all_bytes(buf, &pattern).last()?.start;
    let tail = &buf[anchor..anchor.saturating_add(DEPOT_ANCHOR_WINDOW).min(buf.len())];
    let end = match find_bytes(tail, b"-CHN") {
        Some(p) => anchor + p + 4,
        None => (anchor + DEPOT_ANCHOR_FALLBACK).min(buf.len()),
    };
    (end > anchor).then_some(anchor..end)
}
