//! Text encodings used inside `.pld` templates.
//!
//! Label text is stored as GBK in most templates; some designer versions
//! embed UTF-16LE or UTF-8 copies of the same strings.

use encoding_rs::GBK;

/// Encode `text` as GBK, silently dropping characters GBK cannot represent
pub fn gbk_encode_lossy(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let mut tmp = [0u8; 4];
    for ch in text.chars() {
        if let Some(bytes) = gbk_char(ch, &mut tmp) {
            out.extend_from_slice(&bytes);
        }
    }
    out
}

// encoding_rs replaces unmappable characters with numeric character references,
// so a char that reports errors is treated as absent
fn gbk_char(ch: char, scratch: &mut [u8; 4]) -> Option<Vec<u8>> {
    let s = ch.encode_utf8(scratch);
    let (bytes, _, had_errors) = GBK.encode(s);
    if had_errors {
        None
    } else {
        Some(bytes.into_owned())
    }
}

/// Encode `text` as GBK into exactly `target_len` bytes.
///
/// Shorter output is right-padded with ASCII spaces. Longer output drops
/// trailing characters until it fits, so a multi-byte character is never split.
pub fn encode_gbk_fit(text: &str, target_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(target_len);
    let mut tmp = [0u8; 4];
    for ch in text.chars() {
        let Some(bytes) = gbk_char(ch, &mut tmp) else {
            continue;
        };
        if out.len() + bytes.len() > target_len {
            break;
        }
        out.extend_from_slice(&bytes);
    }
    out.resize(target_len, b' ');
    out
}

/// Encode ASCII text into exactly `target_len` bytes (pad with spaces / truncate).
/// Non-ASCII characters are dropped.
pub fn encode_ascii_fit(text: &str, target_len: usize) -> Vec<u8> {
    let mut out: Vec<u8> = text.bytes().filter(u8::is_ascii).take(target_len).collect();
    out.resize(target_len, b' ');
    out
}

pub fn utf16le_bytes(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

/// Byte patterns of a label in every encoding templates are known to use:
/// GBK, UTF-16LE, UTF-8. Empty and duplicate patterns are skipped.
pub fn label_patterns(label: &str) -> Vec<Vec<u8>> {
    let mut patterns: Vec<Vec<u8>> = Vec::with_capacity(3);
    for pattern in [
        gbk_encode_lossy(label),
        utf16le_bytes(label),
        label.as_bytes().to_vec(),
    ] {
        if !pattern.is_empty() && !patterns.contains(&pattern) {
            patterns.push(pattern);
        }
    }
    patterns
}
