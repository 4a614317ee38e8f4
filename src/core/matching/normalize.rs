//! Identifier normalization for template matching.

/// Sold-out marker appended to identifiers in the distribution sheets
pub const SOLD_OUT_MARKER: &str = "售止";

const TYPO_FIXES: [(&str, &str); 3] = [("螺旋奖", "螺旋桨"), ("螺施桨", "螺旋桨"), ("螺桨", "螺旋桨")];

/// Full-width forms (U+FF01..=U+FF5E) and the ideographic space to ASCII
pub fn to_halfwidth(s: &str) -> String {
    s.chars()
        .map(|ch| match ch as u32 {
            0x3000 => ' ',
            code @ 0xFF01..=0xFF5E => char::from_u32(code - 0xFEE0).unwrap_or(ch),
            _ => ch,
        })
        .collect()
}

/// Remove the sold-out marker, fold to half-width, drop spaces, fix typos
pub fn normalize(raw: &str) -> String {
    let mut s = to_halfwidth(&raw.replace(SOLD_OUT_MARKER, ""))
        .trim()
        .replace(' ', "");
    for (typo, fixed) in TYPO_FIXES {
        s = s.replace(typo, fixed);
    }
    s
}

fn strip_trailing_plus_number(s: &str) -> &str {
    let digits = s.bytes().rev().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return s;
    }
    let head = &s[..s.len() - digits];
    head.strip_suffix('+').unwrap_or(s)
}

/// Lookup variants of a raw identifier, in priority order without duplicates:
/// the raw value, the normalized value, normalized without a trailing `+N`,
/// without any `+`, and without both
pub fn build_variants(raw: &str) -> Vec<String> {
    let base = normalize(raw);
    let no_tail = strip_trailing_plus_number(&base).to_string();
    let candidates = [
        raw.to_string(),
        base.clone(),
        no_tail.clone(),
        base.replace('+', ""),
        no_tail.replace('+', ""),
    ];

    let mut variants: Vec<String> = Vec::with_capacity(candidates.len());
    for v in candidates {
        if !variants.contains(&v) {
            variants.push(v);
        }
    }
    variants
}

/// Leading ASCII digit run of `s` ("" when it does not start with a digit)
pub fn numeric_prefix(s: &str) -> &str {
    let len = s.bytes().take_while(u8::is_ascii_digit).count();
    &s[..len]
}

/// Whether `s` is a non-empty run of ASCII digits
pub fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_halfwidth() {
        assert_eq!(to_halfwidth("ＡＢ　123"), "AB 123");
        assert_eq!(to_halfwidth("（Ｘ）＋１"), "(X)+1");
        assert_eq!(to_halfwidth("螺旋桨"), "螺旋桨");
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("12345售止"), "12345");
        assert_eq!(normalize("  A 1 2 "), "A12");
        assert_eq!(normalize("X螺旋奖"), "X螺旋桨");
        assert_eq!(normalize("X螺施桨"), "X螺旋桨");
        assert_eq!(normalize("X螺桨"), "X螺旋桨");
        assert_eq!(normalize("X螺旋桨"), "X螺旋桨");
    }

    #[test]
    fn test_variants_keep_raw_first() {
        assert_eq!(build_variants("100181107889"), vec!["100181107889"]);
        assert_eq!(build_variants("100181107889")[0], "100181107889");
    }

    #[test]
    fn test_variants_plus_handling() {
        assert_eq!(
            build_variants("Ａ1+B+2"),
            vec!["Ａ1+B+2", "A1+B+2", "A1+B", "A1B2", "A1B"]
        );
        // a trailing "+" without digits is not a "+N" suffix
        assert_eq!(build_variants("A+"), vec!["A+", "A"]);
    }

    #[test]
    fn test_numeric_prefix() {
        assert_eq!(numeric_prefix("123abc"), "123");
        assert_eq!(numeric_prefix("abc123"), "");
        assert_eq!(numeric_prefix("４５6"), "");
        assert!(is_numeric("0042"));
        assert!(!is_numeric("42.0"));
        assert!(!is_numeric(""));
    }
}
