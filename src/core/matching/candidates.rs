/// Number of candidates shown when a row has no match
pub const PREVIEW_LEN: usize = 5;

fn push_unique(out: &mut Vec<String>, name: String) {
    if !out.contains(&name) {
        out.push(name);
    }
}

/// Forced filenames: the exact form (`.pld` appended when missing) and the
/// shop-prefixed form unless the name already starts with the prefix
pub fn forced_candidates(prefix: &str, forced: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for name in forced {
        let file = if name.ends_with(".pld") {
            name.clone()
        } else {
            format!("{}.pld", name)
        };
        push_unique(&mut out, file.clone());
        if !prefix.is_empty() && !file.starts_with(prefix) {
            push_unique(&mut out, format!("{}{}", prefix, file));
        }
    }
    out
}

/// `v.pld` and `<prefix>v.pld` for each non-empty variant
pub fn variant_candidates(prefix: &str, variants: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for v in variants.iter().filter(|v| !v.is_empty()) {
        push_unique(&mut out, format!("{}.pld", v));
        if !prefix.is_empty() {
            push_unique(&mut out, format!("{}{}.pld", prefix, v));
        }
    }
    out
}

/// Ordered candidate filenames: forced names first, then variants
pub fn candidate_filenames(prefix: &str, variants: &[String], forced: &[String]) -> Vec<String> {
    let mut out = forced_candidates(prefix, forced);
    for name in variant_candidates(prefix, variants) {
        push_unique(&mut out, name);
    }
    out
}

/// First [`PREVIEW_LEN`] candidates plus the total count
pub fn preview(candidates: &[String]) -> (Vec<String>, usize) {
    (
        candidates.iter().take(PREVIEW_LEN).cloned().collect(),
        candidates.len(),
    )
}
