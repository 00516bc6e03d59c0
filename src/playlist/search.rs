use crate::library::TrackInfo;

/// Normalize a string for keyword matching.
///
/// ASCII letters are lowercased. Runs of space, `_`, `-`, `.`, `/` and `\`
/// collapse into one space. Every other byte, multi-byte UTF-8 included, is
/// kept as is. Leading and trailing spaces are dropped.
pub fn normalize_for_search(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_space = false;

    for ch in s.chars() {
        if matches!(ch, ' ' | '_' | '-' | '.' | '/' | '\\') {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(ch.to_ascii_lowercase());
    }
    out
}

/// Substring match of an already-normalized keyword against name or path.
pub(crate) fn matches(track: &TrackInfo, normalized_keyword: &str) -> bool {
    normalize_for_search(&track.name).contains(normalized_keyword)
        || normalize_for_search(&track.path.to_string_lossy()).contains(normalized_keyword)
}
