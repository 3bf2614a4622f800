//! Size cap for rendered diffs.

/// Default cap on a rendered diff, in bytes.
pub const DEFAULT_MAX_DIFF_BYTES: usize = 50_000;

/// Appended to every truncated diff.
pub const TRUNCATION_MARKER: &str = "\n... [truncated: diff too large] ...\n";

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Cap `diff` at `max_bytes`, marker included.
///
/// The cut lands on the last newline before `max_bytes - marker` when that
/// newline lies past the midpoint; otherwise it is a hard cut. A threshold no
/// larger than the marker yields a bare cut with no marker.
pub fn truncate_diff(diff: &str, max_bytes: usize) -> String {
    if diff.len() <= max_bytes {
        return diff.to_string();
    }
    if max_bytes <= TRUNCATION_MARKER.len() {
        return diff[..floor_char_boundary(diff, max_bytes)].to_string();
    }

    let budget = max_bytes - TRUNCATION_MARKER.len();
    let mut cut = floor_char_boundary(diff, budget);
    if let Some(newline) = diff[..cut].rfind('\n') {
        if newline > budget / 2 {
            cut = newline;
        }
    }

    let mut out = String::with_capacity(cut + TRUNCATION_MARKER.len());
    out.push_str(&diff[..cut]);
    out.push_str(TRUNCATION_MARKER);
    out
}
