//! Character-safe truncation to transport limits.

/// Marker appended to truncated text.
pub const ELLIPSIS: char = '…';

/// Cut `text` to at most `max_chars` characters, ending with an ellipsis
/// when anything was removed. Counts `char`s, never splits one.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }
    let mut out: String = text.chars().take(max_chars - 1).collect();
    out.push(ELLIPSIS);
    out
}
