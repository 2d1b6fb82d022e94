//! Shared utilities

/// Truncate a string to `max` characters, appending "..." if truncated.
/// Operates on Unicode char boundaries, not bytes.
pub fn truncate_chars(s: &str, max: usize) -> String {
    let mut chars = s.chars();
    let truncated: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{}...", truncated)
    } else {
        truncated
    }
}

/// Text that turns `shown` into `content` on a terminal line that already
/// displays `shown`: just the new suffix when `content` extends it, otherwise
/// a carriage return and the whole text, padded to blank out leftovers.
pub fn overwrite_line(shown: &str, content: &str) -> String {
    if let Some(suffix) = content.strip_prefix(shown) {
        return suffix.to_string();
    }
    let shown_len = shown.chars().count();
    let content_len = content.chars().count();
    let pad = shown_len.saturating_sub(content_len);
    format!("\r{}{}", content, " ".repeat(pad))
}
