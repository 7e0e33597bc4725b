//! String handling utilities.
//!
//! Truncation helpers that respect UTF-8 boundaries, so error previews of
//! frames containing multi-byte characters never panic.

/// Truncate a string at a valid UTF-8 boundary.
///
/// Returns a slice of at most `max_bytes` bytes, backing up to the last
/// character boundary when `max_bytes` falls inside a multi-byte character.
#[inline]
#[must_use]
pub fn safe_truncate(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut boundary = max_bytes;
    while boundary > 0 && !s.is_char_boundary(boundary) {
        boundary -= 1;
    }
    &s[..boundary]
}

/// Truncate a string for display, appending an ellipsis when cut.
#[must_use]
pub fn truncate_for_display(s: &str, max_bytes: usize) -> String {
    let truncated = safe_truncate(s, max_bytes);
    if truncated.len() < s.len() {
        format!("{truncated}...")
    } else {
        truncated.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_ascii() {
        assert_eq!(safe_truncate("Hello, World!", 7), "Hello, ");
        assert_eq!(safe_truncate("short", 100), "short");
        assert_eq!(safe_truncate("short", 0), "");
    }

    #[test]
    fn truncate_respects_multibyte_boundaries() {
        // the emoji is 4 bytes; byte 10 lands inside it
        assert_eq!(safe_truncate("Status: 🔍 Active", 10), "Status: ");
        assert_eq!(safe_truncate("Status: 🔍 Active", 12), "Status: 🔍");
        // 'é' is 2 bytes
        assert_eq!(safe_truncate("Café", 4), "Caf");
    }

    #[test]
    fn display_truncation_adds_ellipsis() {
        assert_eq!(truncate_for_display("This is a long message", 10), "This is a ...");
        assert_eq!(truncate_for_display("tiny", 10), "tiny");
    }
}
