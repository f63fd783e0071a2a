//! HTML-safe encoding of user input.

use crate::validation::is_email;

/// An optional capability that rewrites field values before dispatch.
pub trait Sanitizer: Send + Sync {
    fn sanitize(&self, input: &str) -> String;
}

/// Encodes HTML-significant characters as entities.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlEscaper;

impl Sanitizer for HtmlEscaper {
    fn sanitize(&self, input: &str) -> String {
        escape_html(input)
    }
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape, then accept only well-formed addresses.
pub fn sanitize_email(email: &str) -> Option<String> {
    let escaped = escape_html(email.trim());
    is_email(&escaped).then_some(escaped)
}

/// Cut to at most `max_chars` characters of input, then escape.
///
/// The limit applies to the raw text so an entity is never split.
pub fn sanitize_with_limit(input: &str, max_chars: usize) -> String {
    let truncated: String = input.chars().take(max_chars).collect();
    escape_html(&truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            HtmlEscaper.sanitize(r#"<script>alert("x & y")</script>"#),
            "&lt;script&gt;alert(&quot;x &amp; y&quot;)&lt;/script&gt;"
        );
        assert_eq!(escape_html("O'Brien"), "O&#39;Brien");
        assert_eq!(escape_html("plain text"), "plain text");
    }

    #[test]
    fn test_sanitize_email() {
        assert_eq!(
            sanitize_email("  me@example.com "),
            Some("me@example.com".to_string())
        );
        assert_eq!(sanitize_email("<me>@example.com"), None);
    }

    #[test]
    fn test_sanitize_with_limit() {
        assert_eq!(sanitize_with_limit("abcdef", 3), "abc");
        assert_eq!(sanitize_with_limit("<<<", 2), "&lt;&lt;");
    }

    #[test]
    fn test_limit_never_splits_entities() {
        let input = format!("{}&x", "a".repeat(998));

        let clean = sanitize_with_limit(&input, 1000);

        assert!(clean.ends_with("a&amp;x"));
        assert_eq!(clean.chars().count(), 1004);
    }
}
