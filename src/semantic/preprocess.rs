//! Content preprocessing for embedding generation.
//!
//! Prepares note title and content for embedding:
//! 1. Trim whitespace
//! 2. Skip if both empty
//! 3. Concatenate with a single space
//! 4. Truncate to max length with ellipsis
//!
//! The composed text is what gets embedded, so two notes with the same
//! title and content always produce identical embedding input.

/// Maximum embedding input length (characters, not tokens)
const MAX_CONTENT_LENGTH: usize = 8000;

/// Ellipsis suffix when content is truncated
const TRUNCATION_SUFFIX: &str = "...";

/// Compose title and content into embedding input.
///
/// Returns `None` if both parts are empty after trimming; a blank note has
/// nothing meaningful to embed. Otherwise concatenates the non-empty parts
/// and truncates to `MAX_CONTENT_LENGTH`.
pub fn compose_text(title: &str, content: &str) -> Option<String> {
    let title = title.trim();
    let content = content.trim();

    if title.is_empty() && content.is_empty() {
        return None;
    }

    let text = if title.is_empty() {
        content.to_string()
    } else if content.is_empty() {
        title.to_string()
    } else {
        format!("{} {}", title, content)
    };

    Some(truncate_text(&text))
}

/// Truncate to MAX_CONTENT_LENGTH characters, adding ellipsis if truncated.
fn truncate_text(text: &str) -> String {
    if text.chars().count() <= MAX_CONTENT_LENGTH {
        return text.to_string();
    }

    // Count in chars rather than bytes so multibyte input is never split
    let max_chars = MAX_CONTENT_LENGTH - TRUNCATION_SUFFIX.len();
    let truncated: String = text.chars().take(max_chars).collect();

    format!("{}{}", truncated, TRUNCATION_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_returns_none() {
        assert!(compose_text("", "").is_none());
        assert!(compose_text("   ", "   ").is_none());
        assert!(compose_text("\n\t", "  \r\n").is_none());
    }

    #[test]
    fn test_title_only() {
        let result = compose_text("Sourdough starter", "");
        assert_eq!(result, Some("Sourdough starter".to_string()));
    }

    #[test]
    fn test_content_only() {
        let result = compose_text("", "Feed twice a day");
        assert_eq!(result, Some("Feed twice a day".to_string()));
    }

    #[test]
    fn test_both_title_and_content() {
        let result = compose_text("Sourdough starter", "Feed twice a day");
        assert_eq!(result, Some("Sourdough starter Feed twice a day".to_string()));
    }

    #[test]
    fn test_trims_whitespace() {
        let result = compose_text("  Sourdough starter  ", "  Feed twice a day  ");
        assert_eq!(result, Some("Sourdough starter Feed twice a day".to_string()));
    }

    #[test]
    fn test_same_fields_compose_identically() {
        let a = compose_text("Title", "Content");
        let b = compose_text("Title", "Content");
        assert_eq!(a, b);
    }

    #[test]
    fn test_truncation() {
        let long_content = "x".repeat(MAX_CONTENT_LENGTH * 2);
        let result = compose_text(&long_content, "");

        assert!(result.is_some());
        let text = result.unwrap();
        assert!(text.chars().count() <= MAX_CONTENT_LENGTH);
        assert!(text.ends_with(TRUNCATION_SUFFIX));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let long_content = "é".repeat(MAX_CONTENT_LENGTH * 2);
        let result = compose_text("", &long_content).unwrap();
        assert!(result.chars().count() <= MAX_CONTENT_LENGTH);
        assert!(result.ends_with(TRUNCATION_SUFFIX));
    }

    #[test]
    fn test_no_truncation_for_short_content() {
        let short = "Short note";
        let result = compose_text(short, "");
        assert_eq!(result, Some(short.to_string()));
    }
}
