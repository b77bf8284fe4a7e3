use scraper::Html;

use crate::excerpt::visible_text;

/// Escapes user-authored comment text before it is persisted, so stored
/// content never carries live markup.
pub fn sanitize_comment_input(raw: &str) -> String {
    html_escape::encode_safe(raw.trim()).to_string()
}

/// Reduces stored rich text to plain text for display. Scripts, styles and
/// event handlers never reach the UI; entities are decoded.
pub fn display_text(stored: &str) -> String {
    let fragment = Html::parse_fragment(stored);
    let text = visible_text(&fragment.root_element());
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_markup_is_escaped() {
        assert_eq!(
            sanitize_comment_input("  <img src=x onerror=alert(1)> hi "),
            "&lt;img src=x onerror=alert(1)&gt; hi"
        );
    }

    #[test]
    fn escaped_input_displays_as_typed() {
        let stored = sanitize_comment_input("a < b & \"c\"");
        assert_eq!(display_text(&stored), "a < b & \"c\"");
    }

    #[test]
    fn legacy_markup_is_stripped_for_display() {
        let stored = "<p onclick=\"x()\">Nice <b>post</b></p><script>steal()</script>";
        assert_eq!(display_text(stored), "Nice post");
    }
}
