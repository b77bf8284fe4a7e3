use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use tracing::warn;

pub const EXCERPT_BUDGET: usize = 150;
pub const TITLE_BUDGET: usize = 30;
pub const ELLIPSIS: &str = "...";

lazy_static! {
    static ref HTML_COMMENT: Regex = Regex::new(r"(?s)<!--.*?-->").unwrap();
}

/// Derives a plain-text preview from stored post content.
///
/// Content may be a fragment or a complete HTML document. Paragraph text is
/// preferred; without paragraphs, all text is used. Never fails: if parsing
/// goes wrong a pattern-based fallback runs, and failing that the result is
/// empty.
pub fn extract_plain_text(content: &str) -> String {
    if content.is_empty() {
        return String::new();
    }

    match parsed_text(content) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "structured excerpt failed, falling back to pattern matching");
            pattern_text(content).unwrap_or_default()
        }
    }
}

pub fn is_full_document(content: &str) -> bool {
    let head = content.trim_start();
    let prefix: String = head.chars().take(9).collect::<String>().to_ascii_lowercase();
    prefix.starts_with("<!doctype") || prefix.starts_with("<html")
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Selector error: {:?}", e))
}

fn parse_content(content: &str) -> Html {
    if is_full_document(content) {
        Html::parse_document(content)
    } else {
        Html::parse_fragment(content)
    }
}

/// The body element of a full document, or the fragment root.
fn content_region(document: &Html) -> Result<ElementRef<'_>> {
    let body = selector("body")?;
    Ok(document
        .select(&body)
        .next()
        .unwrap_or_else(|| document.root_element()))
}

fn parsed_text(content: &str) -> Result<String> {
    let cleaned = HTML_COMMENT.replace_all(content, "");
    let paragraph = selector("p")?;
    let document = parse_content(&cleaned);
    let region = content_region(&document)?;

    let paragraphs: Vec<String> = region
        .select(&paragraph)
        .filter(|p| !has_paragraph_ancestor(p))
        .map(|p| visible_text(&p))
        .collect();

    let text = if paragraphs.is_empty() {
        visible_text(&region)
    } else {
        paragraphs.join(" ")
    };

    Ok(text.trim().to_string())
}

fn has_paragraph_ancestor(element: &ElementRef) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| a.value().name() == "p")
}

/// Text content of an element, skipping script and style bodies. Entities
/// are already decoded by the parser.
pub fn visible_text(element: &ElementRef) -> String {
    let mut out = String::new();
    for node in element.descendants() {
        if let Node::Text(text) = node.value() {
            let hidden = node
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|a| matches!(a.value().name(), "script" | "style"));
            if !hidden {
                out.push_str(text);
            }
        }
    }
    out
}

fn pattern_text(content: &str) -> Result<String> {
    let comment = Regex::new(r"(?s)<!--.*?-->")?;
    let paragraph = Regex::new(r"(?is)<p(?:\s[^>]*)?>(.*?)</p>")?;
    let tag = Regex::new(r"<[^>]*>")?;

    let cleaned = comment.replace_all(content, "");
    let paragraphs: Vec<String> = paragraph
        .captures_iter(&cleaned)
        .filter_map(|caps| caps.get(1))
        .map(|m| tag.replace_all(m.as_str(), "").to_string())
        .collect();

    if paragraphs.is_empty() {
        Ok(tag.replace_all(&cleaned, "").trim().to_string())
    } else {
        Ok(paragraphs.join(" ").trim().to_string())
    }
}

/// Cuts `text` to at most `budget` characters, appending an ellipsis when
/// anything was removed.
pub fn truncate(text: &str, budget: usize) -> String {
    match text.char_indices().nth(budget) {
        Some((cut, _)) => format!("{}{}", &text[..cut], ELLIPSIS),
        None => text.to_string(),
    }
}

pub fn excerpt(content: &str) -> String {
    truncate(&extract_plain_text(content), EXCERPT_BUDGET)
}

pub fn short_title(title: &str) -> String {
    truncate(title, TITLE_BUDGET)
}

const BLOCK_TAGS: [&str; 10] = ["h1", "h2", "h3", "h4", "h5", "h6", "p", "li", "pre", "blockquote"];

/// Readable text blocks of a post body in document order, for the detail
/// view. Content without block elements comes back as a single block.
pub fn article_blocks(content: &str) -> Vec<String> {
    match parsed_blocks(content) {
        Ok(blocks) if !blocks.is_empty() => blocks,
        Ok(_) => single_block(content),
        Err(e) => {
            warn!(error = %e, "block extraction failed");
            single_block(content)
        }
    }
}

fn single_block(content: &str) -> Vec<String> {
    let text = extract_plain_text(content);
    if text.is_empty() {
        Vec::new()
    } else {
        vec![text]
    }
}

fn parsed_blocks(content: &str) -> Result<Vec<String>> {
    let cleaned = HTML_COMMENT.replace_all(content, "");
    let blocks = selector(&BLOCK_TAGS.join(", "))?;
    let document = parse_content(&cleaned);
    let region = content_region(&document)?;

    Ok(region
        .select(&blocks)
        .filter(|el| {
            !el.ancestors()
                .filter_map(ElementRef::wrap)
                .any(|a| BLOCK_TAGS.contains(&a.value().name()))
        })
        .map(|el| visible_text(&el).trim().to_string())
        .filter(|text| !text.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_document_paragraphs_are_joined() {
        let html = "<html><body><!--note--><p>Hello</p><p>World</p></body></html>";
        assert_eq!(extract_plain_text(html), "Hello World");
    }

    #[test]
    fn no_paragraphs_falls_back_to_all_text() {
        assert_eq!(extract_plain_text("<div>plain &amp; simple</div>"), "plain & simple");
    }

    #[test]
    fn doctype_document_ignores_head() {
        let html = "<!DOCTYPE html><html><head><title>T</title><style>p{}</style></head>\
                    <body><h1>Heading</h1><p>First &lt;para&gt;</p><div><p>Second</p></div></body></html>";
        assert_eq!(extract_plain_text(html), "First <para> Second");
    }

    #[test]
    fn comments_inside_paragraphs_are_removed() {
        assert_eq!(extract_plain_text("<p>a<!-- hidden -->b</p>"), "ab");
    }

    #[test]
    fn script_text_is_not_part_of_excerpt() {
        assert_eq!(extract_plain_text("<div>shown<script>var x = 1;</script></div>"), "shown");
    }

    #[test]
    fn malformed_markup_is_tolerated() {
        assert_eq!(extract_plain_text("<p>unclosed <b>bold"), "unclosed bold");
        assert_eq!(extract_plain_text(""), "");
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(extract_plain_text("  just words  "), "just words");
    }

    #[test]
    fn pattern_fallback_matches_parser_on_simple_input() {
        let html = "<!--x--><p class=\"lead\">Hello</p><p>World</p>";
        assert_eq!(pattern_text(html).unwrap(), "Hello World");
        assert_eq!(pattern_text("<div>a &amp; b</div>").unwrap(), "a &amp; b");
    }

    #[test]
    fn truncation_boundary() {
        let exact = "a".repeat(150);
        assert_eq!(truncate(&exact, EXCERPT_BUDGET), exact);

        let over = "b".repeat(151);
        let cut = truncate(&over, EXCERPT_BUDGET);
        assert_eq!(cut, format!("{}...", "b".repeat(150)));
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let title = "数据".repeat(20);
        let cut = short_title(&title);
        assert_eq!(cut.chars().count(), TITLE_BUDGET + ELLIPSIS.len());
    }

    #[test]
    fn article_blocks_keep_outermost_blocks_in_order() {
        let html = "<!DOCTYPE html><html><head><title>T</title></head><body>\
                    <h1>Title</h1><p>a</p><ul><li>x</li></ul><blockquote><p>q</p></blockquote>\
                    </body></html>";
        assert_eq!(article_blocks(html), vec!["Title", "a", "x", "q"]);
    }

    #[test]
    fn article_blocks_fall_back_to_plain_text() {
        assert_eq!(article_blocks("  loose text "), vec!["loose text"]);
        assert!(article_blocks("").is_empty());
    }
}
