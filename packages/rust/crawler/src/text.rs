//! Text normalization: raw HTML → bounded-length plain text.
//!
//! Each pass is a small pure function; [`normalize_html`] composes them.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

/// Elements whose text content is never visible to a reader.
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Page title and visible text extracted from one HTML document.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPage {
    pub title: String,
    pub text: String,
}

/// Parse `html` and produce its title and normalized visible text.
///
/// `url` is the title fallback; `max_chars` bounds the text length.
pub fn normalize_html(html: &str, url: &str, max_chars: usize) -> NormalizedPage {
    let doc = Html::parse_document(html);
    normalize_document(&doc, url, max_chars)
}

/// Same as [`normalize_html`] for an already parsed document.
pub fn normalize_document(doc: &Html, url: &str, max_chars: usize) -> NormalizedPage {
    let title = page_title(doc, url);
    let text = truncate_chars(&normalize_whitespace(&visible_text(doc)), max_chars);
    NormalizedPage { title, text }
}

/// The `<title>` text, or `url` when the page has no usable title.
pub fn page_title(doc: &Html, url: &str) -> String {
    static TITLE_SEL: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("title").expect("valid selector"));

    doc.select(&TITLE_SEL)
        .next()
        .map(|el| normalize_whitespace(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| url.to_string())
}

/// Concatenate every body text node that is not inside a hidden element.
pub fn visible_text(doc: &Html) -> String {
    static BODY_SEL: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("body").expect("valid selector"));

    let Some(body) = doc.select(&BODY_SEL).next() else {
        return String::new();
    };

    let mut out = String::new();
    for node in body.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|el| HIDDEN_ELEMENTS.contains(&el.name()))
        });
        if hidden {
            continue;
        }
        out.push_str(text);
        out.push(' ');
    }
    out
}

/// Collapse every whitespace run to a single space and trim the ends.
pub fn normalize_whitespace(s: &str) -> String {
    static WS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

    WS_RE.replace_all(s, " ").trim().to_string()
}

/// Keep at most `max_chars` characters, cutting on a char boundary.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].trim_end().to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html>
        <head>
            <title>  Fiber   Splicing | Acme </title>
            <style>body { color: red; }</style>
        </head>
        <body>
            <h1>Fiber splicing</h1>
            <script>var tracking = "do not index";</script>
            <p>We splice
               single-mode and multi-mode fiber.</p>
            <noscript>Enable JavaScript</noscript>
        </body>
    </html>"#;

    #[test]
    fn extracts_title_and_visible_text() {
        let page = normalize_html(PAGE, "https://acme.example.com/fiber", 4000);
        assert_eq!(page.title, "Fiber Splicing | Acme");
        assert_eq!(
            page.text,
            "Fiber splicing We splice single-mode and multi-mode fiber."
        );
        assert!(!page.text.contains("tracking"));
        assert!(!page.text.contains("color"));
        assert!(!page.text.contains("JavaScript"));
    }

    #[test]
    fn title_falls_back_to_url() {
        let page = normalize_html(
            "<html><body><p>No title here</p></body></html>",
            "https://acme.example.com/untitled",
            4000,
        );
        assert_eq!(page.title, "https://acme.example.com/untitled");
    }

    #[test]
    fn blank_title_falls_back_to_url() {
        let page = normalize_html(
            "<html><head><title>   </title></head><body>x</body></html>",
            "https://acme.example.com/",
            4000,
        );
        assert_eq!(page.title, "https://acme.example.com/");
    }

    #[test]
    fn truncates_on_char_boundary() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("abc", 10), "abc");
        // Multi-byte characters count as one.
        assert_eq!(truncate_chars("дебъгване", 4), "дебъ");
        assert_eq!(truncate_chars("anything", 0), "");
    }

    #[test]
    fn text_is_bounded() {
        let long = format!("<html><body><p>{}</p></body></html>", "word ".repeat(2000));
        let page = normalize_html(&long, "https://acme.example.com/", 4000);
        assert!(page.text.chars().count() <= 4000);
        assert!(page.text.starts_with("word word"));
    }

    #[test]
    fn whitespace_is_collapsed() {
        assert_eq!(normalize_whitespace("  a \n\t b\r\n\nc  "), "a b c");
        assert_eq!(normalize_whitespace("   "), "");
    }
}
