//! HTML parsing and DOM navigation.
//!
//! This module provides the [`Document`] and [`Element`] handles the
//! extractor walks. A `Document` is produced from fetched HTML and only
//! ever borrowed read-only.
//!
//! # Example
//!
//! ```rust
//! use quarry_core::parse::Document;
//!
//! let html = r#"
//!     <html>
//!         <body>
//!             <div class="card"><h4>Title</h4></div>
//!         </body>
//!     </html>
//! "#;
//!
//! let doc = Document::parse(html);
//! let cards = doc.select("div.card").unwrap();
//! assert_eq!(cards[0].normalized_text(), "Title");
//! ```

use scraper::{Html, Selector};
use url::Url;

use crate::{QuarryError, Result};

/// Parses a CSS selector, mapping failures into [`QuarryError::InvalidSelector`].
pub fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| QuarryError::InvalidSelector(format!("{}: {}", selector, e)))
}

/// Collapses every run of whitespace into a single space and trims the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Represents a parsed HTML document.
///
/// # Example
///
/// ```rust
/// use quarry_core::parse::Document;
///
/// let html = "<html><head><title>Test</title></head><body><p>Hello</p></body></html>";
/// let doc = Document::parse(html);
/// assert_eq!(doc.title(), Some("Test".to_string()));
/// ```
pub struct Document {
    html: Html,
    base_url: Option<Url>,
}

impl Document {
    /// Parses HTML from a string.
    ///
    /// HTML parsing is lenient; malformed markup still yields a document.
    pub fn parse(html: &str) -> Self {
        Self { html: Html::parse_document(html), base_url: None }
    }

    /// Parses HTML and remembers the URL it was fetched from.
    ///
    /// The base URL is what relative links in extracted records are resolved
    /// against by [`crate::transform::AbsolutizeUrl`] when no explicit base is configured.
    pub fn parse_with_url(html: &str, base_url: Option<Url>) -> Self {
        Self { html: Html::parse_document(html), base_url }
    }

    /// Gets the base URL the document was fetched from, if known.
    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Gets the underlying `scraper::Html`.
    pub fn html(&self) -> &Html {
        &self.html
    }

    /// Selects elements using a CSS selector string.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::InvalidSelector`] if the selector is invalid.
    pub fn select(&'_ self, selector: &str) -> Result<Vec<Element<'_>>> {
        let sel = parse_selector(selector)?;
        Ok(self.select_with(&sel))
    }

    /// Selects every element matching a pre-compiled selector, in document order.
    pub fn select_with(&'_ self, selector: &Selector) -> Vec<Element<'_>> {
        self.html.select(selector).map(|element| Element { element }).collect()
    }

    /// Gets the content of the `<title>` element if present.
    pub fn title(&self) -> Option<String> {
        let selector = Selector::parse("title").ok()?;
        self.html
            .select(&selector)
            .next()
            .map(|el| normalize_whitespace(&el.text().collect::<String>()))
    }
}

/// A wrapper around scraper's ElementRef.
///
/// Element is the context node fields are evaluated against. Selections
/// made through it only ever reach descendants, never the element itself
/// or its ancestors.
///
/// # Example
///
/// ```rust
/// use quarry_core::parse::Document;
///
/// let html = r#"<a href="/poem/1">Link text</a>"#;
/// let doc = Document::parse(html);
/// let link = &doc.select("a").unwrap()[0];
///
/// assert_eq!(link.text(), "Link text");
/// assert_eq!(link.attr("href"), Some("/poem/1"));
/// ```
#[derive(Clone, Debug)]
pub struct Element<'a> {
    element: scraper::ElementRef<'a>,
}

impl<'a> Element<'a> {
    /// Gets the raw concatenation of all text nodes within this element.
    pub fn text(&self) -> String {
        self.element.text().collect()
    }

    /// Gets the text content with whitespace collapsed and trimmed.
    pub fn normalized_text(&self) -> String {
        normalize_whitespace(&self.text())
    }

    /// Gets the value of an attribute, or `None` if not present.
    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.element.value().attr(name)
    }

    /// Gets the lowercase tag name of this element.
    pub fn tag_name(&self) -> String {
        self.element.value().name().to_lowercase()
    }

    /// Selects descendant elements using a CSS selector string.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::InvalidSelector`] if the selector is invalid.
    pub fn select(&self, selector: &str) -> Result<Vec<Element<'a>>> {
        let sel = parse_selector(selector)?;
        Ok(self.select_with(&sel))
    }

    /// Selects every descendant matching a pre-compiled selector, in document order.
    pub fn select_with(&self, selector: &Selector) -> Vec<Element<'a>> {
        self.element.select(selector).map(|element| Element { element }).collect()
    }

    /// Returns the first descendant matching a pre-compiled selector.
    pub fn select_first(&self, selector: &Selector) -> Option<Element<'a>> {
        self.element.select(selector).next().map(|element| Element { element })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_HTML: &str = r#"
        <!DOCTYPE html>
        <html lang="zh">
        <head>
            <meta charset="UTF-8">
            <title>  Poems  </title>
        </head>
        <body>
            <div class="card-body">
                <h4 class="card-title">静夜思</h4>
                <div class="card-content">
                    床前明月光，
                    疑是地上霜。
                </div>
                <a class="card-link" href="/pinyin/1">拼音</a>
            </div>
        </body>
        </html>
    "#;

    #[test]
    fn test_parse_document() {
        let doc = Document::parse(SAMPLE_HTML);
        assert_eq!(doc.title(), Some("Poems".to_string()));
        assert!(doc.base_url().is_none());
    }

    #[test]
    fn test_parse_with_url_keeps_base() {
        let url = Url::parse("https://example.com/list").unwrap();
        let doc = Document::parse_with_url(SAMPLE_HTML, Some(url.clone()));
        assert_eq!(doc.base_url(), Some(&url));
    }

    #[test]
    fn test_normalized_text() {
        let doc = Document::parse(SAMPLE_HTML);
        let content = &doc.select("div.card-content").unwrap()[0];
        assert_eq!(content.normalized_text(), "床前明月光， 疑是地上霜。");
    }

    #[test]
    fn test_element_attributes() {
        let doc = Document::parse(SAMPLE_HTML);
        let links = doc.select("a.card-link").unwrap();

        assert_eq!(links.len(), 1);
        assert_eq!(links[0].attr("href"), Some("/pinyin/1"));
        assert_eq!(links[0].attr("title"), None);
        assert_eq!(links[0].tag_name(), "a");
    }

    #[test]
    fn test_select_is_scoped_to_descendants() {
        let doc = Document::parse(r#"<div class="outer"><div class="outer inner">x</div></div>"#);
        let outer = &doc.select("div.outer").unwrap()[0];
        let nested = outer.select("div.outer").unwrap();
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].text(), "x");
    }

    #[test]
    fn test_invalid_selector() {
        let doc = Document::parse(SAMPLE_HTML);
        let result = doc.select("[[invalid");

        assert!(matches!(result, Err(QuarryError::InvalidSelector(_))));
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a \n\t b  "), "a b");
        assert_eq!(normalize_whitespace("\u{3000}春晓\u{3000}"), "春晓");
        assert_eq!(normalize_whitespace(""), "");
    }
}
