//! Small helpers over `scraper` shared by the source adapters.
//!
//! Selectors are written inline at call sites; one that fails to parse
//! simply matches nothing.

use std::collections::HashSet;

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::document::WorkItem;

/// Parses a fetched body as an HTML document (lossy UTF-8).
#[must_use]
pub fn parse_body(body: &[u8]) -> Html {
    Html::parse_document(&String::from_utf8_lossy(body))
}

/// All elements under `scope` matching `css`, in document order.
#[must_use]
pub fn select_all<'a>(scope: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => scope.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

/// First element under `scope` matching `css`.
#[must_use]
pub fn select_first<'a>(scope: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    scope.select(&selector).next()
}

/// Concatenated text of `element`, trimmed.
#[must_use]
pub fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Trimmed text of the first match of `css`, or an empty string.
#[must_use]
pub fn text_at(scope: ElementRef<'_>, css: &str) -> String {
    select_first(scope, css).map(text_of).unwrap_or_default()
}

/// Text of `element` with each text node trimmed and the pieces joined.
#[must_use]
pub fn stripped_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect()
}

/// Resolves an `href` against `base`, skipping script, mail and fragment links.
#[must_use]
pub fn resolve_href(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:") || lower.starts_with("mailto:") || lower.starts_with("tel:") {
        return None;
    }
    base.join(href)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
}

/// Resolved `href` attribute of `element`.
#[must_use]
pub fn link_target(base: &Url, element: ElementRef<'_>) -> Option<Url> {
    element
        .value()
        .attr("href")
        .and_then(|href| resolve_href(base, href))
}

/// Nearest enclosing `<tr>` of `element`.
#[must_use]
pub fn enclosing_row(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| ancestor.value().name() == "tr")
}

/// Keeps only the ASCII digits of `text`.
#[must_use]
pub fn digits_only(text: &str) -> String {
    text.chars().filter(char::is_ascii_digit).collect()
}

/// Drops items whose URL was already seen, keeping first occurrences in order.
#[must_use]
pub fn dedup_items(items: Vec<WorkItem>) -> Vec<WorkItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.url().to_string()))
        .collect()
}

/// Drops repeated URLs, keeping first occurrences in order.
#[must_use]
pub fn dedup_urls(urls: Vec<Url>) -> Vec<Url> {
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|url| seen.insert(url.as_str().to_string()))
        .collect()
}
