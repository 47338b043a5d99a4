//! Small helpers over `scraper` documents

use super::ListingIssue;
use scraper::{ElementRef, Html, Selector};

/// Compiles a CSS selector, reporting a bad one as a listing issue
pub fn css(selector: &str) -> Result<Selector, ListingIssue> {
    Selector::parse(selector)
        .map_err(|e| ListingIssue::new(format!("Invalid selector '{selector}': {e:?}")))
}

/// Collapses an element's text nodes into single-spaced text
pub fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of the first element matching `selector`, if any
pub fn first_text(doc: &Html, selector: &str) -> Result<Option<String>, ListingIssue> {
    let sel = css(selector)?;
    Ok(doc.select(&sel).next().map(text_of))
}

/// Text of the first element matching `selector`, or a listing issue naming `what`
pub fn require_text(doc: &Html, selector: &str, what: &str) -> Result<String, ListingIssue> {
    first_text(doc, selector)?
        .ok_or_else(|| ListingIssue::new(format!("Could not find {what}")))
}

/// Non-empty trimmed text, or `None`
pub fn non_empty(text: String) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
