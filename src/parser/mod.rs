//! Feed Parser: raw document text to normalized items.
//!
//! Two interchangeable strategies sit behind [`parse_feed`]:
//!
//! | Strategy | Module | Used when |
//! |----------|--------|-----------|
//! | Strict XML (RSS) | [`rss`] | the text is well-formed XML with a non-`html` root |
//! | Structural HTML scan | [`html`] | XML parsing fails, or the root is `<html>` |
//!
//! Both only ever emit items with a non-empty title and link, at most
//! `max_items` per source. A document with nothing usable yields an empty
//! list rather than an error.

pub mod html;
pub mod rss;

use crate::models::NormalizedItem;
use tracing::debug;

/// Items taken from each source unless configured otherwise.
pub const DEFAULT_MAX_ITEMS: usize = 3;

/// Parse fetched text from `source_url` into at most `max_items` items.
pub fn parse_feed(text: &str, source_url: &str, max_items: usize) -> Vec<NormalizedItem> {
    if max_items == 0 {
        return Vec::new();
    }

    match rss::parse_tree(text) {
        Ok(root) if root.name.eq_ignore_ascii_case("html") => {
            debug!(url = source_url, "Well-formed XHTML page; using HTML scan");
            html::parse_html(text, source_url, max_items)
        }
        Ok(root) => rss::extract_items(&root, max_items),
        Err(e) => {
            debug!(url = source_url, error = %e, "Not XML; falling back to HTML scan");
            html::parse_html(text, source_url, max_items)
        }
    }
}
