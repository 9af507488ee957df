//! Data models shared by the ingestion pipeline and the chat adapter.
//!
//! This module defines the core data structures used throughout the application:
//! - [`NormalizedItem`]: One article, in the uniform shape every parser strategy emits
//! - [`Source`]: One feed URL read from a topic file
//! - [`OutboundMessage`]: A message ready to hand to the chat platform
//!
//! Items are rendered to the platform's HTML subset by [`NormalizedItem::to_message`].

use crate::utils::escape_within;
use html_escape::encode_double_quoted_attribute;
use serde::{Deserialize, Serialize};

/// Telegram rejects messages longer than this many characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Characters of the escaped headline kept in a message.
pub const MAX_TITLE_CHARS: usize = 512;

/// Label of the hyperlink appended to every item message.
const SOURCE_LINK_LABEL: &str = "Источник";

/// A news item normalized from an RSS entry or an HTML listing.
///
/// Parsers guarantee that `title` and `link` are non-empty after trimming;
/// an item missing either is dropped before it leaves the parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedItem {
    /// Article headline.
    pub title: String,
    /// Absolute article URL. Also used as the dedupe key within a source.
    pub link: String,
    /// Plain-text summary, possibly empty.
    pub summary: String,
    /// Raw publication timestamp exactly as the source wrote it.
    pub published_at: Option<String>,
}

impl NormalizedItem {
    /// Build an item from raw extracted fields, or `None` if title or link is blank.
    pub fn new(
        title: &str,
        link: &str,
        summary: &str,
        published_at: Option<&str>,
    ) -> Option<Self> {
        let title = title.trim();
        let link = link.trim();
        if title.is_empty() || link.is_empty() {
            return None;
        }
        Some(Self {
            title: title.to_string(),
            link: link.to_string(),
            summary: summary.trim().to_string(),
            published_at: published_at
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        })
    }

    /// Render the item as an HTML message using the enriched title and body.
    ///
    /// The title is capped at [`MAX_TITLE_CHARS`] and the body shortened so
    /// the message fits the platform limit.
    pub fn to_message(&self, annotation: &Annotation) -> OutboundMessage {
        let title = escape_within(annotation.title.trim(), MAX_TITLE_CHARS);
        let href = encode_double_quoted_attribute(&self.link);
        let frame = format!("<b>{title}</b>\n\n<a href=\"{href}\">{SOURCE_LINK_LABEL}</a>");
        let budget = MAX_MESSAGE_CHARS.saturating_sub(frame.chars().count());
        let body = escape_within(annotation.body.trim(), budget);

        OutboundMessage::html(format!(
            "<b>{title}</b>\n{body}\n<a href=\"{href}\">{SOURCE_LINK_LABEL}</a>"
        ))
    }
}

/// Title and body an item is delivered with, after enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub title: String,
    pub body: String,
}

impl Annotation {
    /// The item's own title and summary, unchanged.
    pub fn passthrough(item: &NormalizedItem) -> Self {
        Self {
            title: item.title.clone(),
            body: item.summary.clone(),
        }
    }
}

/// One feed URL from a topic file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// The URL exactly as listed, trimmed.
    pub url: String,
}

impl Source {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// A message addressed to a chat, independent of the transport.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutboundMessage {
    /// Message text; HTML markup when `html` is set.
    pub text: String,
    /// Whether `text` uses the platform's HTML subset.
    pub html: bool,
    /// Suppress link preview expansion.
    pub disable_preview: bool,
    /// Reply keyboard, one button per row.
    pub keyboard: Option<Vec<String>>,
}

impl OutboundMessage {
    /// A plain-text status line.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// An HTML message with link previews disabled.
    pub fn html(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            html: true,
            disable_preview: true,
            keyboard: None,
        }
    }

    /// Attach a one-button-per-row reply keyboard.
    pub fn with_keyboard(mut self, buttons: Vec<String>) -> Self {
        self.keyboard = Some(buttons);
        self
    }
}
