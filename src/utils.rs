//! Utility functions for text cleanup, truncation, and file system checks.
//!
//! This module provides helper functions used throughout the application:
//! - Markup stripping and whitespace normalization for extracted text
//! - Character-safe truncation for logs, prompts, and outbound messages
//! - File system validation for the log directory

use html_escape::{decode_html_entities, encode_text};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

// A tag starts with a letter or `/letter`; a bare `<` followed by a space is text.
static TAGS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--.*?-->|</?[A-Za-z][^<>]*>").expect("valid tag regex"));
static BLOCK_TAGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)</?(?:p|div|br|hr|li|ul|ol|h[1-6]|tr|td|th|table|blockquote|section|article|header|footer)\b[^<>]*>")
        .expect("valid block tag regex")
});
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// Strip markup, decode HTML entities, and collapse whitespace.
///
/// Tags are removed before entities are decoded, so an escaped `&lt;` that
/// is part of the text survives. Descriptions that carry escaped markup
/// (`&lt;p&gt;...`) get a second strip pass once decoding reveals real tags.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(clean_text("<p>Hello,&nbsp;<b>world</b></p>"), "Hello, world");
/// assert_eq!(clean_text("growth &gt; 2%"), "growth > 2%");
/// ```
pub fn clean_text(s: &str) -> String {
    let decoded = decode_html_entities(&strip_tags(s)).into_owned();
    let text = if TAGS.is_match(&decoded) {
        decode_html_entities(&strip_tags(&decoded)).into_owned()
    } else {
        decoded
    };
    collapse_whitespace(&text)
}

/// Remove tags. Block-level tags leave a space behind, inline ones nothing.
fn strip_tags(s: &str) -> String {
    let spaced = BLOCK_TAGS.replace_all(s, " ");
    TAGS.replace_all(&spaced, "").into_owned()
}

/// Collapse runs of whitespace to one space and trim.
pub fn collapse_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s, " ").trim().to_string()
}

/// Keep at most `max` characters of `s`, never splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` characters with an ellipsis and
/// byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    let head = truncate_chars(s, max);
    if head.len() == s.len() {
        head
    } else {
        format!("{}…(+{} bytes)", head, s.len() - head.len())
    }
}

/// HTML-escape `s`, cutting it so the escaped result has at most `budget` characters.
///
/// Cutting happens on whole source characters, so an entity is never split.
/// A trailing `…` marks a cut.
pub fn escape_within(s: &str, budget: usize) -> String {
    let full = encode_text(s);
    if full.chars().count() <= budget {
        return full.into_owned();
    }

    let limit = budget.saturating_sub(1);
    let mut out = String::new();
    let mut used = 0usize;
    let mut buf = [0u8; 4];
    for ch in s.chars() {
        let escaped = encode_text(ch.encode_utf8(&mut buf));
        let cost = escaped.chars().count();
        if used + cost > limit {
            break;
        }
        out.push_str(&escaped);
        used += cost;
    }
    if budget > 0 {
        out.push('…');
    }
    out
}

/// Ensure the parent directory of `path` exists and is writable.
///
/// Creates the directory if it doesn't exist, then performs a write test by
/// creating and immediately deleting a probe file.
///
/// # Errors
///
/// Returns an error if:
/// - The directory cannot be created
/// - The directory is not writable (permission denied, read-only filesystem, etc.)
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn ensure_parent_writable(path: &Path) -> Result<(), Box<dyn Error>> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).await?;

    let probe_path = dir.join("..__probe_write__");
    stdfs::File::create(&probe_path)?;
    let _ = stdfs::remove_file(&probe_path);
    info!(dir = %dir.display(), "Log directory is writable");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_strips_markup_and_entities() {
        assert_eq!(clean_text("<p>Hello,&nbsp;<b>world</b></p>"), "Hello, world");
        assert_eq!(
            clean_text("&lt;p&gt;Escaped &amp;amp; markup&lt;/p&gt;"),
            "Escaped & markup"
        );
        assert_eq!(clean_text("  line\n\n  break\t"), "line break");
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn test_clean_text_keeps_escaped_comparisons() {
        assert_eq!(
            clean_text("Inflation &lt; 3% while growth &gt; 2% this year"),
            "Inflation < 3% while growth > 2% this year"
        );
        assert_eq!(clean_text("a <b>x</b> &lt; b"), "a x < b");
    }

    #[test]
    fn test_clean_text_inline_tags_do_not_split_words() {
        assert_eq!(clean_text("Apple<b>'s</b> results<i>.</i>"), "Apple's results.");
        assert_eq!(clean_text("<p>One</p><p>Two</p>"), "One Two");
        assert_eq!(clean_text("line<br/>break<!-- note -->"), "line break");
    }

    #[test]
    fn test_truncate_chars_is_utf8_safe() {
        assert_eq!(truncate_chars("привет", 3), "при");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn test_truncate_for_log_short_string() {
        let s = "Hello, world!";
        assert_eq!(truncate_for_log(s, 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_cyrillic() {
        let result = truncate_for_log("новости дня", 7);
        assert!(result.starts_with("новости"));
    }

    #[test]
    fn test_escape_within_never_splits_entities() {
        assert_eq!(escape_within("a<b", 10), "a&lt;b");
        let cut = escape_within("<<<<", 10);
        assert_eq!(cut, "&lt;&lt;…");
        assert!(cut.chars().count() <= 10);
    }

    #[tokio::test]
    async fn test_ensure_parent_writable_creates_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let log = tmp.path().join("nested").join("bot.log");
        ensure_parent_writable(&log).await.unwrap();
        assert!(tmp.path().join("nested").is_dir());
    }
}
