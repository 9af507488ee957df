//! Source Reader: loads the feed URLs of one topic.
//!
//! A source-list file is plain text with one URL per line. Blank lines and
//! lines starting with `#` are ignored; URLs are not validated here, a bad
//! one simply fails at fetch time.

use crate::error::SourceError;
use crate::models::Source;
use std::path::Path;
use tokio::fs;
use tracing::{debug, instrument};

/// Read the ordered list of sources from `path`.
///
/// # Errors
///
/// [`SourceError::NotFound`] when the file does not exist, [`SourceError::Io`]
/// for any other read failure.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn read_sources(path: &Path) -> Result<Vec<Source>, SourceError> {
    let content = fs::read_to_string(path).await.map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            SourceError::NotFound(path.to_path_buf())
        } else {
            SourceError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    let sources = parse_sources(&content);
    debug!(count = sources.len(), "Read topic sources");
    Ok(sources)
}

/// Split source-list text into sources, skipping blanks and comments.
pub fn parse_sources(content: &str) -> Vec<Source> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(Source::new)
        .collect()
}
