//! Error types for each pipeline stage.
//!
//! Every stage has its own enum so callers can tell a skipped source from a
//! failed send. Only [`ConfigError`] is fatal; the rest are logged and the
//! delivery loop moves on.

use std::path::PathBuf;
use thiserror::Error;

/// A feed URL could not be downloaded.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("request failed: {0}")]
    Network(#[source] reqwest::Error),
    /// The request exceeded the configured timeout
    #[error("request timed out")]
    Timeout,
    /// HTTP response with a non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// The body could not be read or decoded as text
    #[error("failed to read body: {0}")]
    Body(#[source] reqwest::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Network(e)
        }
    }
}

/// A topic's source list could not be loaded.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The translation or annotation endpoint did not produce usable text.
#[derive(Debug, Error)]
pub enum AnnotateError {
    #[error("annotation request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("annotation service returned status {0}")]
    Status(u16),
    #[error("annotation response had no text")]
    EmptyResponse,
}

/// The chat platform rejected or never received a request.
#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("telegram request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("telegram API error: {0}")]
    Api(String),
}

/// Startup configuration is missing or unusable.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required setting {0} is missing")]
    Missing(&'static str),
    #[error("failed to read topic registry {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid topic registry {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("topic registry {} defines no topics", .0.display())]
    NoTopics(PathBuf),
    #[error("duplicate topic label {0:?}")]
    DuplicateTopic(String),
    #[error("invalid setting {0}: {1}")]
    Invalid(&'static str, String),
}
