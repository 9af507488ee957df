//! Command-line interface definitions for News Courier.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Every argument can be provided via a command-line flag or an environment
//! variable; a `.env` file in the working directory is loaded first.

use crate::error::ConfigError;
use crate::fetcher::DEFAULT_TIMEOUT;
use crate::parser::DEFAULT_MAX_ITEMS;
use chrono::TimeDelta;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// How item summaries are enriched before delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum AnnotatorMode {
    /// Deliver the feed's own summary.
    Off,
    /// Translate the summary (en → ru).
    Translate,
    /// Ask an LLM for a short annotation of the article.
    Annotate,
}

/// Command-line arguments for the News Courier bot.
///
/// # Examples
///
/// ```sh
/// # Minimal: token from the environment, topics from config/topics.yaml
/// TELEGRAM_TOKEN=123:abc news_courier
///
/// # LLM annotations, five items per source
/// news_courier --annotator annotate --deepseek-api-key sk-... --news-per-source 5
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Telegram bot token
    #[arg(long, env = "TELEGRAM_TOKEN", hide_env_values = true)]
    pub telegram_token: Option<String>,

    /// Telegram Bot API base URL
    #[arg(long, env = "TELEGRAM_API_URL", default_value = "https://api.telegram.org")]
    pub telegram_api_url: String,

    /// Comma-separated Telegram user ids allowed to use admin commands
    #[arg(long, env = "ADMIN_IDS", value_delimiter = ',')]
    pub admin_ids: Vec<i64>,

    /// Path to the YAML topic registry
    #[arg(short, long, env = "TOPICS_FILE", default_value = "config/topics.yaml")]
    pub topics_file: PathBuf,

    /// Maximum number of items taken from each source
    #[arg(short, long, env = "NEWS_PER_SOURCE", default_value_t = DEFAULT_MAX_ITEMS)]
    pub news_per_source: usize,

    /// Per-request timeout for feed downloads, in seconds
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT.as_secs())]
    pub fetch_timeout_secs: u64,

    /// Drop items published more than this many hours ago
    #[arg(long, env = "MAX_AGE_HOURS", value_parser = clap::value_parser!(i64).range(1..))]
    pub max_age_hours: Option<i64>,

    /// Summary enrichment mode
    #[arg(short, long, env = "ANNOTATOR", value_enum, default_value_t = AnnotatorMode::Off)]
    pub annotator: AnnotatorMode,

    /// API key for the LLM annotation endpoint
    #[arg(long, env = "DEEPSEEK_API_KEY", hide_env_values = true)]
    pub deepseek_api_key: Option<String>,

    /// OpenAI-compatible chat completions URL used by `--annotator annotate`
    #[arg(
        long,
        env = "ANNOTATE_URL",
        default_value = "https://api.deepseek.com/chat/completions"
    )]
    pub annotate_url: String,

    /// Model name sent to the annotation endpoint
    #[arg(long, env = "ANNOTATE_MODEL", default_value = "deepseek-chat")]
    pub annotate_model: String,

    /// Translation endpoint used by `--annotator translate`
    #[arg(
        long,
        env = "TRANSLATE_URL",
        default_value = "https://api.mymemory.translated.net/get"
    )]
    pub translate_url: String,

    /// Log file path (console logging is always on)
    #[arg(short, long, env = "LOG_FILE", default_value = "logs/bot.log")]
    pub log_file: PathBuf,
}

impl Cli {
    /// The freshness window, if `--max-age-hours` is set.
    pub fn max_age(&self) -> Result<Option<TimeDelta>, ConfigError> {
        self.max_age_hours
            .map(|hours| {
                TimeDelta::try_hours(hours)
                    .ok_or(ConfigError::Invalid("MAX_AGE_HOURS", format!("{hours} is out of range")))
            })
            .transpose()
    }
}
