//! # News Courier
//!
//! A Telegram bot that delivers news by topic. The user picks a topic from a
//! reply keyboard; the bot reads that topic's list of feed URLs, fetches each
//! one, parses it as RSS (falling back to a structural HTML scan), optionally
//! translates or annotates every article, and sends one message per article.
//!
//! ## Features
//!
//! - Topics and their source lists configured in `config/topics.yaml`
//! - Strict RSS parsing with an HTML fallback and per-site extraction rules
//! - Optional enrichment: MyMemory translation or DeepSeek annotation
//! - `/stop` cancels a run at the next checkpoint; runs never block polling
//! - Console and file logging through `tracing`
//!
//! ## Usage
//!
//! ```sh
//! TELEGRAM_TOKEN=123:abc news_courier -t config/topics.yaml -n 3 -a translate
//! ```
//!
//! ## Architecture
//!
//! 1. **Sources**: read the newline-delimited URL list of a topic
//! 2. **Fetching**: one GET per source with a fixed timeout and User-Agent
//! 3. **Parsing**: XML tree → `channel/item`, or HTML rules, capped per source
//! 4. **Annotation**: translate or summarize the item, falling back on failure
//! 5. **Delivery**: format and send, checking the session's stop flag throughout

use clap::Parser;
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod annotator;
mod bot;
mod cli;
mod config;
mod delivery;
mod error;
mod feed;
mod fetcher;
mod models;
mod parser;
mod session;
mod sources;
mod telegram;
mod utils;

use annotator::{Annotator, AnnotatorSettings};
use bot::Bot;
use cli::Cli;
use config::TopicRegistry;
use error::ConfigError;
use feed::FeedReader;
use fetcher::FeedFetcher;
use telegram::TelegramClient;
use utils::ensure_parent_writable;

/// Console layer plus a non-blocking file layer writing `log_file`.
///
/// The returned guard flushes the file writer on drop and must outlive `main`'s work.
fn init_tracing(log_file: &Path) -> Result<WorkerGuard, Box<dyn Error>> {
    let file_name = log_file
        .file_name()
        .ok_or("LOG_FILE must name a file")?;
    let dir = match log_file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));

    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_log = tfmt::layer()
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(UtcTime::rfc_3339())
        .with_filter(filter());
    let file_log = tfmt::layer()
        .with_ansi(false)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(file_writer)
        .with_filter(filter());

    tracing_subscriber::registry()
        .with(stdout_log)
        .with(file_log)
        .init();
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // A missing .env is fine; real environment variables still apply.
    dotenvy::dotenv().ok();
    let args = Cli::parse();

    ensure_parent_writable(&args.log_file).await?;
    let _guard = init_tracing(&args.log_file)?;
    info!(version = env!("CARGO_PKG_VERSION"), "news_courier starting up");

    let token = args
        .telegram_token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ConfigError::Missing("TELEGRAM_TOKEN"))
        .inspect_err(|e| error!(error = %e, "Cannot start without a bot token"))?;

    let registry = TopicRegistry::load(&args.topics_file)
        .inspect_err(|e| error!(error = %e, "Topic registry is unusable"))?;

    let max_age = args
        .max_age()
        .inspect_err(|e| error!(error = %e, "Invalid freshness window"))?;
    let fetcher = FeedFetcher::new(Duration::from_secs(args.fetch_timeout_secs))?;
    let reader = FeedReader::new(fetcher, args.news_per_source).with_max_age(max_age);

    let annotator = Annotator::from_settings(&AnnotatorSettings {
        mode: args.annotator,
        api_key: args.deepseek_api_key.clone(),
        annotate_url: args.annotate_url.clone(),
        annotate_model: args.annotate_model.clone(),
        translate_url: args.translate_url.clone(),
    })?;
    let client = TelegramClient::new(&args.telegram_api_url, token)?;

    info!(
        topics = registry.labels().len(),
        news_per_source = args.news_per_source,
        annotator = ?args.annotator,
        max_age_hours = ?args.max_age_hours,
        admins = args.admin_ids.len(),
        "Configuration loaded"
    );

    let bot = Bot::new(
        registry,
        Arc::new(reader),
        Arc::new(annotator),
        Arc::new(client),
        args.admin_ids.clone(),
    );
    bot.run_polling().await;

    info!("news_courier stopped");
    Ok(())
}
