//! The `FetchAndParse` capability: one source URL in, normalized items out.
//!
//! [`FeedReader`] combines the [`FeedFetcher`] with [`parse_feed`] and the
//! optional freshness filter. The delivery loop only sees the trait, which
//! keeps the RSS and HTML strategies interchangeable behind one call.

use crate::error::FetchError;
use crate::fetcher::FeedFetcher;
use crate::models::NormalizedItem;
use crate::parser::parse_feed;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument};

/// Fetch a source and parse it into items.
#[async_trait]
pub trait FetchAndParse: Send + Sync {
    /// Items from `url`, capped at the reader's per-source limit.
    ///
    /// An `Err` means the source could not be downloaded; a document with no
    /// usable items is `Ok(vec![])`.
    async fn fetch_items(&self, url: &str) -> Result<Vec<NormalizedItem>, FetchError>;
}

/// HTTP-backed [`FetchAndParse`] implementation.
#[derive(Debug, Clone)]
pub struct FeedReader {
    fetcher: FeedFetcher,
    max_items: usize,
    max_age: Option<Duration>,
}

impl FeedReader {
    pub fn new(fetcher: FeedFetcher, max_items: usize) -> Self {
        Self {
            fetcher,
            max_items,
            max_age: None,
        }
    }

    /// Drop items published longer ago than `max_age`.
    ///
    /// With the filter on, items whose `pubDate` is missing or not RFC 2822
    /// are dropped as well.
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }
}

#[async_trait]
impl FetchAndParse for FeedReader {
    #[instrument(level = "info", skip(self))]
    async fn fetch_items(&self, url: &str) -> Result<Vec<NormalizedItem>, FetchError> {
        let body = self.fetcher.fetch(url).await?;

        // The freshness filter runs before the cap so stale entries don't use up slots.
        let limit = if self.max_age.is_some() {
            usize::MAX
        } else {
            self.max_items
        };
        let mut items = parse_feed(&body, url, limit);

        if let Some(max_age) = self.max_age {
            let now = Utc::now();
            let before = items.len();
            items.retain(|item| is_recent(item, max_age, now));
            debug!(dropped = before - items.len(), "Applied freshness filter");
            items.truncate(self.max_items);
        }

        if items.is_empty() {
            info!("No usable items in source");
        }
        Ok(items)
    }
}

/// Whether `item` was published within `max_age` of `now`.
pub fn is_recent(item: &NormalizedItem, max_age: Duration, now: DateTime<Utc>) -> bool {
    item.published_at
        .as_deref()
        .and_then(|ts| DateTime::parse_from_rfc2822(ts).ok())
        .is_some_and(|published| now.signed_duration_since(published) <= max_age)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::DEFAULT_TIMEOUT;
    use chrono::TimeZone;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn item(published: Option<&str>) -> NormalizedItem {
        NormalizedItem::new("t", "https://a.example/", "", published).unwrap()
    }

    #[test]
    fn test_is_recent() {
        let now = Utc.with_ymd_and_hms(2024, 5, 6, 12, 0, 0).unwrap();
        let window = Duration::hours(48);

        assert!(is_recent(&item(Some("Mon, 06 May 2024 08:00:00 GMT")), window, now));
        assert!(is_recent(&item(Some("Sat, 04 May 2024 13:00:00 +0000")), window, now));
        assert!(!is_recent(&item(Some("Fri, 03 May 2024 08:00:00 GMT")), window, now));
        assert!(!is_recent(&item(Some("yesterday")), window, now));
        assert!(!is_recent(&item(None), window, now));
    }

    #[tokio::test]
    async fn test_reader_fetches_and_parses() {
        let server = MockServer::start().await;
        let rss = "<rss><channel>\
            <item><title>A</title><link>https://a.example/1</link></item>\
            <item><title>B</title><link>https://a.example/2</link></item>\
            <item><title>C</title><link>https://a.example/3</link></item>\
            </channel></rss>";
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(rss))
            .mount(&server)
            .await;

        let reader = FeedReader::new(FeedFetcher::new(DEFAULT_TIMEOUT).unwrap(), 2);
        let items = reader.fetch_items(&server.uri()).await.unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn test_freshness_filter_runs_before_cap() {
        let server = MockServer::start().await;
        let recent = Utc::now().to_rfc2822();
        let rss = format!(
            "<rss><channel>\
             <item><title>Old</title><link>https://a.example/1</link><pubDate>Mon, 01 Jan 2001 00:00:00 GMT</pubDate></item>\
             <item><title>New</title><link>https://a.example/2</link><pubDate>{recent}</pubDate></item>\
             </channel></rss>"
        );
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(rss))
            .mount(&server)
            .await;

        let reader = FeedReader::new(FeedFetcher::new(DEFAULT_TIMEOUT).unwrap(), 1)
            .with_max_age(Some(Duration::hours(48)));
        let items = reader.fetch_items(&server.uri()).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "New");
    }

    #[tokio::test]
    async fn test_reader_propagates_fetch_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let reader = FeedReader::new(FeedFetcher::new(DEFAULT_TIMEOUT).unwrap(), 3);
        assert!(matches!(
            reader.fetch_items(&server.uri()).await,
            Err(FetchError::HttpStatus(404))
        ));
    }
}
