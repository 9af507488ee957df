//! The Delivery Loop: sources → items → annotated items → messages.
//!
//! A run is strictly sequential. Before every fetch, annotation and send the
//! loop checks the session's `searching` flag; once it is cleared the loop
//! emits exactly one "stopped" notice and ends. Fetch failures skip the
//! source, send failures are logged, nothing is retried.
//!
//! ```text
//! Idle ──begin──▶ Running ──exhausted──▶ Idle (completed, status line)
//!                    │
//!                    └──flag cleared──▶ Idle (cancelled, one notice)
//! ```

use crate::annotator::Annotate;
use crate::error::TelegramError;
use crate::feed::FetchAndParse;
use crate::models::{OutboundMessage, Source};
use crate::session::{ChatId, SessionHandle, SessionStore};
use crate::utils::truncate_for_log;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

pub const STOPPED_NOTICE: &str = "Работа бота была прервана.\n\nВыберите новую тематику новостей:";
pub const NOTHING_FOUND: &str = "Не удалось найти новости по выбранной теме.";
pub const SOURCES_SKIPPED: &str = "Некоторые источники не удалось обработать.";

/// Outbound side of the chat platform.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, chat: ChatId, message: OutboundMessage) -> Result<(), TelegramError>;
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Completed { sent: usize, skipped: usize },
    Cancelled { sent: usize },
}

/// Text of the final status line for a completed run.
pub fn completion_text(sent: usize, skipped: usize) -> String {
    if sent == 0 {
        return NOTHING_FOUND.to_string();
    }
    let mut text = format!("Готово! Было отправлено {sent} новостей.");
    if skipped > 0 {
        text.push('\n');
        text.push_str(SOURCES_SKIPPED);
    }
    text.push_str("\n\nМожешь выбрать другую тему:");
    text
}

/// Shared, cheaply clonable pipeline a run is executed on.
pub struct DeliveryLoop<F, A, S> {
    reader: Arc<F>,
    annotator: Arc<A>,
    sink: Arc<S>,
    keyboard: Vec<String>,
}

impl<F, A, S> Clone for DeliveryLoop<F, A, S> {
    fn clone(&self) -> Self {
        Self {
            reader: Arc::clone(&self.reader),
            annotator: Arc::clone(&self.annotator),
            sink: Arc::clone(&self.sink),
            keyboard: self.keyboard.clone(),
        }
    }
}

impl<F, A, S> DeliveryLoop<F, A, S>
where
    F: FetchAndParse,
    A: Annotate,
    S: MessageSink,
{
    /// `keyboard` is the topic list attached to the final status line.
    pub fn new(reader: Arc<F>, annotator: Arc<A>, sink: Arc<S>, keyboard: Vec<String>) -> Self {
        Self {
            reader,
            annotator,
            sink,
            keyboard,
        }
    }

    pub fn sink(&self) -> &Arc<S> {
        &self.sink
    }

    async fn deliver(&self, chat: ChatId, message: OutboundMessage) -> bool {
        match self.sink.send(chat, message).await {
            Ok(()) => true,
            Err(e) => {
                error!(chat, error = %e, "Failed to deliver message");
                false
            }
        }
    }

    async fn cancel(&self, chat: ChatId, sent: usize) -> DeliveryOutcome {
        info!(chat, sent, "Delivery cancelled");
        self.deliver(
            chat,
            OutboundMessage::plain(STOPPED_NOTICE).with_keyboard(self.keyboard.clone()),
        )
        .await;
        DeliveryOutcome::Cancelled { sent }
    }

    /// Deliver every item of `sources` to `chat` until exhausted or stopped.
    ///
    /// The session is marked finished in `store` however the run ends.
    #[instrument(level = "info", skip_all, fields(chat, sources = sources.len()))]
    pub async fn run(
        &self,
        chat: ChatId,
        sources: &[Source],
        session: &SessionHandle,
        store: &SessionStore,
    ) -> DeliveryOutcome {
        let outcome = self.run_sources(chat, sources, session).await;
        store.finish(chat, session);
        outcome
    }

    async fn run_sources(
        &self,
        chat: ChatId,
        sources: &[Source],
        session: &SessionHandle,
    ) -> DeliveryOutcome {
        let mut sent = 0;
        let mut skipped = 0;

        for source in sources {
            if !session.is_searching() {
                return self.cancel(chat, sent).await;
            }

            let items = match self.reader.fetch_items(&source.url).await {
                Ok(items) => items,
                Err(e) => {
                    warn!(url = %source.url, error = %e, "Skipping source");
                    skipped += 1;
                    continue;
                }
            };

            for item in items {
                if !session.is_searching() {
                    return self.cancel(chat, sent).await;
                }
                let annotation = self.annotator.annotate(&item).await;

                if !session.is_searching() {
                    return self.cancel(chat, sent).await;
                }
                if self.deliver(chat, item.to_message(&annotation)).await {
                    sent += 1;
                } else {
                    warn!(
                        url = %source.url,
                        title = %truncate_for_log(&item.title, 60),
                        "Item not delivered"
                    );
                }
            }
        }

        // A stop that lands after the last send still gets its notice.
        if !session.is_searching() {
            return self.cancel(chat, sent).await;
        }

        info!(chat, sent, skipped, "Delivery completed");
        self.deliver(
            chat,
            OutboundMessage::plain(completion_text(sent, skipped)).with_keyboard(self.keyboard.clone()),
        )
        .await;
        DeliveryOutcome::Completed { sent, skipped }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::annotator::{Annotator, LlmAnnotator, ANNOTATION_UNAVAILABLE};
    use crate::error::FetchError;
    use crate::feed::FeedReader;
    use crate::fetcher::{FeedFetcher, DEFAULT_TIMEOUT};
    use crate::models::NormalizedItem;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Records messages; optionally stops a session after the n-th send.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub sent: Mutex<Vec<(ChatId, OutboundMessage)>>,
        stop_after: Option<(usize, SessionHandle)>,
        fail_first: bool,
    }

    impl RecordingSink {
        pub fn texts(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|(_, m)| m.text.clone()).collect()
        }
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        async fn send(&self, chat: ChatId, message: OutboundMessage) -> Result<(), TelegramError> {
            let mut sent = self.sent.lock().unwrap();
            sent.push((chat, message));
            if let Some((n, handle)) = &self.stop_after {
                if sent.len() == *n {
                    handle.stop();
                }
            }
            if self.fail_first && sent.len() == 1 {
                return Err(TelegramError::Api("Too Many Requests".into()));
            }
            Ok(())
        }
    }

    /// Canned per-URL results; unknown URLs fail.
    #[derive(Default)]
    pub(crate) struct FakeReader {
        feeds: HashMap<String, Vec<NormalizedItem>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeReader {
        pub fn with(mut self, url: &str, titles: &[&str]) -> Self {
            let items = titles
                .iter()
                .map(|t| NormalizedItem::new(t, &format!("{url}/{t}"), "summary", None).unwrap())
                .collect();
            self.feeds.insert(url.to_string(), items);
            self
        }
    }

    #[async_trait]
    impl FetchAndParse for FakeReader {
        async fn fetch_items(&self, url: &str) -> Result<Vec<NormalizedItem>, FetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            self.feeds.get(url).cloned().ok_or(FetchError::Timeout)
        }
    }

    fn sources(urls: &[&str]) -> Vec<Source> {
        urls.iter().map(|u| Source::new(*u)).collect()
    }

    fn keyboard() -> Vec<String> {
        vec!["Мир".into(), "Технологии".into()]
    }

    fn pipeline<F: FetchAndParse>(reader: F, sink: Arc<RecordingSink>) -> DeliveryLoop<F, Annotator, RecordingSink> {
        DeliveryLoop::new(Arc::new(reader), Arc::new(Annotator::Off), sink, keyboard())
    }

    #[test]
    fn test_completion_text() {
        assert_eq!(
            completion_text(2, 0),
            "Готово! Было отправлено 2 новостей.\n\nМожешь выбрать другую тему:"
        );
        assert!(completion_text(1, 1).contains(SOURCES_SKIPPED));
        assert_eq!(completion_text(0, 3), NOTHING_FOUND);
    }

    #[tokio::test]
    async fn test_run_delivers_all_items_then_status() {
        let store = SessionStore::new();
        let session = store.begin(5).unwrap();
        let sink = Arc::new(RecordingSink::default());
        let reader = FakeReader::default().with("a", &["A1", "A2"]).with("b", &["B1"]);

        let outcome = pipeline(reader, sink.clone())
            .run(5, &sources(&["a", "b"]), &session, &store)
            .await;

        assert_eq!(outcome, DeliveryOutcome::Completed { sent: 3, skipped: 0 });
        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 4);
        assert!(sent.iter().all(|(chat, _)| *chat == 5));
        assert!(sent[0].1.text.starts_with("<b>A1</b>"));
        assert!(sent[0].1.html && sent[0].1.disable_preview);
        assert_eq!(sent[3].1.keyboard, Some(keyboard()));
        assert!(!store.is_searching(5));
    }

    #[tokio::test]
    async fn test_stop_before_run_sends_only_notice() {
        let store = SessionStore::new();
        let session = store.begin(1).unwrap();
        store.stop(1);
        let sink = Arc::new(RecordingSink::default());
        let reader = FakeReader::default().with("a", &["A1"]);
        let pipeline = pipeline(reader, sink.clone());

        let outcome = pipeline.run(1, &sources(&["a"]), &session, &store).await;

        assert_eq!(outcome, DeliveryOutcome::Cancelled { sent: 0 });
        assert_eq!(sink.texts(), vec![STOPPED_NOTICE.to_string()]);
        assert!(pipeline.reader.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stop_during_run_halts_at_next_checkpoint() {
        let store = SessionStore::new();
        let session = store.begin(1).unwrap();
        let sink = Arc::new(RecordingSink {
            stop_after: Some((1, session.clone())),
            ..Default::default()
        });
        let reader = FakeReader::default().with("a", &["A1", "A2"]).with("b", &["B1"]);
        let pipeline = pipeline(reader, sink.clone());

        let outcome = pipeline.run(1, &sources(&["a", "b"]), &session, &store).await;

        assert_eq!(outcome, DeliveryOutcome::Cancelled { sent: 1 });
        let texts = sink.texts();
        assert_eq!(texts.len(), 2);
        assert!(texts[0].starts_with("<b>A1</b>"));
        assert_eq!(texts[1], STOPPED_NOTICE);
        assert_eq!(*pipeline.reader.calls.lock().unwrap(), vec!["a".to_string()]);
        assert!(!store.is_searching(1));
    }

    #[tokio::test]
    async fn test_failing_source_does_not_block_later_sources() {
        let store = SessionStore::new();
        let session = store.begin(1).unwrap();
        let sink = Arc::new(RecordingSink::default());
        let reader = FakeReader::default().with("b", &["B1"]).with("c", &["C1"]);

        let outcome = pipeline(reader, sink.clone())
            .run(1, &sources(&["down", "b", "c"]), &session, &store)
            .await;

        assert_eq!(outcome, DeliveryOutcome::Completed { sent: 2, skipped: 1 });
        let texts = sink.texts();
        assert!(texts[0].starts_with("<b>B1</b>"));
        assert!(texts[1].starts_with("<b>C1</b>"));
        assert!(texts[2].contains(SOURCES_SKIPPED));
    }

    #[tokio::test]
    async fn test_send_failure_is_logged_and_loop_continues() {
        let store = SessionStore::new();
        let session = store.begin(1).unwrap();
        let sink = Arc::new(RecordingSink {
            fail_first: true,
            ..Default::default()
        });
        let reader = FakeReader::default().with("a", &["A1", "A2"]);

        let outcome = pipeline(reader, sink.clone())
            .run(1, &sources(&["a"]), &session, &store)
            .await;

        assert_eq!(outcome, DeliveryOutcome::Completed { sent: 1, skipped: 0 });
        assert_eq!(sink.texts().len(), 3);
    }

    #[tokio::test]
    async fn test_enrichment_failure_still_delivers_item() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let annotator = Annotator::Summarize(LlmAnnotator::new(
            reqwest::Client::new(),
            &server.uri(),
            "key",
            "model",
        ));

        let store = SessionStore::new();
        let session = store.begin(1).unwrap();
        let sink = Arc::new(RecordingSink::default());
        let reader = FakeReader::default().with("a", &["A1"]);
        let pipeline = DeliveryLoop::new(Arc::new(reader), Arc::new(annotator), sink.clone(), keyboard());

        let outcome = pipeline.run(1, &sources(&["a"]), &session, &store).await;

        assert_eq!(outcome, DeliveryOutcome::Completed { sent: 1, skipped: 0 });
        assert!(sink.texts()[0].contains(ANNOTATION_UNAVAILABLE));
    }

    #[tokio::test]
    async fn test_end_to_end_valid_feed_and_invalid_url() {
        let server = MockServer::start().await;
        let rss = "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>T</title>\
            <item><title>First &amp; foremost</title><link>https://news.example/1</link>\
            <description>&lt;p&gt;Lead one&lt;/p&gt;</description></item>\
            <item><title>Second</title><link>https://news.example/2</link>\
            <description>Lead two</description></item>\
            </channel></rss>";
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(rss))
            .mount(&server)
            .await;

        let reader = FeedReader::new(FeedFetcher::new(DEFAULT_TIMEOUT).unwrap(), 3);
        let store = SessionStore::new();
        let session = store.begin(9).unwrap();
        let sink = Arc::new(RecordingSink::default());
        let feed_url = format!("{}/feed.xml", server.uri());

        let outcome = pipeline(reader, sink.clone())
            .run(9, &sources(&[feed_url.as_str(), "not a url"]), &session, &store)
            .await;

        assert_eq!(outcome, DeliveryOutcome::Completed { sent: 2, skipped: 1 });
        let texts = sink.texts();
        assert_eq!(texts.len(), 3);
        assert_eq!(
            texts[0],
            "<b>First &amp; foremost</b>\nLead one\n<a href=\"https://news.example/1\">Источник</a>"
        );
        assert!(texts[1].starts_with("<b>Second</b>\nLead two"));
        assert!(texts[2].starts_with("Готово! Было отправлено 2 новостей."));
    }
}
