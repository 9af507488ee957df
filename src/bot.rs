//! Bot dispatcher: routes inbound chat messages and runs the polling loop.
//!
//! | Input | Reaction |
//! |-------|----------|
//! | `/start` | greeting with the topic keyboard |
//! | `/stop` | clears the chat's flag; the running loop sends the notice |
//! | a topic label | reads the topic's sources, then spawns a delivery run |
//! | `/status` (admins) | number of active runs |
//! | anything else | a hint to pick a topic |
//!
//! Delivery runs are spawned as their own tasks so polling, and therefore
//! `/stop`, keeps working while a run is in flight.

use crate::annotator::Annotate;
use crate::config::TopicRegistry;
use crate::delivery::{DeliveryLoop, DeliveryOutcome, MessageSink};
use crate::feed::FetchAndParse;
use crate::models::OutboundMessage;
use crate::session::{ChatId, SessionStore};
use crate::sources::read_sources;
use crate::telegram::{TelegramClient, Update};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

pub const GREETING: &str = "Привет! Выбери интересующую тематику новостей:";
pub const FALLBACK: &str = "Пожалуйста, выберите тему новостей из списка.";
pub const FILE_MISSING: &str = "Файл с источниками не найден. Обратитесь к администратору.";
pub const EMPTY_TOPIC: &str = "В этом разделе пока нет источников.";
pub const LOADING: &str = "Загружаю новости. Это может занять некоторое время...";
pub const ALREADY_RUNNING: &str = "Новости уже загружаются. Отправьте /stop, чтобы прервать загрузку.";
pub const NOTHING_RUNNING: &str = "Сейчас ничего не загружается.\n\nВыберите тематику новостей:";

const POLL_TIMEOUT_SECS: u64 = 30;
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Command dispatcher bound to one pipeline.
pub struct Bot<F, A, S> {
    registry: Arc<TopicRegistry>,
    store: Arc<SessionStore>,
    pipeline: DeliveryLoop<F, A, S>,
    admin_ids: Vec<i64>,
}

impl<F, A, S> Bot<F, A, S>
where
    F: FetchAndParse + 'static,
    A: Annotate + 'static,
    S: MessageSink + 'static,
{
    pub fn new(
        registry: TopicRegistry,
        reader: Arc<F>,
        annotator: Arc<A>,
        sink: Arc<S>,
        admin_ids: Vec<i64>,
    ) -> Self {
        let pipeline = DeliveryLoop::new(reader, annotator, sink, registry.labels());
        Self {
            registry: Arc::new(registry),
            store: Arc::new(SessionStore::new()),
            pipeline,
            admin_ids,
        }
    }

    fn keyboard(&self) -> Vec<String> {
        self.registry.labels()
    }

    async fn reply(&self, chat: ChatId, message: OutboundMessage) {
        if let Err(e) = self.pipeline.sink().send(chat, message).await {
            error!(chat, error = %e, "Failed to send reply");
        }
    }

    async fn reply_with_keyboard(&self, chat: ChatId, text: &str) {
        self.reply(chat, OutboundMessage::plain(text).with_keyboard(self.keyboard()))
            .await;
    }

    /// Dispatch one update. Returns the spawned run when a topic was selected.
    pub async fn handle_update(&self, update: &Update) -> Option<JoinHandle<DeliveryOutcome>> {
        let message = update.message.as_ref()?;
        let text = message.text.as_deref()?;
        self.handle_text(message.chat.id, message.from.as_ref().map(|u| u.id), text)
            .await
    }

    #[instrument(level = "info", skip(self, text))]
    pub async fn handle_text(
        &self,
        chat: ChatId,
        user: Option<i64>,
        text: &str,
    ) -> Option<JoinHandle<DeliveryOutcome>> {
        let text = text.trim();
        // `/cmd@botname` in group chats.
        let command = text
            .strip_prefix('/')
            .map(|c| c.split('@').next().unwrap_or(c));

        match command {
            Some("start") => {
                self.reply_with_keyboard(chat, GREETING).await;
                None
            }
            Some("stop") => {
                if !self.store.stop(chat) {
                    self.reply_with_keyboard(chat, NOTHING_RUNNING).await;
                }
                None
            }
            Some("status") if user.is_some_and(|id| self.admin_ids.contains(&id)) => {
                let status = format!(
                    "Активных загрузок: {}\nТем: {}",
                    self.store.active(),
                    self.keyboard().len()
                );
                self.reply(chat, OutboundMessage::plain(status)).await;
                None
            }
            _ if self.registry.get(text).is_some() => self.select_topic(chat, text).await,
            _ => {
                debug!(chat, "Unrecognized message");
                self.reply_with_keyboard(chat, FALLBACK).await;
                None
            }
        }
    }

    async fn select_topic(&self, chat: ChatId, label: &str) -> Option<JoinHandle<DeliveryOutcome>> {
        let topic = self.registry.get(label)?;
        if self.store.is_searching(chat) {
            self.reply(chat, OutboundMessage::plain(ALREADY_RUNNING)).await;
            return None;
        }
        let path = self.registry.source_path(topic);

        let sources = match read_sources(&path).await {
            Ok(sources) => sources,
            Err(e) => {
                error!(topic = label, error = %e, "Cannot read topic sources");
                self.reply(chat, OutboundMessage::plain(FILE_MISSING)).await;
                return None;
            }
        };
        if sources.is_empty() {
            warn!(topic = label, path = %path.display(), "Topic has no sources");
            self.reply(chat, OutboundMessage::plain(EMPTY_TOPIC)).await;
            return None;
        }

        let Some(session) = self.store.begin(chat) else {
            self.reply(chat, OutboundMessage::plain(ALREADY_RUNNING)).await;
            return None;
        };

        info!(chat, topic = label, sources = sources.len(), "Starting delivery");
        self.reply(chat, OutboundMessage::plain(LOADING)).await;

        let pipeline = self.pipeline.clone();
        let store = Arc::clone(&self.store);
        Some(tokio::spawn(async move {
            pipeline.run(chat, &sources, &session, &store).await
        }))
    }
}

impl<F, A> Bot<F, A, TelegramClient>
where
    F: FetchAndParse + 'static,
    A: Annotate + 'static,
{
    /// Long-poll the Bot API until Ctrl-C.
    pub async fn run_polling(&self) {
        let client = Arc::clone(self.pipeline.sink());
        let mut offset = 0;
        info!(topics = self.keyboard().len(), "Polling for updates");

        loop {
            let updates = tokio::select! {
                res = client.get_updates(offset, POLL_TIMEOUT_SECS) => res,
                _ = tokio::signal::ctrl_c() => break,
            };

            match updates {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        self.handle_update(&update).await;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "getUpdates failed; retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(POLL_RETRY_DELAY) => {}
                        _ = tokio::signal::ctrl_c() => break,
                    }
                }
            }
        }

        info!(active = self.store.active(), "Shutting down");
    }
}
