//! Annotator: optional enrichment of an item's summary via an external service.
//!
//! Two backends exist:
//! - [`Translator`]: a MyMemory-style `GET ?q=..&langpair=en|ru` endpoint
//! - [`LlmAnnotator`]: an OpenAI-compatible chat completions endpoint (DeepSeek by default)
//!
//! Enrichment never fails from the caller's point of view. A translation
//! error falls back to the original summary; an annotation error falls back to
//! [`ANNOTATION_UNAVAILABLE`]. Either way the item is still delivered.

use crate::cli::AnnotatorMode;
use crate::error::AnnotateError;
use crate::models::{Annotation, NormalizedItem};
use crate::utils::{truncate_chars, truncate_for_log};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Characters of item text sent to the service.
pub const MAX_INPUT_CHARS: usize = 500;

/// Shown instead of an annotation the service could not produce.
pub const ANNOTATION_UNAVAILABLE: &str = "(не удалось получить аннотацию)";

/// Returned by the translator for an item without a summary.
pub const NOTHING_TO_TRANSLATE: &str = "(нет текста для перевода)";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const ANNOTATION_PROMPT: &str = "Ты редактор новостной ленты. Перескажи суть новости на русском языке \
в двух-трёх предложениях, без вступлений и оценок.";

/// Produce the title and summary delivered for an item.
#[async_trait]
pub trait Annotate: Send + Sync {
    /// The enriched item text. Implementations fall back instead of failing.
    async fn annotate(&self, item: &NormalizedItem) -> Annotation;
}

/// Configured enrichment backend.
#[derive(Debug, Clone)]
pub enum Annotator {
    /// Pass the feed's summary through unchanged.
    Off,
    Translate(Translator),
    Summarize(LlmAnnotator),
}

/// Settings needed to build an [`Annotator`].
#[derive(Debug, Clone)]
pub struct AnnotatorSettings {
    pub mode: AnnotatorMode,
    pub api_key: Option<String>,
    pub annotate_url: String,
    pub annotate_model: String,
    pub translate_url: String,
}

impl Annotator {
    /// Build the backend for `settings.mode`.
    ///
    /// `annotate` without an API key degrades to `Off` with a warning.
    pub fn from_settings(settings: &AnnotatorSettings) -> Result<Self, reqwest::Error> {
        let client = || Client::builder().timeout(REQUEST_TIMEOUT).build();
        Ok(match settings.mode {
            AnnotatorMode::Off => Annotator::Off,
            AnnotatorMode::Translate => {
                Annotator::Translate(Translator::new(client()?, &settings.translate_url))
            }
            AnnotatorMode::Annotate => match settings.api_key.as_deref() {
                Some(key) if !key.trim().is_empty() => Annotator::Summarize(LlmAnnotator::new(
                    client()?,
                    &settings.annotate_url,
                    key.trim(),
                    &settings.annotate_model,
                )),
                _ => {
                    warn!("Annotation mode needs DEEPSEEK_API_KEY; delivering feed summaries as-is");
                    Annotator::Off
                }
            },
        })
    }
}

#[async_trait]
impl Annotate for Annotator {
    async fn annotate(&self, item: &NormalizedItem) -> Annotation {
        match self {
            Annotator::Off => Annotation::passthrough(item),
            Annotator::Translate(t) => {
                let title = translate_or_keep(t, item, &item.title, "title").await;
                let body = if item.summary.trim().is_empty() {
                    NOTHING_TO_TRANSLATE.to_string()
                } else {
                    translate_or_keep(t, item, &item.summary, "summary").await
                };
                Annotation { title, body }
            }
            Annotator::Summarize(llm) => {
                let body = match llm.summarize(item).await {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(
                            title = %truncate_for_log(&item.title, 60),
                            error = %e,
                            "Annotation failed; using placeholder"
                        );
                        ANNOTATION_UNAVAILABLE.to_string()
                    }
                };
                Annotation {
                    title: item.title.clone(),
                    body,
                }
            }
        }
    }
}

async fn translate_or_keep(
    translator: &Translator,
    item: &NormalizedItem,
    text: &str,
    field: &'static str,
) -> String {
    match translator.translate(text).await {
        Ok(translated) => translated,
        Err(e) => {
            warn!(
                title = %truncate_for_log(&item.title, 60),
                field,
                error = %e,
                "Translation failed; keeping original"
            );
            text.to_string()
        }
    }
}

/// Client for a MyMemory-compatible translation endpoint.
#[derive(Debug, Clone)]
pub struct Translator {
    client: Client,
    url: String,
    langpair: String,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(rename = "responseData")]
    response_data: Option<TranslateData>,
    #[serde(rename = "responseStatus")]
    response_status: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TranslateData {
    #[serde(rename = "translatedText")]
    translated_text: Option<String>,
}

impl Translator {
    pub fn new(client: Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
            langpair: "en|ru".to_string(),
        }
    }

    /// Translate the first [`MAX_INPUT_CHARS`] characters of `text`.
    #[instrument(level = "debug", skip_all)]
    pub async fn translate(&self, text: &str) -> Result<String, AnnotateError> {
        let t0 = Instant::now();
        let input = truncate_chars(text, MAX_INPUT_CHARS);
        let response = self
            .client
            .get(&self.url)
            .query(&[("q", input.as_str()), ("langpair", self.langpair.as_str())])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AnnotateError::Status(response.status().as_u16()));
        }

        let body: TranslateResponse = response.json().await?;
        // MyMemory reports quota and input errors in-band, with a non-200 responseStatus.
        if let Some(status) = body.response_status.as_ref().and_then(status_code) {
            if status != 200 {
                return Err(AnnotateError::Status(status));
            }
        }
        let translated = body
            .response_data
            .and_then(|d| d.translated_text)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(AnnotateError::EmptyResponse)?;

        debug!(elapsed_ms = t0.elapsed().as_millis() as u64, "Translated summary");
        Ok(translated)
    }
}

fn status_code(value: &serde_json::Value) -> Option<u16> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Client for an OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct LlmAnnotator {
    client: Client,
    url: String,
    api_key: String,
    model: String,
}

impl std::fmt::Debug for LlmAnnotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmAnnotator")
            .field("url", &self.url)
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

impl LlmAnnotator {
    pub fn new(client: Client, url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    /// Ask the model for a short annotation of `item`.
    #[instrument(level = "debug", skip_all, fields(title = %truncate_for_log(&item.title, 60)))]
    pub async fn summarize(&self, item: &NormalizedItem) -> Result<String, AnnotateError> {
        let t0 = Instant::now();
        let source_text = if item.summary.is_empty() {
            item.title.as_str()
        } else {
            item.summary.as_str()
        };
        let user = truncate_chars(
            &format!("{}\n\n{}", item.title, source_text),
            MAX_INPUT_CHARS,
        );
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: ANNOTATION_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &user,
                },
            ],
            max_tokens: 300,
            temperature: 0.3,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AnnotateError::Status(response.status().as_u16()));
        }

        let body: ChatResponse = response.json().await?;
        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(AnnotateError::EmptyResponse)?;

        debug!(elapsed_ms = t0.elapsed().as_millis() as u64, "Annotated item");
        Ok(text)
    }
}
