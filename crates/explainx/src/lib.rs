//! Page summarization coordinator.
//!
//! `explainx` is the privileged half of a page summarizer: a long-lived
//! [`Coordinator`](coordinator::Coordinator) that owns the persisted summary
//! history and the summarization credential, answers typed requests from
//! untrusted UI contexts, and performs the remote summarization call. The
//! page-side dialog is modelled by the [`Lifecycle`](lifecycle::Lifecycle)
//! state machine; the history viewer by [`HistoryView`](history::HistoryView).
//!
//! # Getting started
//!
//! ```ignore
//! use explainx::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), String> {
//!     let backend = Arc::new(JsonFileBackend::new(".explainx").map_err(|e| e.to_string())?);
//!     let config = CoordinatorConfig::default();
//!     let summarizer = Arc::new(RemoteSummarizer::new(config.summarizer.clone())?);
//!
//!     let handle = Coordinator::new(backend, summarizer, config)
//!         .map_err(|e| e.to_string())?
//!         .spawn()
//!         .map_err(|e| e.to_string())?;
//!
//!     handle.save_api_key("sk-...").await.map_err(|e| e.to_string())?;
//!     let summary = handle
//!         .generate_summary("Long page text...")
//!         .await
//!         .map_err(|e| e.to_string())?;
//!     println!("{summary}");
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//!  page dialog (Lifecycle) ──┐                       ┌── SummaryStore (≤ 50, newest first)
//!                            ├─ Envelope ─▶ queue ─▶ Coordinator task
//!  history viewer ───────────┘   (oneshot reply)     ├── SecretStore (credential)
//!                                                    └── Summarizer (remote call, spawned)
//! ```
//!
//! Every store mutation runs on the coordinator task, one at a time; that
//! queue is the only point where mutations are ordered. UI contexts never
//! touch the stores directly.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`record`] | [`SummaryRecord`](record::SummaryRecord), [`PageCapture`](record::PageCapture), id generation |
//! | [`store`] | Storage backends, the bounded [`SummaryStore`](store::SummaryStore), the [`SecretStore`](store::SecretStore) |
//! | [`protocol`] | Request / reply / failure contract and correlation ids |
//! | [`coordinator`] | The coordinator task and its cloneable handle |
//! | [`summarizer`] | [`Summarizer`](summarizer::Summarizer) trait, remote and closure implementations |
//! | [`lifecycle`] | Client-side dialog state machine and its async driver |
//! | [`history`] | History-viewer helpers: search, relative dates, selection |
//! | [`config`] | Coordinator, summarizer and application configuration |
//! | [`logging`] | `tracing` subscriber setup |

pub mod config;
pub mod coordinator;
pub mod error;
pub mod history;
pub mod lifecycle;
pub mod logging;
pub mod prelude;
pub mod protocol;
pub mod record;
pub mod store;
pub mod summarizer;

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::summarizer::SummarizeError;

// ── Constants ──────────────────────────────────────────────────────

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model for summarization calls.
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// Maximum characters of page text sent to the summarizer.
pub const MAX_INPUT_CHARS: usize = 12_000;

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body (OpenAI-compatible subset).
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "is_zero_f32")]
    pub temperature: f32,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}
fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

/// A message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

// ── Response types ─────────────────────────────────────────────────

/// Raw API response (internal deserialization target).
#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Error envelope some providers return with non-success statuses.
#[derive(Deserialize, Debug)]
struct ErrorBody {
    error: Option<ApiErrorResponse>,
}

/// Clean return type from [`ChatClient::chat`].
#[derive(Debug)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// Pull `error.message` out of an error body, if the provider sent one.
pub fn upstream_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .map(|e| e.message)
        .filter(|m| !m.trim().is_empty())
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for an OpenAI-compatible chat completions endpoint.
///
/// The client holds no credential; the caller passes one per request so the
/// coordinator can read it fresh each time.
pub struct ChatClient {
    client: reqwest::Client,
    endpoint: String,
    referer: String,
    title: String,
}

impl ChatClient {
    /// Create a client for `endpoint` with the given HTTP timeout.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent("explainx/0.1")
            .timeout(timeout)
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            referer: "https://github.com/explainx/explainx-rs".to_string(),
            title: "explainx".to_string(),
        })
    }

    /// Send a chat completion request authorized with `api_key`.
    pub async fn chat(
        &self,
        body: &ChatRequest,
        api_key: &str,
    ) -> Result<ChatCompletion, SummarizeError> {
        debug!(
            "LLM request: model={}, messages={}, max_tokens={}, temp={}",
            body.model,
            body.messages.len(),
            body.max_tokens,
            body.temperature,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(body)
            .send()
            .await
            .map_err(|e| SummarizeError::Transport(format!("request failed: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| SummarizeError::Transport(format!("failed to read response: {e}")))?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(SummarizeError::Status {
                status: status.as_u16(),
                message: upstream_error_message(&text),
            });
        }

        let parsed: RawChatResponse = serde_json::from_str(&text)
            .map_err(|e| SummarizeError::Transport(format!("failed to parse response: {e}")))?;

        if let Some(err) = parsed.error {
            return Err(SummarizeError::Status {
                status: status.as_u16(),
                message: Some(err.message),
            });
        }

        if let Some(ref usage) = parsed.usage {
            debug!(
                "Token usage: prompt={}, completion={}, total={}",
                usage.prompt_tokens.unwrap_or(0),
                usage.completion_tokens.unwrap_or(0),
                usage.total_tokens.unwrap_or(0),
            );
        }

        let choice = parsed.choices.and_then(|c| c.into_iter().next());
        Ok(match choice {
            Some(c) => ChatCompletion {
                content: c.message.content,
                usage: parsed.usage,
                finish_reason: c.finish_reason,
            },
            None => ChatCompletion {
                content: None,
                usage: parsed.usage,
                finish_reason: None,
            },
        })
    }
}
