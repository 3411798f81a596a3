//! The external summarization capability.
//!
//! The coordinator treats "turn this text into a summary" as an opaque
//! service behind the [`Summarizer`] trait. [`RemoteSummarizer`] calls an
//! OpenAI-compatible chat completions endpoint; [`FnSummarizer`] wraps a
//! closure for tests and offline use.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tracing::debug;

use crate::config::SummarizerConfig;
use crate::store::Credential;
use crate::{ChatClient, ChatRequest, Message};

/// Fixed instruction sent with every summarization request.
pub const SUMMARY_SYSTEM_PROMPT: &str = "\
You summarize web pages for a reader who has not seen them.

Rules:
- Open with one sentence stating what the page is about.
- Follow with the key points as short bullet points.
- Only include facts stated in the text. Do not infer or extrapolate.
- Ignore navigation, cookie banners, and other page chrome.
- Keep the whole summary under 200 words.";

/// Boxed future returned by [`Summarizer::summarize`].
pub type SummarizeFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String, SummarizeError>> + Send + 'a>>;

/// Why a summarization attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SummarizeError {
    /// The request never produced an HTTP response, or the body was unreadable.
    #[error("{0}")]
    Transport(String),
    /// The service answered with a non-success status.
    #[error("summarization service returned HTTP {status}")]
    Status { status: u16, message: Option<String> },
    /// The service answered successfully but with no text.
    #[error("summarization service returned an empty summary")]
    EmptyResponse,
}

impl SummarizeError {
    /// The message a user should see.
    ///
    /// Prefers what the upstream service said; falls back to a generic line.
    pub fn user_message(&self) -> String {
        match self {
            SummarizeError::Status {
                message: Some(m), ..
            } => m.clone(),
            SummarizeError::Status {
                status,
                message: None,
            } => format!("AI service returned an error (HTTP {status}). Please try again."),
            SummarizeError::Transport(m) if !m.trim().is_empty() => m.clone(),
            SummarizeError::Transport(_) => {
                "Failed to connect to AI service. Please try again.".to_string()
            }
            SummarizeError::EmptyResponse => {
                "AI service returned an empty summary. Please try again.".to_string()
            }
        }
    }
}

/// Anything that can turn page text into a summary given a credential.
///
/// Implementors must not log the credential.
pub trait Summarizer: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Summarize `content`. `content` has already been truncated by the caller.
    fn summarize(&self, content: &str, credential: &Credential) -> SummarizeFuture<'_>;
}

/// Truncate `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_input(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text.get(..byte_idx).unwrap_or(text),
        None => text,
    }
}

// ── RemoteSummarizer ──────────────────────────────────────────────

/// Summarizer backed by an OpenAI-compatible chat completions endpoint.
pub struct RemoteSummarizer {
    client: ChatClient,
    config: SummarizerConfig,
}

impl RemoteSummarizer {
    pub fn new(config: SummarizerConfig) -> Result<Self, String> {
        let client = ChatClient::new(config.endpoint.clone(), config.http_timeout)?;
        Ok(Self { client, config })
    }

    /// Build the request body for `content`.
    pub fn build_request(&self, content: &str) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                Message::system(SUMMARY_SYSTEM_PROMPT),
                Message::user(format!("Summarize this page:\n\n{content}")),
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }
}

impl Summarizer for RemoteSummarizer {
    fn name(&self) -> &str {
        "remote"
    }

    fn summarize(&self, content: &str, credential: &Credential) -> SummarizeFuture<'_> {
        let body = self.build_request(content);
        let api_key = credential.expose().to_string();
        Box::pin(async move {
            let completion = self.client.chat(&body, &api_key).await?;
            if let Some(reason) = completion.finish_reason.as_deref() {
                debug!("Summary finished: {reason}");
            }
            completion
                .content
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .ok_or(SummarizeError::EmptyResponse)
        })
    }
}

// ── FnSummarizer ──────────────────────────────────────────────────

/// A summarizer backed by a synchronous closure.
///
/// ```
/// use explainx::summarizer::{FnSummarizer, Summarizer};
///
/// let first_sentence = FnSummarizer::new("first-sentence", |text: &str| {
///     Ok(text.split('.').next().unwrap_or_default().to_string())
/// });
/// assert_eq!(first_sentence.name(), "first-sentence");
/// ```
pub struct FnSummarizer<F> {
    name: String,
    func: F,
}

impl<F> FnSummarizer<F>
where
    F: Fn(&str) -> Result<String, SummarizeError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> fmt::Debug for FnSummarizer<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSummarizer")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<F> Summarizer for FnSummarizer<F>
where
    F: Fn(&str) -> Result<String, SummarizeError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn summarize(&self, content: &str, _credential: &Credential) -> SummarizeFuture<'_> {
        let result = (self.func)(content);
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_input("hello", 10), "hello");
        assert_eq!(truncate_input("hello", 3), "hel");
        assert_eq!(truncate_input("héllo wörld", 7), "héllo w");
        assert_eq!(truncate_input("日本語テキスト", 3), "日本語");
        assert_eq!(truncate_input("", 3), "");
    }

    #[test]
    fn user_message_prefers_upstream_text() {
        let err = SummarizeError::Status {
            status: 401,
            message: Some("Invalid API key".into()),
        };
        assert_eq!(err.user_message(), "Invalid API key");

        let err = SummarizeError::Status {
            status: 502,
            message: None,
        };
        assert!(err.user_message().contains("502"));

        let err = SummarizeError::Transport(String::new());
        assert!(err.user_message().contains("Failed to connect"));
    }

    #[test]
    fn remote_request_carries_system_prompt_and_content() {
        let summarizer = RemoteSummarizer::new(SummarizerConfig::default()).unwrap();
        let body = summarizer.build_request("The page text.");
        assert_eq!(body.messages.len(), 2);
        assert_eq!(body.messages[0].content, SUMMARY_SYSTEM_PROMPT);
        assert!(body.messages[1].content.contains("The page text."));
        assert_eq!(body.model, SummarizerConfig::default().model);
    }

    #[tokio::test]
    async fn fn_summarizer_runs_closure() {
        let s = FnSummarizer::new("upper", |t: &str| Ok(t.to_uppercase()));
        let out = s.summarize("abc", &Credential::new("k")).await.unwrap();
        assert_eq!(out, "ABC");
    }
}
