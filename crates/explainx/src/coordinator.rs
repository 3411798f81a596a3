//! The coordinator: sole owner of persisted state and the credential.
//!
//! [`Coordinator::spawn`] moves the coordinator onto a Tokio task that drains
//! a bounded queue of [`Envelope`]s. Callers hold a cheap, cloneable
//! [`CoordinatorHandle`]; each call enqueues one request and awaits its
//! single reply.
//!
//! Ordering rules:
//!
//! - Store operations (`getSummaries`, `saveSummary`, `deleteSummary`,
//!   `clearAll`, `saveApiKey`, `getApiKey`) run inline on the coordinator
//!   task, one at a time, in queue order. Two concurrent saves can never both
//!   observe the pre-insert history.
//! - `generateSummary` reads the credential inline, then runs the remote call
//!   on its own task, so a slow summary never holds up store mutations.
//!
//! Every request gets exactly one [`Response`]. Storage and summarizer errors
//! are converted to a typed [`Failure`] before replying.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::CoordinatorConfig;
use crate::error::{Failure, StorageError};
use crate::protocol::{Envelope, Reply, Request, Response};
use crate::record::{NewSummary, SummaryRecord};
use crate::store::{Credential, SecretStore, StorageBackend, SummaryStore};
use crate::summarizer::{Summarizer, truncate_input};

/// Notification sent to observers after a store mutation succeeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreEvent {
    /// The summary history changed (save, delete, or clear).
    SummariesChanged,
}

/// Owns the summary history, the credential, and the summarizer.
pub struct Coordinator {
    summaries: SummaryStore,
    secrets: SecretStore,
    summarizer: Arc<dyn Summarizer>,
    config: CoordinatorConfig,
    events: broadcast::Sender<StoreEvent>,
}

impl Coordinator {
    /// Load both stores from `backend`.
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        summarizer: Arc<dyn Summarizer>,
        config: CoordinatorConfig,
    ) -> Result<Self, StorageError> {
        let summaries = SummaryStore::load(backend.clone())?;
        let secrets = SecretStore::new(backend);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Ok(Self {
            summaries,
            secrets,
            summarizer,
            config,
            events,
        })
    }

    /// Initialize both stores to their empty state if they were never written.
    ///
    /// Idempotent; run on every start.
    pub fn activate(&mut self) -> Result<(), StorageError> {
        self.summaries.initialize()?;
        self.secrets.initialize()?;
        info!(
            "Coordinator activated: {} saved summar{}, summarizer '{}'",
            self.summaries.len(),
            if self.summaries.len() == 1 { "y" } else { "ies" },
            self.summarizer.name()
        );
        Ok(())
    }

    /// Activate, then move the coordinator onto a Tokio task.
    ///
    /// Must be called from within a Tokio runtime. The task stops once every
    /// handle has been dropped.
    pub fn spawn(mut self) -> Result<CoordinatorHandle, StorageError> {
        self.activate()?;
        let (tx, rx) = mpsc::channel(self.config.queue_capacity.max(1));
        let handle = CoordinatorHandle {
            tx,
            events: self.events.clone(),
        };
        tokio::spawn(self.run(rx));
        Ok(handle)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Envelope>) {
        while let Some(envelope) = rx.recv().await {
            self.dispatch(envelope);
        }
        debug!("Coordinator stopped: all handles dropped");
    }

    /// Route one request. Store operations complete before this returns;
    /// summaries complete on a spawned task.
    fn dispatch(&mut self, envelope: Envelope) {
        let span = info_span!("request", id = %envelope.id, kind = envelope.request.kind());
        let _guard = span.enter();

        if let Request::GenerateSummary { content } = &envelope.request {
            match self.prepare_summary(content) {
                Ok((input, credential)) => {
                    let summarizer = self.summarizer.clone();
                    drop(_guard);
                    tokio::spawn(
                        run_summary(summarizer, input, credential, envelope).instrument(span),
                    );
                }
                Err(failure) => {
                    debug!("Summary refused: {failure}");
                    envelope.respond(Response::Failure(failure));
                }
            }
            return;
        }

        let mutates = envelope.request.mutates_summaries();
        let result = self.handle_store_request(&envelope.request);
        if let Err(ref failure) = result {
            warn!("Request failed: {failure}");
        } else if mutates {
            // No subscribers is fine.
            let _ = self.events.send(StoreEvent::SummariesChanged);
        }
        if !envelope.respond(result.into()) {
            debug!("Caller stopped waiting; reply discarded");
        }
    }

    fn handle_store_request(&mut self, request: &Request) -> Result<Reply, Failure> {
        match request {
            Request::GetSummaries => Ok(Reply::Summaries(self.summaries.list())),
            Request::SaveSummary { summary } => {
                let record = self.summaries.insert(summary.clone())?;
                info!(
                    "Saved summary {} ({}, {} chars)",
                    record.id,
                    if record.is_ai_generated { "ai" } else { "raw" },
                    record.content.chars().count()
                );
                Ok(Reply::Ack)
            }
            Request::DeleteSummary { id } => {
                if !self.summaries.delete(id)? {
                    debug!("Delete of unknown summary {id} ignored");
                }
                Ok(Reply::Ack)
            }
            Request::ClearAll => {
                self.summaries.clear()?;
                info!("Cleared summary history");
                Ok(Reply::Ack)
            }
            Request::SaveApiKey { api_key } => {
                self.secrets.set(Credential::new(api_key.clone()))?;
                info!("API key updated");
                Ok(Reply::Ack)
            }
            Request::GetApiKey => {
                let key = self.secrets.get()?.map(|c| c.expose().to_string());
                Ok(Reply::ApiKey(key))
            }
            Request::GenerateSummary { .. } => Err(Failure::Unavailable {
                message: "generateSummary is not a store request".to_string(),
            }),
        }
    }

    /// Read the credential fresh and bound the input. Fails without touching
    /// the summarizer when no usable credential is stored.
    fn prepare_summary(&self, content: &str) -> Result<(String, Credential), Failure> {
        let credential = self
            .secrets
            .get()?
            .filter(Credential::is_usable)
            .ok_or(Failure::CredentialMissing)?;
        let input = truncate_input(content, self.config.summarizer.max_input_chars);
        if input.len() < content.len() {
            debug!(
                "Input truncated to {} chars",
                self.config.summarizer.max_input_chars
            );
        }
        Ok((input.to_string(), credential))
    }
}

async fn run_summary(
    summarizer: Arc<dyn Summarizer>,
    input: String,
    credential: Credential,
    envelope: Envelope,
) {
    let response = match summarizer.summarize(&input, &credential).await {
        Ok(summary) => {
            debug!("Summary ready ({} chars)", summary.chars().count());
            Response::Success(Reply::Summary(summary))
        }
        Err(e) => {
            warn!("Summarizer '{}' failed: {e}", summarizer.name());
            Response::Failure(Failure::ExternalCall {
                message: e.user_message(),
            })
        }
    };
    if !envelope.respond(response) {
        debug!("Caller stopped waiting; summary discarded");
    }
}

// ── Handle ──────────────────────────────────────────────────────────

/// Cloneable client for a running [`Coordinator`].
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Envelope>,
    events: broadcast::Sender<StoreEvent>,
}

impl CoordinatorHandle {
    /// Send a request and await its reply.
    pub async fn request(&self, request: Request) -> Response {
        let (envelope, rx) = Envelope::new(request);
        if self.tx.send(envelope).await.is_err() {
            return Response::Failure(Failure::Unavailable {
                message: "request queue closed".to_string(),
            });
        }
        rx.await.unwrap_or_else(|_| {
            Response::Failure(Failure::Unavailable {
                message: "reply dropped".to_string(),
            })
        })
    }

    /// Like [`request`](Self::request), but give up after `timeout`.
    ///
    /// The coordinator still completes the request; its reply is discarded.
    pub async fn request_with_timeout(&self, request: Request, timeout: Duration) -> Response {
        match tokio::time::timeout(timeout, self.request(request)).await {
            Ok(response) => response,
            Err(_) => Response::Failure(Failure::TimedOut {
                seconds: whole_seconds(timeout),
            }),
        }
    }

    /// Observe store mutations.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub async fn get_summaries(&self) -> Result<Vec<SummaryRecord>, Failure> {
        match self.request(Request::GetSummaries).await.into_result()? {
            Reply::Summaries(records) => Ok(records),
            other => Err(unexpected(other)),
        }
    }

    pub async fn save_summary(&self, summary: NewSummary) -> Result<(), Failure> {
        self.expect_ack(Request::SaveSummary { summary }).await
    }

    pub async fn delete_summary(&self, id: impl Into<String>) -> Result<(), Failure> {
        self.expect_ack(Request::DeleteSummary { id: id.into() })
            .await
    }

    pub async fn clear_all(&self) -> Result<(), Failure> {
        self.expect_ack(Request::ClearAll).await
    }

    pub async fn generate_summary(&self, content: impl Into<String>) -> Result<String, Failure> {
        let request = Request::GenerateSummary {
            content: content.into(),
        };
        match self.request(request).await.into_result()? {
            Reply::Summary(summary) => Ok(summary),
            other => Err(unexpected(other)),
        }
    }

    pub async fn save_api_key(&self, api_key: impl Into<String>) -> Result<(), Failure> {
        self.expect_ack(Request::SaveApiKey {
            api_key: api_key.into(),
        })
        .await
    }

    pub async fn get_api_key(&self) -> Result<Option<String>, Failure> {
        match self.request(Request::GetApiKey).await.into_result()? {
            Reply::ApiKey(key) => Ok(key),
            other => Err(unexpected(other)),
        }
    }

    async fn expect_ack(&self, request: Request) -> Result<(), Failure> {
        match self.request(request).await.into_result()? {
            Reply::Ack => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}

/// `timeout` in seconds, rounded up so sub-second waits never read as 0s.
fn whole_seconds(timeout: Duration) -> u64 {
    timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0)
}

fn unexpected(reply: Reply) -> Failure {
    Failure::Unavailable {
        message: format!("unexpected reply: {reply:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryBackend, SUMMARIES_KEY};
    use crate::summarizer::{FnSummarizer, SummarizeError, SummarizeFuture};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn draft(title: &str) -> NewSummary {
        NewSummary {
            title: title.into(),
            url: format!("https://example.com/{title}"),
            content: format!("content of {title}"),
            is_ai_generated: false,
            captured_at: Utc::now(),
        }
    }

    fn counting_summarizer(
        calls: Arc<AtomicUsize>,
        outcome: Result<String, SummarizeError>,
    ) -> Arc<dyn Summarizer> {
        Arc::new(FnSummarizer::new("counting", move |_text: &str| {
            calls.fetch_add(1, Ordering::SeqCst);
            outcome.clone()
        }))
    }

    fn spawn_with(
        backend: Arc<MemoryBackend>,
        summarizer: Arc<dyn Summarizer>,
    ) -> CoordinatorHandle {
        Coordinator::new(backend, summarizer, CoordinatorConfig::default())
            .unwrap()
            .spawn()
            .unwrap()
    }

    fn spawn_fresh() -> (Arc<MemoryBackend>, CoordinatorHandle) {
        let backend = Arc::new(MemoryBackend::new());
        let summarizer = counting_summarizer(Arc::new(AtomicUsize::new(0)), Ok("s".into()));
        let handle = spawn_with(backend.clone(), summarizer);
        (backend, handle)
    }

    #[tokio::test]
    async fn activation_initializes_empty_stores() {
        let (backend, handle) = spawn_fresh();
        assert!(handle.get_summaries().await.unwrap().is_empty());
        assert_eq!(handle.get_api_key().await.unwrap(), None);
        assert_eq!(
            backend.get_raw(SUMMARIES_KEY),
            Some(serde_json::json!([]))
        );
    }

    #[tokio::test]
    async fn save_then_list_newest_first() {
        let (_backend, handle) = spawn_fresh();
        handle.save_summary(draft("first")).await.unwrap();
        handle.save_summary(draft("second")).await.unwrap();

        let list = handle.get_summaries().await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].title, "second");
        assert_eq!(list[1].title, "first");
        assert_ne!(list[0].id, list[1].id);
    }

    #[tokio::test]
    async fn delete_unknown_id_acks() {
        let (_backend, handle) = spawn_fresh();
        handle.save_summary(draft("a")).await.unwrap();
        let before = handle.get_summaries().await.unwrap();

        handle.delete_summary("missing").await.unwrap();
        assert_eq!(handle.get_summaries().await.unwrap(), before);
    }

    #[tokio::test]
    async fn clear_all_then_get_is_empty() {
        let (_backend, handle) = spawn_fresh();
        for i in 0..7 {
            handle.save_summary(draft(&format!("r{i}"))).await.unwrap();
        }
        handle.clear_all().await.unwrap();
        assert!(handle.get_summaries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_credential_makes_zero_external_calls() {
        let calls = Arc::new(AtomicUsize::new(0));
        let backend = Arc::new(MemoryBackend::new());
        let handle = spawn_with(
            backend,
            counting_summarizer(calls.clone(), Ok("never".into())),
        );

        let err = handle.generate_summary("text").await.unwrap_err();
        assert_eq!(err, Failure::CredentialMissing);

        handle.save_api_key("   ").await.unwrap();
        let err = handle.generate_summary("text").await.unwrap_err();
        assert_eq!(err, Failure::CredentialMissing);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn generate_wraps_exact_summary_text() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = spawn_with(
            Arc::new(MemoryBackend::new()),
            counting_summarizer(calls.clone(), Ok("Page is about X.".into())),
        );
        handle.save_api_key("sk-test").await.unwrap();

        let response = handle
            .request(Request::GenerateSummary {
                content: "long text".into(),
            })
            .await;
        assert_eq!(
            response,
            Response::Success(Reply::Summary("Page is about X.".into()))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn external_failure_carries_upstream_message() {
        let handle = spawn_with(
            Arc::new(MemoryBackend::new()),
            counting_summarizer(
                Arc::new(AtomicUsize::new(0)),
                Err(SummarizeError::Status {
                    status: 429,
                    message: Some("Rate limit exceeded".into()),
                }),
            ),
        );
        handle.save_api_key("sk-test").await.unwrap();

        let err = handle.generate_summary("text").await.unwrap_err();
        assert_eq!(
            err,
            Failure::ExternalCall {
                message: "Rate limit exceeded".into()
            }
        );
    }

    #[tokio::test]
    async fn external_failure_without_message_is_generic() {
        let handle = spawn_with(
            Arc::new(MemoryBackend::new()),
            counting_summarizer(
                Arc::new(AtomicUsize::new(0)),
                Err(SummarizeError::Status {
                    status: 500,
                    message: None,
                }),
            ),
        );
        handle.save_api_key("sk-test").await.unwrap();

        match handle.generate_summary("text").await.unwrap_err() {
            Failure::ExternalCall { message } => assert!(message.contains("HTTP 500")),
            other => panic!("expected ExternalCall, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn input_is_truncated_before_the_call() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in = seen.clone();
        let summarizer: Arc<dyn Summarizer> =
            Arc::new(FnSummarizer::new("len", move |text: &str| {
                seen_in.store(text.chars().count(), Ordering::SeqCst);
                Ok("ok".into())
            }));
        let config = CoordinatorConfig::default().with_summarizer(
            crate::config::SummarizerConfig::default().with_max_input_chars(10),
        );
        let handle = Coordinator::new(Arc::new(MemoryBackend::new()), summarizer, config)
            .unwrap()
            .spawn()
            .unwrap();
        handle.save_api_key("sk").await.unwrap();

        handle.generate_summary("x".repeat(500)).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn persistence_failure_is_typed_and_store_unchanged() {
        let (backend, handle) = spawn_fresh();
        handle.save_summary(draft("kept")).await.unwrap();
        backend.set_fail_writes(true);

        let err = handle.save_summary(draft("lost")).await.unwrap_err();
        assert!(matches!(err, Failure::Persistence { .. }));
        let err = handle.clear_all().await.unwrap_err();
        assert!(matches!(err, Failure::Persistence { .. }));
        let err = handle.save_api_key("k").await.unwrap_err();
        assert!(matches!(err, Failure::Persistence { .. }));

        let list = handle.get_summaries().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].title, "kept");
    }

    #[tokio::test]
    async fn concurrent_saves_from_different_callers_are_both_kept() {
        let (_backend, handle) = spawn_fresh();
        for i in 0..49 {
            handle.save_summary(draft(&format!("old{i}"))).await.unwrap();
        }

        let caller_a = handle.clone();
        let caller_b = handle.clone();
        let (a, b) = tokio::join!(
            caller_a.save_summary(draft("from-a")),
            caller_b.save_summary(draft("from-b")),
        );
        a.unwrap();
        b.unwrap();

        let list = handle.get_summaries().await.unwrap();
        assert_eq!(list.len(), 50);
        assert!(list.iter().any(|r| r.title == "from-a"));
        assert!(list.iter().any(|r| r.title == "from-b"));
        // Exactly the oldest record was evicted.
        assert!(list.iter().all(|r| r.title != "old0"));
    }

    #[tokio::test]
    async fn mutations_are_broadcast() {
        let (_backend, handle) = spawn_fresh();
        let mut events = handle.subscribe();

        handle.save_summary(draft("a")).await.unwrap();
        assert_eq!(events.recv().await.unwrap(), StoreEvent::SummariesChanged);

        // Reads do not notify.
        handle.get_summaries().await.unwrap();
        handle.clear_all().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), StoreEvent::SummariesChanged);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn restart_reloads_persisted_state() {
        let backend = Arc::new(MemoryBackend::new());
        {
            let handle = spawn_with(
                backend.clone(),
                counting_summarizer(Arc::new(AtomicUsize::new(0)), Ok("s".into())),
            );
            handle.save_api_key("sk-persist").await.unwrap();
            handle.save_summary(draft("survivor")).await.unwrap();
        }

        let handle = spawn_with(
            backend,
            counting_summarizer(Arc::new(AtomicUsize::new(0)), Ok("s".into())),
        );
        assert_eq!(
            handle.get_api_key().await.unwrap().as_deref(),
            Some("sk-persist")
        );
        assert_eq!(handle.get_summaries().await.unwrap()[0].title, "survivor");
    }

    struct SlowSummarizer;

    impl Summarizer for SlowSummarizer {
        fn name(&self) -> &str {
            "slow"
        }

        fn summarize(&self, _content: &str, _credential: &Credential) -> SummarizeFuture<'_> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok("late".to_string())
            })
        }
    }

    #[tokio::test]
    async fn slow_summary_does_not_block_store_ops() {
        let handle = spawn_with(Arc::new(MemoryBackend::new()), Arc::new(SlowSummarizer));
        handle.save_api_key("sk").await.unwrap();

        let response = handle
            .request_with_timeout(
                Request::GenerateSummary {
                    content: "text".into(),
                },
                Duration::from_millis(50),
            )
            .await;
        assert_eq!(response, Response::Failure(Failure::TimedOut { seconds: 1 }));
        assert_eq!(
            response.into_result().unwrap_err().to_string(),
            "No response after 1s. Please try again."
        );

        // The summary is still in flight; store requests are answered anyway.
        tokio::time::timeout(Duration::from_secs(5), handle.save_summary(draft("meanwhile")))
            .await
            .expect("store op blocked behind summary")
            .unwrap();
        assert_eq!(handle.get_summaries().await.unwrap().len(), 1);
    }

    #[test]
    fn timeout_seconds_round_up() {
        assert_eq!(whole_seconds(Duration::from_millis(50)), 1);
        assert_eq!(whole_seconds(Duration::from_secs(60)), 60);
        assert_eq!(whole_seconds(Duration::from_millis(60_001)), 61);
    }

    #[tokio::test]
    async fn dropped_caller_does_not_stall_the_queue() {
        let (_backend, handle) = spawn_fresh();
        handle.save_api_key("sk").await.unwrap();

        let response = handle
            .request_with_timeout(
                Request::GenerateSummary {
                    content: "text".into(),
                },
                Duration::from_nanos(1),
            )
            .await;
        // Either the reply won the race or the caller timed out; both are fine.
        assert!(matches!(
            response,
            Response::Success(_) | Response::Failure(Failure::TimedOut { .. })
        ));

        handle.save_summary(draft("after")).await.unwrap();
        assert_eq!(handle.get_summaries().await.unwrap().len(), 1);
    }
}
