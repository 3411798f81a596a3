//! Client-side summarization lifecycle.
//!
//! One [`Lifecycle`] per UI surface drives a single summarization attempt:
//!
//! ```text
//!   Idle ──trigger──▶ Extracting ──extracted──▶ AwaitingResult
//!                         │                        │      ▲
//!                 extraction_failed          resolve│      │retry / regenerate
//!                         ▼                        ▼      │
//!                    ShowingError ◀──────────── Showing / ShowingError
//!                                                  │
//!                                        discard / close ──▶ Idle
//! ```
//!
//! `save` is enabled from `Showing` (the AI summary) and from `ShowingError`
//! when extracted text exists (the raw text). It produces the [`NewSummary`]
//! to send; the state itself only changes once the caller closes the dialog.
//!
//! Each attempt carries an id. `trigger`, `retry`, `regenerate`, `discard`
//! and `close` advance the current id, so a result that arrives for an
//! attempt the user already moved past is dropped by [`Lifecycle::resolve`].
//!
//! [`DialogController`] wires a `Lifecycle` to a [`CoordinatorHandle`] and
//! applies a caller-side timeout to `generateSummary`.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::coordinator::CoordinatorHandle;
use crate::error::Failure;
use crate::protocol::{Reply, Request};
use crate::record::{NewSummary, PageCapture};

/// Message shown when the extracted page has no usable text.
pub const NO_TEXT_MESSAGE: &str = "No readable text found on this page.";

/// Where the dialog is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LifecycleState {
    #[default]
    Idle,
    Extracting,
    AwaitingResult,
    Showing(String),
    ShowingError(String),
}

impl LifecycleState {
    fn label(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Extracting => "extracting",
            LifecycleState::AwaitingResult => "awaiting a result",
            LifecycleState::Showing(_) => "showing a summary",
            LifecycleState::ShowingError(_) => "showing an error",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A transition that is not allowed from the current state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot {action} while {state}")]
    NotAllowed {
        action: &'static str,
        state: &'static str,
    },
    #[error("No readable text found on this page.")]
    EmptyCapture,
    #[error("nothing to save")]
    NothingToSave,
}

/// One summarization request to issue: the attempt id and the text to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub id: u64,
    pub content: String,
}

/// Explicit dialog state with guarded transitions. Holds no I/O.
#[derive(Debug, Default)]
pub struct Lifecycle {
    state: LifecycleState,
    capture: Option<PageCapture>,
    attempt: u64,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &LifecycleState {
        &self.state
    }

    /// The page text this dialog was opened for, if extraction succeeded.
    pub fn capture(&self) -> Option<&PageCapture> {
        self.capture.as_ref()
    }

    /// Id of the attempt whose result would currently be accepted.
    pub fn current_attempt(&self) -> u64 {
        self.attempt
    }

    /// Start a new extraction. Allowed from any state; tears down whatever
    /// the dialog was doing.
    pub fn trigger(&mut self) {
        if self.state != LifecycleState::Idle {
            debug!("Dialog re-triggered while {}; previous attempt dropped", self.state);
        }
        self.reset(LifecycleState::Extracting);
    }

    /// Extraction produced `capture`. Returns the attempt to send.
    ///
    /// A capture with no text moves to `ShowingError` with save disabled.
    pub fn extracted(&mut self, capture: PageCapture) -> Result<Attempt, TransitionError> {
        self.require("accept extracted text", |s| {
            matches!(s, LifecycleState::Extracting)
        })?;
        if !capture.has_content() {
            self.state = LifecycleState::ShowingError(NO_TEXT_MESSAGE.to_string());
            return Err(TransitionError::EmptyCapture);
        }
        let content = capture.content.clone();
        self.capture = Some(capture);
        self.state = LifecycleState::AwaitingResult;
        Ok(Attempt {
            id: self.attempt,
            content,
        })
    }

    /// Extraction failed outright. Nothing can be saved.
    pub fn extraction_failed(&mut self, reason: impl Into<String>) -> Result<(), TransitionError> {
        self.require("report an extraction failure", |s| {
            matches!(s, LifecycleState::Extracting)
        })?;
        self.capture = None;
        self.state = LifecycleState::ShowingError(reason.into());
        Ok(())
    }

    /// Apply the outcome of attempt `attempt_id`.
    ///
    /// Returns `false` and leaves the state untouched when the attempt is no
    /// longer current or the dialog is not waiting.
    pub fn resolve(&mut self, attempt_id: u64, outcome: Result<String, Failure>) -> bool {
        if attempt_id != self.attempt || self.state != LifecycleState::AwaitingResult {
            debug!(
                "Dropping result for attempt {attempt_id} (current {}, {})",
                self.attempt, self.state
            );
            return false;
        }
        self.state = match outcome {
            Ok(summary) => LifecycleState::Showing(summary),
            Err(failure) => LifecycleState::ShowingError(failure.to_string()),
        };
        true
    }

    /// Re-issue the identical request after a failure.
    pub fn retry(&mut self) -> Result<Attempt, TransitionError> {
        self.require("retry", |s| matches!(s, LifecycleState::ShowingError(_)))?;
        self.next_attempt()
    }

    /// Ask for a fresh summary of the same text.
    pub fn regenerate(&mut self) -> Result<Attempt, TransitionError> {
        self.require("regenerate", |s| matches!(s, LifecycleState::Showing(_)))?;
        self.next_attempt()
    }

    /// Drop the displayed result without saving.
    pub fn discard(&mut self) -> Result<(), TransitionError> {
        self.require("discard", |s| {
            matches!(
                s,
                LifecycleState::Showing(_) | LifecycleState::ShowingError(_)
            )
        })?;
        self.reset(LifecycleState::Idle);
        Ok(())
    }

    /// Close the dialog from any state.
    pub fn close(&mut self) {
        self.reset(LifecycleState::Idle);
    }

    pub fn is_save_enabled(&self) -> bool {
        match &self.state {
            LifecycleState::Showing(_) => true,
            LifecycleState::ShowingError(_) => self.capture.as_ref().is_some_and(|c| c.has_content()),
            _ => false,
        }
    }

    /// The record to save: the AI summary if one is showing, otherwise the
    /// extracted text.
    pub fn save(&self) -> Result<NewSummary, TransitionError> {
        let capture = match (&self.state, &self.capture) {
            (LifecycleState::Showing(_) | LifecycleState::ShowingError(_), Some(c)) => c,
            (LifecycleState::Showing(_) | LifecycleState::ShowingError(_), None) => {
                return Err(TransitionError::NothingToSave);
            }
            (state, _) => {
                return Err(TransitionError::NotAllowed {
                    action: "save",
                    state: state.label(),
                });
            }
        };
        match &self.state {
            LifecycleState::Showing(summary) => Ok(capture.to_new_summary(summary.clone(), true)),
            _ if capture.has_content() => Ok(capture.to_new_summary(capture.content.clone(), false)),
            _ => Err(TransitionError::NothingToSave),
        }
    }

    fn next_attempt(&mut self) -> Result<Attempt, TransitionError> {
        let content = self
            .capture
            .as_ref()
            .filter(|c| c.has_content())
            .map(|c| c.content.clone())
            .ok_or(TransitionError::NothingToSave)?;
        self.attempt += 1;
        self.state = LifecycleState::AwaitingResult;
        Ok(Attempt {
            id: self.attempt,
            content,
        })
    }

    fn reset(&mut self, state: LifecycleState) {
        self.attempt += 1;
        self.capture = None;
        self.state = state;
    }

    fn require(
        &self,
        action: &'static str,
        allowed: impl Fn(&LifecycleState) -> bool,
    ) -> Result<(), TransitionError> {
        if allowed(&self.state) {
            Ok(())
        } else {
            Err(TransitionError::NotAllowed {
                action,
                state: self.state.label(),
            })
        }
    }
}

// ── Page source ───────────────────────────────────────────────────────

/// Extracts the visible text of the current page.
pub trait PageSource: Send + Sync {
    fn extract(&self) -> Result<PageCapture, String>;
}

impl PageSource for PageCapture {
    fn extract(&self) -> Result<PageCapture, String> {
        Ok(self.clone())
    }
}

// ── DialogController ──────────────────────────────────────────────────

/// Error from a dialog action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DialogError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Failure(#[from] Failure),
}

/// Drives one [`Lifecycle`] against a running coordinator.
///
/// Cheap to clone; clones share the same dialog.
#[derive(Clone)]
pub struct DialogController {
    lifecycle: Arc<Mutex<Lifecycle>>,
    handle: CoordinatorHandle,
    timeout: Duration,
}

impl DialogController {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn new(handle: CoordinatorHandle) -> Self {
        Self {
            lifecycle: Arc::new(Mutex::new(Lifecycle::new())),
            handle,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// How long to wait for `generateSummary` before showing an error.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.lock().state.clone()
    }

    pub fn is_save_enabled(&self) -> bool {
        self.lock().is_save_enabled()
    }

    /// Trigger, extract from `source`, and wait for the first summary.
    pub async fn open(&self, source: &dyn PageSource) -> LifecycleState {
        self.lock().trigger();
        let extracted = source.extract();
        let attempt = {
            let mut lifecycle = self.lock();
            let attempt = match extracted {
                Ok(capture) => lifecycle.extracted(capture).ok(),
                Err(reason) => {
                    if let Err(e) = lifecycle.extraction_failed(reason) {
                        debug!("Extraction failure ignored: {e}");
                    }
                    None
                }
            };
            match attempt {
                Some(attempt) => attempt,
                None => return lifecycle.state.clone(),
            }
        };
        self.run(attempt).await
    }

    pub async fn retry(&self) -> Result<LifecycleState, DialogError> {
        let attempt = self.lock().retry()?;
        Ok(self.run(attempt).await)
    }

    pub async fn regenerate(&self) -> Result<LifecycleState, DialogError> {
        let attempt = self.lock().regenerate()?;
        Ok(self.run(attempt).await)
    }

    /// Persist what is displayed, then close the dialog.
    ///
    /// On failure the dialog stays open so the user can try again. If the
    /// dialog was re-opened while the save was in flight, the newer dialog
    /// is left alone.
    pub async fn save(&self) -> Result<NewSummary, DialogError> {
        let (draft, attempt) = {
            let lifecycle = self.lock();
            (lifecycle.save()?, lifecycle.current_attempt())
        };
        self.handle.save_summary(draft.clone()).await?;
        info!(
            "Saved '{}' ({})",
            draft.title,
            if draft.is_ai_generated { "summary" } else { "raw text" }
        );
        let mut lifecycle = self.lock();
        if lifecycle.current_attempt() == attempt {
            lifecycle.close();
        } else {
            debug!("Dialog moved on during save; leaving it open");
        }
        Ok(draft)
    }

    pub fn discard(&self) -> Result<(), DialogError> {
        self.lock().discard()?;
        Ok(())
    }

    pub fn close(&self) {
        self.lock().close();
    }

    async fn run(&self, attempt: Attempt) -> LifecycleState {
        debug!(
            "Attempt {} sending {} chars",
            attempt.id,
            attempt.content.chars().count()
        );
        let request = Request::GenerateSummary {
            content: attempt.content,
        };
        let outcome = match self
            .handle
            .request_with_timeout(request, self.timeout)
            .await
            .into_result()
        {
            Ok(Reply::Summary(summary)) => Ok(summary),
            Ok(other) => Err(Failure::Unavailable {
                message: format!("unexpected reply: {other:?}"),
            }),
            Err(failure) => Err(failure),
        };
        let mut lifecycle = self.lock();
        lifecycle.resolve(attempt.id, outcome);
        lifecycle.state.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
