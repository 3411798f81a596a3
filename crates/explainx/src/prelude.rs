//! Convenience re-exports for common `explainx` types.
//!
//! ```ignore
//! use explainx::prelude::*;
//! ```
//!
//! Covers spawning a coordinator, talking to it, and driving a dialog or
//! history view. Storage internals and the raw chat client stay in their
//! modules.

// ── Coordinator ─────────────────────────────────────────────────────
pub use crate::coordinator::{Coordinator, CoordinatorHandle, StoreEvent};
pub use crate::protocol::{Reply, Request, Response};

// ── Records and storage ─────────────────────────────────────────────
pub use crate::record::{NewSummary, PageCapture, SummaryRecord};
pub use crate::store::{Credential, JsonFileBackend, MAX_SUMMARIES, MemoryBackend};

// ── Summarization ───────────────────────────────────────────────────
pub use crate::summarizer::{FnSummarizer, RemoteSummarizer, SummarizeError, Summarizer};

// ── UI contexts ─────────────────────────────────────────────────────
pub use crate::history::{HistoryView, format_relative, matches_search};
pub use crate::lifecycle::{DialogController, Lifecycle, LifecycleState, PageSource};

// ── Configuration and errors ────────────────────────────────────────
pub use crate::config::{AppConfig, CoordinatorConfig, SummarizerConfig};
pub use crate::error::Failure;
