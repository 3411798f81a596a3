//! Error types shared by the store layer and the request/response protocol.
//!
//! Two levels exist on purpose:
//!
//! - [`StorageError`] is what a [`StorageBackend`](crate::store::StorageBackend)
//!   produces. It never crosses the protocol boundary.
//! - [`Failure`] is the typed failure carried inside a
//!   [`Response`](crate::protocol::Response). The coordinator converts every
//!   storage or summarizer error into one of these before replying.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by a persistence backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed for '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("stored value for '{key}' is unreadable: {reason}")]
    Corrupt { key: String, reason: String },
    #[error("storage backend rejected the write for '{key}'")]
    WriteRejected { key: String },
}

/// Typed failure returned to callers of the coordinator.
///
/// `Display` produces the text the UI shows the user. For
/// [`Failure::ExternalCall`] that is the upstream message verbatim so the
/// dialog can surface what the provider said.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "camelCase")]
pub enum Failure {
    /// No credential is stored, or the stored one is blank.
    #[error("API key not configured. Open the explainx settings and add your API key.")]
    CredentialMissing,
    /// The summarization call failed in transport or returned a non-success status.
    #[error("{message}")]
    ExternalCall { message: String },
    /// A store read or write failed.
    #[error("Could not persist changes: {message}")]
    Persistence { message: String },
    /// The coordinator is gone or dropped the reply.
    #[error("Coordinator unavailable: {message}")]
    Unavailable { message: String },
    /// The caller gave up waiting. Raised on the caller side only.
    #[error("No response after {seconds}s. Please try again.")]
    TimedOut { seconds: u64 },
}

impl From<StorageError> for Failure {
    fn from(err: StorageError) -> Self {
        Failure::Persistence {
            message: err.to_string(),
        }
    }
}
