//! Persistent state owned by the coordinator.
//!
//! Two logical keys live in a [`StorageBackend`]:
//!
//! | key | value | owner |
//! |-----|-------|-------|
//! | [`SUMMARIES_KEY`] | ordered array of [`SummaryRecord`](crate::record::SummaryRecord), newest first | [`SummaryStore`] |
//! | [`API_KEY_KEY`] | optional credential string | [`SecretStore`] |
//!
//! Backends are deliberately dumb key/value stores. Ordering, trimming and
//! credential semantics live in the typed stores on top. Nothing outside the
//! coordinator holds a reference to either store.

mod backend;
mod secret;
mod summaries;

pub use backend::{JsonFileBackend, MemoryBackend};
pub use secret::{Credential, SecretStore};
pub use summaries::{MAX_SUMMARIES, SummaryStore};

use crate::error::StorageError;

/// Key holding the summary history.
pub const SUMMARIES_KEY: &str = "summaries";

/// Key holding the summarization credential.
pub const API_KEY_KEY: &str = "apiKey";

/// Key/value persistence used by the typed stores.
///
/// `write` must be durable before it returns `Ok`.
pub trait StorageBackend: Send + Sync {
    /// Read a key. `Ok(None)` means the key has never been written.
    fn read(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError>;

    /// Replace the value stored under `key`.
    fn write(&self, key: &str, value: serde_json::Value) -> Result<(), StorageError>;
}
