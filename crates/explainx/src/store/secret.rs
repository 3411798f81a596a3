//! Single optional credential for the summarization service.

use std::fmt;
use std::sync::Arc;

use super::{API_KEY_KEY, StorageBackend};
use crate::error::StorageError;

/// The summarization API key.
///
/// `Debug` never prints the value, so a credential can sit inside structs
/// that get logged without leaking.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw secret. Only the summarizer should call this.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Empty and whitespace-only keys are not usable.
    pub fn is_usable(&self) -> bool {
        !self.0.trim().is_empty()
    }

    /// Masked form for display, e.g. `sk-…f00d`.
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 8 {
            return "*".repeat(chars.len());
        }
        let head: String = chars.iter().take(3).collect();
        let tail: String = chars.iter().skip(chars.len() - 4).collect();
        format!("{head}…{tail}")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Reads and writes the credential. No caching: every `get` goes to the
/// backend so a freshly saved key is picked up by the next summary request.
pub struct SecretStore {
    backend: Arc<dyn StorageBackend>,
}

impl SecretStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Write an explicit "no credential" value if the key has never been written.
    pub fn initialize(&self) -> Result<(), StorageError> {
        if self.backend.read(API_KEY_KEY)?.is_none() {
            self.backend.write(API_KEY_KEY, serde_json::Value::Null)?;
        }
        Ok(())
    }

    /// The stored credential, if any. Blank values are returned as stored;
    /// callers decide usability with [`Credential::is_usable`].
    pub fn get(&self) -> Result<Option<Credential>, StorageError> {
        match self.backend.read(API_KEY_KEY)? {
            Some(serde_json::Value::String(s)) => Ok(Some(Credential(s))),
            Some(serde_json::Value::Null) | None => Ok(None),
            Some(other) => Err(StorageError::Corrupt {
                key: API_KEY_KEY.to_string(),
                reason: format!("expected a string, found {other}"),
            }),
        }
    }

    /// Replace the credential. Durable once this returns `Ok`.
    pub fn set(&self, credential: Credential) -> Result<(), StorageError> {
        self.backend
            .write(API_KEY_KEY, serde_json::Value::String(credential.0))
    }
}
