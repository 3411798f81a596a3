//! Bounded, newest-first summary history.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::{SUMMARIES_KEY, StorageBackend};
use crate::error::StorageError;
use crate::record::{NewSummary, SummaryRecord, generate_summary_id};

/// Maximum records kept in the history. Inserting beyond this evicts the oldest.
pub const MAX_SUMMARIES: usize = 50;

/// The summary history: at most [`MAX_SUMMARIES`] records, ordered by
/// `saved_at` descending.
///
/// The store keeps a write-through cache of the persisted sequence. Each
/// mutation builds the next sequence, writes it, and only then replaces the
/// cache, so a failed write leaves both the backend and the cache untouched.
///
/// Methods take `&mut self`; the coordinator is the single owner and calls
/// them one at a time from its task, which is what serializes concurrent
/// inserts from different callers.
pub struct SummaryStore {
    backend: Arc<dyn StorageBackend>,
    records: Vec<SummaryRecord>,
}

impl SummaryStore {
    /// Load the history from `backend`.
    ///
    /// A missing key yields an empty history. A value that cannot be parsed
    /// is logged and treated as empty; the next successful write replaces it.
    pub fn load(backend: Arc<dyn StorageBackend>) -> Result<Self, StorageError> {
        let records = match backend.read(SUMMARIES_KEY) {
            Ok(Some(value)) => match serde_json::from_value::<Vec<SummaryRecord>>(value) {
                Ok(records) => records,
                Err(e) => {
                    warn!("Discarding unreadable summary history: {e}");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(StorageError::Corrupt { reason, .. }) => {
                warn!("Discarding unreadable summary history: {reason}");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        Ok(Self { backend, records })
    }

    /// Write the empty history if the key has never been written.
    ///
    /// Safe to call on every activation. An unreadable value is left in place
    /// until the next insert, delete or clear replaces it.
    pub fn initialize(&mut self) -> Result<(), StorageError> {
        if matches!(self.backend.read(SUMMARIES_KEY), Ok(None)) && self.records.is_empty() {
            debug!("Initializing empty summary history");
            self.persist(Vec::new())?;
        }
        Ok(())
    }

    /// Snapshot of the history, newest first.
    pub fn list(&self) -> Vec<SummaryRecord> {
        self.records.clone()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Assign an id and `saved_at`, prepend, and trim to [`MAX_SUMMARIES`].
    ///
    /// `saved_at` is clamped so it is never earlier than the record's own
    /// `captured_at` nor the current head's `saved_at`.
    pub fn insert(&mut self, draft: NewSummary) -> Result<SummaryRecord, StorageError> {
        self.insert_at(draft, Utc::now())
    }

    pub(crate) fn insert_at(
        &mut self,
        draft: NewSummary,
        now: DateTime<Utc>,
    ) -> Result<SummaryRecord, StorageError> {
        let mut saved_at = now.max(draft.captured_at);
        if let Some(head) = self.records.first() {
            saved_at = saved_at.max(head.saved_at);
        }
        let record = draft.into_record(generate_summary_id(), saved_at);

        let mut next = Vec::with_capacity(MAX_SUMMARIES);
        next.push(record.clone());
        next.extend(self.records.iter().take(MAX_SUMMARIES - 1).cloned());

        self.persist(next)?;
        debug!(
            "Saved summary {} ({} record(s) stored)",
            record.id,
            self.records.len()
        );
        Ok(record)
    }

    /// Remove the record with `id`. Returns whether anything was removed.
    ///
    /// A missing id is not an error and performs no write.
    pub fn delete(&mut self, id: &str) -> Result<bool, StorageError> {
        if !self.records.iter().any(|r| r.id == id) {
            return Ok(false);
        }
        let next: Vec<SummaryRecord> = self.records.iter().filter(|r| r.id != id).cloned().collect();
        self.persist(next)?;
        Ok(true)
    }

    /// Remove every record.
    pub fn clear(&mut self) -> Result<(), StorageError> {
        self.persist(Vec::new())
    }

    fn persist(&mut self, next: Vec<SummaryRecord>) -> Result<(), StorageError> {
        let value = serde_json::to_value(&next).map_err(|source| StorageError::Serialize {
            key: SUMMARIES_KEY.to_string(),
            source,
        })?;
        self.backend.write(SUMMARIES_KEY, value)?;
        self.records = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;
    use chrono::Duration;

    fn draft(title: &str) -> NewSummary {
        NewSummary {
            title: title.into(),
            url: format!("https://example.com/{title}"),
            content: format!("content of {title}"),
            is_ai_generated: false,
            captured_at: Utc::now(),
        }
    }

    fn memory_store() -> (Arc<MemoryBackend>, SummaryStore) {
        let backend = Arc::new(MemoryBackend::new());
        let store = SummaryStore::load(backend.clone()).unwrap();
        (backend, store)
    }

    #[test]
    fn initialize_is_idempotent() {
        let (backend, mut store) = memory_store();
        store.initialize().unwrap();
        assert_eq!(backend.get_raw(SUMMARIES_KEY), Some(serde_json::json!([])));

        store.insert(draft("a")).unwrap();
        store.initialize().unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn length_and_order_hold_after_every_insert() {
        let (_backend, mut store) = memory_store();
        let base = Utc::now();
        for i in 0..60usize {
            let prior = store.len();
            store
                .insert_at(draft(&format!("r{i}")), base + Duration::seconds(i as i64))
                .unwrap();
            assert_eq!(store.len(), (prior + 1).min(MAX_SUMMARIES));
            let list = store.list();
            assert!(list.windows(2).all(|w| w[0].saved_at >= w[1].saved_at));
            assert_eq!(list[0].title, format!("r{i}"));
        }
    }

    #[test]
    fn fifty_first_insert_evicts_exactly_the_oldest() {
        let (_backend, mut store) = memory_store();
        for i in 0..MAX_SUMMARIES {
            store.insert(draft(&format!("r{i}"))).unwrap();
        }
        let before = store.list();
        assert_eq!(before.last().unwrap().title, "r0");

        store.insert(draft("newest")).unwrap();
        let after = store.list();
        assert_eq!(after.len(), MAX_SUMMARIES);
        assert_eq!(after[0].title, "newest");
        assert_eq!(&after[1..], &before[..MAX_SUMMARIES - 1]);
        assert!(after.iter().all(|r| r.title != "r0"));
    }

    #[test]
    fn saved_at_never_precedes_captured_at_or_head() {
        let (_backend, mut store) = memory_store();
        let now = Utc::now();

        let mut future = draft("future");
        future.captured_at = now + Duration::hours(1);
        let first = store.insert_at(future, now).unwrap();
        assert!(first.saved_at >= first.captured_at);

        // Clock went backwards: the new head must not sort below the old one.
        let second = store.insert_at(draft("skewed"), now - Duration::hours(2)).unwrap();
        assert!(second.saved_at >= first.saved_at);
    }

    #[test]
    fn delete_missing_id_leaves_store_unchanged() {
        let (backend, mut store) = memory_store();
        store.insert(draft("a")).unwrap();
        store.insert(draft("b")).unwrap();
        let raw_before = serde_json::to_vec(&backend.get_raw(SUMMARIES_KEY)).unwrap();

        assert!(!store.delete("no-such-id").unwrap());

        let raw_after = serde_json::to_vec(&backend.get_raw(SUMMARIES_KEY)).unwrap();
        assert_eq!(raw_before, raw_after);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn delete_removes_matching_record() {
        let (_backend, mut store) = memory_store();
        let a = store.insert(draft("a")).unwrap();
        store.insert(draft("b")).unwrap();
        assert!(store.delete(&a.id).unwrap());
        assert_eq!(store.len(), 1);
        assert_eq!(store.list()[0].title, "b");
    }

    #[test]
    fn clear_empties_regardless_of_contents() {
        let (_backend, mut store) = memory_store();
        for i in 0..5 {
            store.insert(draft(&format!("r{i}"))).unwrap();
        }
        store.clear().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn failed_write_leaves_history_untouched() {
        let (backend, mut store) = memory_store();
        store.insert(draft("kept")).unwrap();
        backend.set_fail_writes(true);

        assert!(store.insert(draft("lost")).is_err());
        assert!(store.clear().is_err());
        assert_eq!(store.len(), 1);
        assert_eq!(store.list()[0].title, "kept");
    }

    #[test]
    fn reload_sees_persisted_records() {
        let (backend, mut store) = memory_store();
        store.insert(draft("persisted")).unwrap();
        let reloaded = SummaryStore::load(backend).unwrap();
        assert_eq!(reloaded.list(), store.list());
    }

    #[test]
    fn unreadable_history_loads_as_empty() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert_raw(SUMMARIES_KEY, serde_json::json!({"not": "an array"}));
        let store = SummaryStore::load(backend).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn activation_keeps_unreadable_history_file_until_a_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("{SUMMARIES_KEY}.json"));
        std::fs::write(&path, "{ truncated").unwrap();

        let backend = Arc::new(crate::store::JsonFileBackend::new(dir.path()).unwrap());
        let mut store = SummaryStore::load(backend).unwrap();
        assert!(store.is_empty());
        store.initialize().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ truncated");

        store.insert(draft("fresh")).unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.as_array().unwrap().len(), 1);
    }
}
