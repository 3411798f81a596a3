//! Helpers for the history-browsing context.
//!
//! [`HistoryView`] keeps the last snapshot fetched from the coordinator plus
//! the current selection. It never mutates the snapshot locally except to
//! mirror an acknowledged `clearAll`; everything else re-reads.

use chrono::{DateTime, Utc};

use crate::coordinator::CoordinatorHandle;
use crate::error::Failure;
use crate::record::SummaryRecord;

/// Case-insensitive substring match on title or content. An empty (or
/// whitespace-only) term matches every record.
pub fn matches_search(record: &SummaryRecord, term: &str) -> bool {
    let term = term.trim();
    if term.is_empty() {
        return true;
    }
    let needle = term.to_lowercase();
    record.title.to_lowercase().contains(&needle) || record.content.to_lowercase().contains(&needle)
}

/// Short relative age of `saved_at` as seen from `now`.
pub fn format_relative(saved_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now.signed_duration_since(saved_at);
    let minutes = age.num_minutes();
    if minutes < 1 {
        "Just now".to_string()
    } else if minutes < 60 {
        format!("{minutes}m ago")
    } else if age.num_hours() < 24 {
        format!("{}h ago", age.num_hours())
    } else if age.num_days() < 7 {
        format!("{}d ago", age.num_days())
    } else {
        saved_at.format("%Y-%m-%d").to_string()
    }
}

/// The history list as the viewer sees it.
pub struct HistoryView {
    handle: CoordinatorHandle,
    records: Vec<SummaryRecord>,
    selected: Option<String>,
}

impl HistoryView {
    pub fn new(handle: CoordinatorHandle) -> Self {
        Self {
            handle,
            records: Vec::new(),
            selected: None,
        }
    }

    /// Last fetched snapshot, newest first.
    pub fn records(&self) -> &[SummaryRecord] {
        &self.records
    }

    /// Re-read the history. Drops the selection if its record is gone.
    pub async fn refresh(&mut self) -> Result<&[SummaryRecord], Failure> {
        self.records = self.handle.get_summaries().await?;
        if let Some(id) = &self.selected
            && !self.records.iter().any(|r| &r.id == id)
        {
            self.selected = None;
        }
        Ok(&self.records)
    }

    pub async fn delete(&mut self, id: &str) -> Result<(), Failure> {
        self.handle.delete_summary(id).await?;
        if self.selected.as_deref() == Some(id) {
            self.selected = None;
        }
        self.refresh().await?;
        Ok(())
    }

    pub async fn clear_all(&mut self) -> Result<(), Failure> {
        self.handle.clear_all().await?;
        self.records.clear();
        self.selected = None;
        Ok(())
    }

    /// Select a record from the snapshot. Unknown ids clear the selection.
    pub fn select(&mut self, id: &str) -> Option<&SummaryRecord> {
        self.selected = self
            .records
            .iter()
            .any(|r| r.id == id)
            .then(|| id.to_string());
        self.selected()
    }

    pub fn selected(&self) -> Option<&SummaryRecord> {
        let id = self.selected.as_deref()?;
        self.records.iter().find(|r| r.id == id)
    }

    /// Records in the snapshot matching `search`, in snapshot order.
    pub fn filtered(&self, search: &str) -> Vec<&SummaryRecord> {
        self.records
            .iter()
            .filter(|r| matches_search(r, search))
            .collect()
    }
}
