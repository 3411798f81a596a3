//! Summary records, page captures, and id generation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// One persisted entry in the summary history.
///
/// Records are immutable once saved; the only way to change the history is
/// to insert a new record or delete an existing one.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRecord {
    /// Assigned by the coordinator at save time.
    pub id: String,
    pub title: String,
    pub url: String,
    /// Either the raw extraction or the AI summary.
    pub content: String,
    pub is_ai_generated: bool,
    /// When the page text was extracted.
    pub captured_at: DateTime<Utc>,
    /// When the record was persisted. Always `>= captured_at`.
    pub saved_at: DateTime<Utc>,
}

/// The `saveSummary` payload: a record before the coordinator has assigned
/// its `id` and `savedAt`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewSummary {
    pub title: String,
    pub url: String,
    pub content: String,
    #[serde(default)]
    pub is_ai_generated: bool,
    pub captured_at: DateTime<Utc>,
}

impl NewSummary {
    /// Stamp the draft into a full record.
    pub fn into_record(self, id: String, saved_at: DateTime<Utc>) -> SummaryRecord {
        SummaryRecord {
            id,
            title: self.title,
            url: self.url,
            content: self.content,
            is_ai_generated: self.is_ai_generated,
            captured_at: self.captured_at,
            saved_at,
        }
    }
}

/// Text and metadata captured from a document at extraction time.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageCapture {
    pub title: String,
    pub url: String,
    pub content: String,
    pub captured_at: DateTime<Utc>,
}

impl PageCapture {
    /// Build a capture stamped with the current time. The raw text is
    /// normalized with [`normalize_text`].
    pub fn new(title: impl Into<String>, url: impl Into<String>, raw_text: &str) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            content: normalize_text(raw_text),
            captured_at: Utc::now(),
        }
    }

    /// Whether there is any extracted text to fall back on.
    pub fn has_content(&self) -> bool {
        !self.content.trim().is_empty()
    }

    /// Turn the capture into a save payload carrying `content`.
    pub fn to_new_summary(&self, content: String, is_ai_generated: bool) -> NewSummary {
        NewSummary {
            title: self.title.clone(),
            url: self.url.clone(),
            content,
            is_ai_generated,
            captured_at: self.captured_at,
        }
    }
}

/// Collapse every run of whitespace (including newlines) into a single
/// space and trim the ends.
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Generate a record id: millisecond timestamp plus a process-wide counter.
///
/// The counter makes ids unique within a process even when several records
/// are saved in the same millisecond.
pub fn generate_summary_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let ms = Utc::now().timestamp_millis();
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{ms}-{count:04}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique() {
        let ids: HashSet<String> = (0..1000).map(|_| generate_summary_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(
            normalize_text("  Hello\n\n   world \t again  "),
            "Hello world again"
        );
        assert_eq!(normalize_text("\n \t"), "");
    }

    #[test]
    fn capture_normalizes_and_reports_content() {
        let capture = PageCapture::new("Title", "https://example.com", "  a   b ");
        assert_eq!(capture.content, "a b");
        assert!(capture.has_content());

        let empty = PageCapture::new("Title", "https://example.com", "   ");
        assert!(!empty.has_content());
    }

    #[test]
    fn record_serializes_camel_case() {
        let capture = PageCapture::new("T", "https://u", "body");
        let record = capture
            .to_new_summary("summary".into(), true)
            .into_record("1-0000".into(), capture.captured_at);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["isAiGenerated"], true);
        assert!(json.get("capturedAt").is_some());
        assert!(json.get("savedAt").is_some());
    }

    #[test]
    fn new_summary_defaults_ai_flag() {
        let json = r#"{"title":"T","url":"u","content":"c","capturedAt":"2025-01-01T00:00:00Z"}"#;
        let draft: NewSummary = serde_json::from_str(json).unwrap();
        assert!(!draft.is_ai_generated);
    }
}
