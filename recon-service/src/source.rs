//! Event and summary sources
//!
//! Sources are scoped by [`WindowParams`]: rows outside the merchant window
//! are dropped, the rest sorted newest first and cut at `limit`.

use crate::{Error, Result};
use async_trait::async_trait;
use recon_core::merge::sort_newest_first;
use recon_core::{ExternalSummary, LedgerEvent, WindowParams};
use std::path::PathBuf;

/// Source of ledger or pipeline rows
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Fetch rows for a window
    async fn fetch_events(&self, window: &WindowParams) -> Result<Vec<LedgerEvent>>;
}

/// Source of the external summary
#[async_trait]
pub trait SummarySource: Send + Sync {
    /// Fetch the summary for a window (`None` when none exists)
    async fn fetch_summary(&self, window: &WindowParams) -> Result<Option<ExternalSummary>>;
}

/// Apply window filter, newest-first order and limit
pub fn scope(events: Vec<LedgerEvent>, window: &WindowParams) -> Vec<LedgerEvent> {
    let mut scoped: Vec<LedgerEvent> = events
        .into_iter()
        .filter(|e| window.contains(e))
        .collect();
    sort_newest_first(&mut scoped);

    if let Some(limit) = window.limit {
        scoped.truncate(limit);
    }
    scoped
}

/// JSON array of events on disk
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    /// Create source for a file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl EventSource for JsonFileSource {
    async fn fetch_events(&self, window: &WindowParams) -> Result<Vec<LedgerEvent>> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::source_failure("file", format!("{}: {}", self.path.display(), e))
        })?;
        let events: Vec<LedgerEvent> = serde_json::from_str(&content)?;
        Ok(scope(events, window))
    }
}

/// In-memory events
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    events: Vec<LedgerEvent>,
}

impl StaticSource {
    /// Create source over fixed rows
    pub fn new(events: Vec<LedgerEvent>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl EventSource for StaticSource {
    async fn fetch_events(&self, window: &WindowParams) -> Result<Vec<LedgerEvent>> {
        Ok(scope(self.events.clone(), window))
    }
}

/// External summary stored as a JSON object on disk
///
/// A missing file or a `null` document means no summary.
#[derive(Debug, Clone)]
pub struct JsonFileSummary {
    path: PathBuf,
}

impl JsonFileSummary {
    /// Create source for a file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SummarySource for JsonFileSummary {
    async fn fetch_summary(&self, _window: &WindowParams) -> Result<Option<ExternalSummary>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::source_failure(
                    "summary",
                    format!("{}: {}", self.path.display(), e),
                ))
            }
        };
        Ok(serde_json::from_str(&content)?)
    }
}

/// Fixed summary (or none)
#[derive(Debug, Clone, Default)]
pub struct StaticSummary {
    summary: Option<ExternalSummary>,
}

impl StaticSummary {
    /// Create source returning the given summary
    pub fn new(summary: Option<ExternalSummary>) -> Self {
        Self { summary }
    }
}

#[async_trait]
impl SummarySource for StaticSummary {
    async fn fetch_summary(&self, _window: &WindowParams) -> Result<Option<ExternalSummary>> {
        Ok(self.summary.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_core::EventType;

    fn event(id: &str, merchant: &str, at: &str) -> LedgerEvent {
        let mut event = LedgerEvent::new(id, EventType::Confirmed).at(at);
        event.merchant_id = merchant.to_string();
        event
    }

    #[test]
    fn test_scope_filters_sorts_and_limits() {
        let events = vec![
            event("A", "m1", "2024-01-01T00:00:00Z"),
            event("B", "m2", "2024-01-02T00:00:00Z"),
            event("C", "m1", "2024-01-03T00:00:00Z"),
            event("D", "m1", "2024-01-04T00:00:00Z"),
        ];
        let mut window = WindowParams::for_merchant("m1");
        window.limit = Some(2);

        let scoped = scope(events, &window);
        let ids: Vec<_> = scoped.iter().map(|e| e.invoice_id.as_str()).collect();
        assert_eq!(ids, vec!["D", "C"]);
    }

    #[tokio::test]
    async fn test_json_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(
            &path,
            r#"[{"invoiceId":"INV1","eventType":"invoice.confirmed","grossAmount":"12.5","createdAt":"2024-01-01T00:00:00Z"}]"#,
        )
        .unwrap();

        let events = JsonFileSource::new(&path)
            .fetch_events(&WindowParams::default())
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].gross_amount.to_string(), "12.5");
    }

    #[tokio::test]
    async fn test_missing_ledger_file_is_error() {
        let result = JsonFileSource::new("/nonexistent/ledger.json")
            .fetch_events(&WindowParams::default())
            .await;
        assert!(matches!(result, Err(Error::Source { .. })));
    }

    #[tokio::test]
    async fn test_missing_summary_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let summary = JsonFileSummary::new(dir.path().join("summary.json"))
            .fetch_summary(&WindowParams::default())
            .await
            .unwrap();
        assert!(summary.is_none());
    }

    #[tokio::test]
    async fn test_null_summary_document_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        std::fs::write(&path, "null").unwrap();

        let summary = JsonFileSummary::new(&path)
            .fetch_summary(&WindowParams::default())
            .await
            .unwrap();
        assert!(summary.is_none());
    }
}
