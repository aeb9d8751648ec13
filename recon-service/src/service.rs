//! Reconciliation run orchestration

use crate::config::{Config, FetchConfig};
use crate::source::{EventSource, JsonFileSource, JsonFileSummary, StaticSummary, SummarySource};
use crate::{Error, Metrics, Result};
use recon_core::{build_report, AccountingReport, LedgerEvent, ReportInput, SourcePair, WindowParams};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Fetches the sources for a window and builds the accounting report
#[derive(Clone)]
pub struct ReconciliationService {
    ledger: Arc<dyn EventSource>,
    pipeline: Arc<dyn EventSource>,
    summary: Arc<dyn SummarySource>,
    fetch: FetchConfig,
    metrics: Option<Metrics>,
}

impl fmt::Debug for ReconciliationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconciliationService")
            .field("fetch", &self.fetch)
            .field("metrics", &self.metrics.is_some())
            .finish_non_exhaustive()
    }
}

impl ReconciliationService {
    /// Create service over explicit sources
    pub fn new(
        ledger: Arc<dyn EventSource>,
        pipeline: Arc<dyn EventSource>,
        summary: Arc<dyn SummarySource>,
        fetch: FetchConfig,
    ) -> Self {
        Self {
            ledger,
            pipeline,
            summary,
            fetch,
            metrics: None,
        }
    }

    /// Create service over the JSON files named in the config
    pub fn from_config(config: &Config) -> Self {
        let summary: Arc<dyn SummarySource> = match &config.sources.summary_path {
            Some(path) => Arc::new(JsonFileSummary::new(path)),
            None => Arc::new(StaticSummary::new(None)),
        };

        Self::new(
            Arc::new(JsonFileSource::new(&config.sources.ledger_path)),
            Arc::new(JsonFileSource::new(&config.sources.pipeline_path)),
            summary,
            config.fetch.clone(),
        )
    }

    /// Attach metrics collector
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Metrics collector, if attached
    pub fn metrics(&self) -> Option<&Metrics> {
        self.metrics.as_ref()
    }

    /// Run one reconciliation for a merchant window
    ///
    /// `window.limit` overrides the configured display limit. The totals
    /// window is never smaller than the display window.
    #[instrument(skip(self), fields(merchant = %window.merchant_id))]
    pub async fn run(&self, window: &WindowParams) -> Result<AccountingReport> {
        let started = Instant::now();

        let display_limit = window.limit.unwrap_or(self.fetch.display_limit);
        let display_window = WindowParams {
            limit: Some(display_limit),
            ..window.clone()
        };
        let totals_window = WindowParams {
            limit: Some(self.fetch.totals_limit.max(display_limit)),
            ..window.clone()
        };

        let (display_ledger, display_pipeline, totals_ledger, totals_pipeline, summary) = tokio::join!(
            timed(
                "ledger",
                self.fetch.ledger_timeout_ms,
                self.ledger.fetch_events(&display_window)
            ),
            timed(
                "pipeline",
                self.fetch.pipeline_timeout_ms,
                self.pipeline.fetch_events(&display_window)
            ),
            timed(
                "ledger",
                self.fetch.ledger_timeout_ms,
                self.ledger.fetch_events(&totals_window)
            ),
            timed(
                "pipeline",
                self.fetch.pipeline_timeout_ms,
                self.pipeline.fetch_events(&totals_window)
            ),
            timed(
                "summary",
                self.fetch.summary_timeout_ms,
                self.summary.fetch_summary(&totals_window)
            ),
        );

        // Record both ledger outcomes before failing the run
        let (display_ledger, totals_ledger) =
            match (self.required(display_ledger), self.required(totals_ledger)) {
                (Ok(display), Ok(totals)) => (display, totals),
                (Err(e), _) | (_, Err(e)) => return Err(e),
            };
        let display_pipeline = self.best_effort(display_pipeline);
        let totals_pipeline = self.best_effort(totals_pipeline);

        let summary = match summary {
            Ok(summary) => summary,
            Err(e) => {
                warn!("Summary unavailable, reporting entries only: {}", e);
                self.record_failure(&e);
                None
            }
        };

        debug!(
            "Fetched ledger {}/{} rows, pipeline {}/{} rows, summary: {}",
            display_ledger.len(),
            totals_ledger.len(),
            display_pipeline.len(),
            totals_pipeline.len(),
            summary.is_some()
        );

        let report = build_report(&ReportInput {
            display: SourcePair::new(display_ledger, display_pipeline),
            totals: Some(SourcePair::new(totals_ledger, totals_pipeline)),
            summary,
        });

        let elapsed = started.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.record_run(
                report.ui.status,
                &report.reconciliation.issues,
                elapsed.as_secs_f64(),
            );
        }

        info!(
            "Reconciliation finished: {:?} ({} issues, {} confirmed) in {:?}",
            report.ui.status,
            report.reconciliation.issues.len(),
            report.totals_summary.confirmed_count,
            elapsed
        );

        Ok(report)
    }

    fn required(&self, fetched: Result<Vec<LedgerEvent>>) -> Result<Vec<LedgerEvent>> {
        fetched.map_err(|e| {
            self.record_failure(&e);
            e
        })
    }

    fn best_effort(&self, fetched: Result<Vec<LedgerEvent>>) -> Vec<LedgerEvent> {
        fetched.unwrap_or_else(|e| {
            warn!("Pipeline unavailable, continuing with ledger only: {}", e);
            self.record_failure(&e);
            Vec::new()
        })
    }

    fn record_failure(&self, error: &Error) {
        if let Some(metrics) = &self.metrics {
            let source = match error {
                Error::Source { source_name, .. } | Error::Timeout { source_name, .. } => {
                    *source_name
                }
                _ => "unknown",
            };
            metrics.record_source_failure(source);
        }
    }
}

/// Run a fetch under a timeout, labelling failures with the source role
async fn timed<T>(
    source_name: &'static str,
    timeout_ms: u64,
    fetch: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(Duration::from_millis(timeout_ms), fetch).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(Error::Source { message, .. })) => Err(Error::source_failure(source_name, message)),
        Ok(Err(e)) => Err(Error::source_failure(source_name, e.to_string())),
        Err(_) => Err(Error::Timeout {
            source_name,
            timeout_ms,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticSource;
    use async_trait::async_trait;
    use recon_core::{EventType, ExternalSummary, IssueType, UiState};
    use rust_decimal::Decimal;

    struct FailingSource;

    #[async_trait]
    impl EventSource for FailingSource {
        async fn fetch_events(&self, _window: &WindowParams) -> Result<Vec<LedgerEvent>> {
            Err(Error::source_failure("test", "connection refused"))
        }
    }

    #[async_trait]
    impl SummarySource for FailingSource {
        async fn fetch_summary(&self, _window: &WindowParams) -> Result<Option<ExternalSummary>> {
            Err(Error::source_failure("test", "502 bad gateway"))
        }
    }

    struct StalledSource;

    #[async_trait]
    impl EventSource for StalledSource {
        async fn fetch_events(&self, _window: &WindowParams) -> Result<Vec<LedgerEvent>> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(Vec::new())
        }
    }

    fn confirmed(id: &str, gross: i64, at: &str) -> LedgerEvent {
        LedgerEvent::new(id, EventType::Confirmed)
            .with_amounts(Decimal::from(gross), Decimal::ZERO, Decimal::from(gross))
            .at(at)
    }

    fn ledger() -> Arc<dyn EventSource> {
        Arc::new(StaticSource::new(vec![
            confirmed("INV1", 100, "2024-05-01T08:00:00Z"),
            confirmed("INV2", 50, "2024-05-02T08:00:00Z"),
        ]))
    }

    fn matching_summary() -> Arc<dyn SummarySource> {
        Arc::new(StaticSummary::new(Some(ExternalSummary {
            confirmed_count: 2,
            gross_sum: Decimal::from(150),
            fee_sum: Decimal::ZERO,
            net_sum: Decimal::from(150),
            ..Default::default()
        })))
    }

    fn service(
        ledger: Arc<dyn EventSource>,
        pipeline: Arc<dyn EventSource>,
        summary: Arc<dyn SummarySource>,
    ) -> ReconciliationService {
        ReconciliationService::new(ledger, pipeline, summary, FetchConfig::default())
            .with_metrics(Metrics::new().unwrap())
    }

    #[tokio::test]
    async fn test_reconciled_run() {
        let service = service(ledger(), Arc::new(StaticSource::default()), matching_summary());

        let report = service.run(&WindowParams::default()).await.unwrap();
        assert_eq!(report.ui.status, UiState::Ok);
        assert_eq!(report.totals_summary.confirmed_count, 2);

        let metrics = service.metrics().unwrap();
        assert_eq!(metrics.runs_total.get(), 1);
        assert_eq!(metrics.last_status.get(), 0);
    }

    #[tokio::test]
    async fn test_display_limit_does_not_shrink_totals() {
        let service = service(ledger(), Arc::new(StaticSource::default()), matching_summary());
        let window = WindowParams {
            limit: Some(1),
            ..Default::default()
        };

        let report = service.run(&window).await.unwrap();
        assert_eq!(report.kpis_summary.confirmed_count, 1);
        assert_eq!(report.totals_summary.confirmed_count, 2);
        assert!(report.reconciliation.issues.is_empty());
    }

    #[tokio::test]
    async fn test_ledger_failure_is_error() {
        let service = service(
            Arc::new(FailingSource),
            Arc::new(StaticSource::default()),
            matching_summary(),
        );

        let result = service.run(&WindowParams::default()).await;
        assert!(matches!(
            result,
            Err(Error::Source {
                source_name: "ledger",
                ..
            })
        ));

        // Display and totals fetches both count
        let metrics = service.metrics().unwrap();
        assert_eq!(metrics.runs_total.get(), 0);
        assert_eq!(metrics.source_failures.with_label_values(&["ledger"]).get(), 2);
    }

    struct TotalsOnlyFailure;

    #[async_trait]
    impl EventSource for TotalsOnlyFailure {
        async fn fetch_events(&self, window: &WindowParams) -> Result<Vec<LedgerEvent>> {
            if window.limit == Some(FetchConfig::default().display_limit) {
                Ok(vec![confirmed("INV1", 100, "2024-05-01T08:00:00Z")])
            } else {
                Err(Error::source_failure("test", "read timeout"))
            }
        }
    }

    #[tokio::test]
    async fn test_totals_ledger_failure_is_recorded() {
        let service = service(
            Arc::new(TotalsOnlyFailure),
            Arc::new(StaticSource::default()),
            matching_summary(),
        );

        let result = service.run(&WindowParams::default()).await;
        assert!(matches!(
            result,
            Err(Error::Source {
                source_name: "ledger",
                ..
            })
        ));
        assert_eq!(
            service
                .metrics()
                .unwrap()
                .source_failures
                .with_label_values(&["ledger"])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn test_pipeline_failure_degrades() {
        let service = service(ledger(), Arc::new(FailingSource), matching_summary());

        let report = service.run(&WindowParams::default()).await.unwrap();
        assert_eq!(report.ui.status, UiState::Ok);
        assert_eq!(
            service
                .metrics()
                .unwrap()
                .source_failures
                .with_label_values(&["pipeline"])
                .get(),
            2
        );
    }

    #[tokio::test]
    async fn test_summary_failure_reports_entries_only() {
        let service = service(ledger(), Arc::new(StaticSource::default()), Arc::new(FailingSource));

        let report = service.run(&WindowParams::default()).await.unwrap();
        assert!(!report.reconciliation.summary_available);
        assert_eq!(
            report.reconciliation.issues[0].issue_type,
            IssueType::SummaryNotAvailable
        );
        assert_eq!(report.ui.status, UiState::Warn);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_pipeline_times_out() {
        let service = service(ledger(), Arc::new(StalledSource), matching_summary());

        let report = service.run(&WindowParams::default()).await.unwrap();
        assert_eq!(report.totals_summary.confirmed_count, 2);
        assert_eq!(
            service
                .metrics()
                .unwrap()
                .source_failures
                .with_label_values(&["pipeline"])
                .get(),
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_ledger_is_timeout_error() {
        let service = service(
            Arc::new(StalledSource),
            Arc::new(StaticSource::default()),
            matching_summary(),
        );

        let result = service.run(&WindowParams::default()).await;
        assert!(matches!(
            result,
            Err(Error::Timeout {
                source_name: "ledger",
                timeout_ms: 5000
            })
        ));
    }
}
