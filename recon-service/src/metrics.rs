//! Metrics collection for observability
//!
//! Prometheus metrics for reconciliation runs, kept in a private registry so
//! several services can live in one process.
//!
//! # Metrics
//!
//! - `recon_runs_total` - Completed reconciliation runs
//! - `recon_issues_total{type,severity}` - Issues raised, by type and severity
//! - `recon_run_duration_seconds` - Histogram of run latencies
//! - `recon_source_failures_total{source}` - Failed or timed-out fetches
//! - `recon_last_status` - Status of the last run (0 ok, 1 warn, 2 error)

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use recon_core::{ReconciliationIssue, Severity, UiState};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Completed runs
    pub runs_total: IntCounter,

    /// Issues by type and severity
    pub issues_total: IntCounterVec,

    /// Run duration histogram
    pub run_duration: Histogram,

    /// Source failures by source
    pub source_failures: IntCounterVec,

    /// Status of the last run
    pub last_status: IntGauge,

    registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("runs_total", &self.runs_total.get())
            .field("last_status", &self.last_status.get())
            .finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let runs_total = IntCounter::new("recon_runs_total", "Completed reconciliation runs")?;
        registry.register(Box::new(runs_total.clone()))?;

        let issues_total = IntCounterVec::new(
            Opts::new("recon_issues_total", "Reconciliation issues raised"),
            &["type", "severity"],
        )?;
        registry.register(Box::new(issues_total.clone()))?;

        let run_duration = Histogram::with_opts(
            HistogramOpts::new(
                "recon_run_duration_seconds",
                "Histogram of reconciliation run latencies",
            )
            .buckets(vec![0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0]),
        )?;
        registry.register(Box::new(run_duration.clone()))?;

        let source_failures = IntCounterVec::new(
            Opts::new(
                "recon_source_failures_total",
                "Source fetches that failed or timed out",
            ),
            &["source"],
        )?;
        registry.register(Box::new(source_failures.clone()))?;

        let last_status = IntGauge::new(
            "recon_last_status",
            "Status of the last run (0 ok, 1 warn, 2 error)",
        )?;
        registry.register(Box::new(last_status.clone()))?;

        Ok(Self {
            runs_total,
            issues_total,
            run_duration,
            source_failures,
            last_status,
            registry,
        })
    }

    /// Record a completed run
    pub fn record_run(&self, status: UiState, issues: &[ReconciliationIssue], duration_seconds: f64) {
        self.runs_total.inc();
        self.run_duration.observe(duration_seconds);
        self.last_status.set(status_code(status));

        for issue in issues {
            self.issues_total
                .with_label_values(&[issue.issue_type.as_str(), severity_label(issue.severity)])
                .inc();
        }
    }

    /// Record a failed or timed-out fetch
    pub fn record_source_failure(&self, source: &str) {
        self.source_failures.with_label_values(&[source]).inc();
    }

    /// Render in the Prometheus text format
    pub fn render(&self) -> crate::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| crate::Error::Other(e.to_string()))
    }
}

fn status_code(status: UiState) -> i64 {
    match status {
        UiState::Ok => 0,
        UiState::Warn => 1,
        UiState::Error => 2,
    }
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Low => "low",
        Severity::Medium => "medium",
        Severity::High => "high",
        Severity::Critical => "critical",
    }
}
