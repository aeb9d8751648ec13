//! DelTran Reconciliation Core
//!
//! Computes authoritative accounting totals for a merchant window from two
//! independent event sources and cross-checks them against an external summary.
//!
//! # Architecture
//!
//! - **Classifier**: Tags each event as confirmed, reversed, fee charge or value movement
//! - **Finality**: A reversal voids every confirmation of the same invoice id
//! - **Merger**: Ledger rows always win over pipeline rows with the same key
//! - **Aggregator**: Exact decimal totals plus day and asset rollups
//! - **Comparator**: Severity-ranked issues and a derived UI status

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]
//!
//! # Invariants
//!
//! - Pure: same inputs → same report, nothing is cached or persisted
//! - Ledger precedence: a pipeline row never replaces a ledger row
//! - Fee isolation: only `fee_charged` rows contribute to fee sums
//! - Total: degraded input yields a worse status, never a panic

pub mod types;
pub mod decimal;
pub mod classify;
pub mod finality;
pub mod merge;
pub mod aggregate;
pub mod reconcile;
pub mod report;

// Re-exports
pub use types::{
    EventType, ExternalSummary, IssueType, LedgerEvent, ReconciliationIssue, Severity,
    SuggestedAction, UiState, UiStatus, ValuationSchema, WindowParams,
};
pub use aggregate::{AssetRollup, DayRollup, FeeFiatCurrency, FeeSummary, Totals};
pub use merge::merge_sources;
pub use reconcile::{derive_ui_status, reconcile, Reconciliation};
pub use report::{build_report, AccountingReport, ReportInput, SourcePair};
