//! DelTran Reconciliation Service
//!
//! Caller side of the reconciliation core: fetches the ledger, pipeline and
//! summary sources concurrently, each under its own timeout, then hands the
//! rows to [`recon_core::build_report`].
//!
//! # Degradation
//!
//! - Ledger unavailable → error (there is nothing authoritative to report)
//! - Pipeline unavailable → empty pipeline, logged
//! - Summary unavailable → entries-only report with `summary_not_available`

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod error;
pub mod config;
pub mod source;
pub mod metrics;
pub mod service;

// Re-exports
pub use error::{Error, Result};
pub use config::Config;
pub use metrics::Metrics;
pub use service::ReconciliationService;
