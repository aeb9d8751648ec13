//! Report assembly
//!
//! Single entry point that runs the whole pipeline for one merchant window.
//! The display window feeds the KPI tiles; everything authoritative (totals,
//! rollups, fees, reconciliation) runs over the larger totals window so that
//! page-size truncation never shows up as a mismatch.

use crate::aggregate::{
    compute_by_asset_confirmed, compute_by_day_confirmed, compute_fee_summary, compute_totals,
    AssetRollup, DayRollup, FeeSummary, Totals,
};
use crate::finality::reversed_invoice_ids;
use crate::merge::merge_sources;
use crate::reconcile::{derive_ui_status, reconcile, Reconciliation};
use crate::types::{ExternalSummary, LedgerEvent, UiStatus};
use serde::{Deserialize, Serialize};

/// Rows fetched from both sources for one window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourcePair {
    /// Authoritative ledger rows
    pub ledger: Vec<LedgerEvent>,
    /// Best-effort pipeline rows
    pub pipeline: Vec<LedgerEvent>,
}

impl SourcePair {
    /// Create pair
    pub fn new(ledger: Vec<LedgerEvent>, pipeline: Vec<LedgerEvent>) -> Self {
        Self { ledger, pipeline }
    }

    /// Merged canonical list
    pub fn merged(&self) -> Vec<LedgerEvent> {
        merge_sources(&self.ledger, &self.pipeline)
    }
}

/// Everything the engine needs for one window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportInput {
    /// Display-window rows
    pub display: SourcePair,
    /// Totals-window rows (falls back to `display` when absent)
    pub totals: Option<SourcePair>,
    /// External summary, if it could be fetched
    pub summary: Option<ExternalSummary>,
}

/// Full accounting report for one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountingReport {
    /// Totals over the display window
    pub kpis_summary: Totals,
    /// Totals over the totals window
    pub totals_summary: Totals,
    /// Day rollups over the totals window
    pub by_day: Vec<DayRollup>,
    /// Asset rollups over the totals window
    pub by_asset: Vec<AssetRollup>,
    /// Fee rows summary over the totals window
    pub fees: FeeSummary,
    /// Comparison against the external summary
    pub reconciliation: Reconciliation,
    /// Status block
    pub ui: UiStatus,
    /// Merged totals-window rows
    pub entries: Vec<LedgerEvent>,
}

/// Build the report
pub fn build_report(input: &ReportInput) -> AccountingReport {
    let display = input.display.merged();
    let display_reversed = reversed_invoice_ids(&display);
    let kpis_summary = compute_totals(&display, &display_reversed);

    let (entries, totals_summary, reversed) = match &input.totals {
        Some(pair) => {
            let merged = pair.merged();
            let reversed = reversed_invoice_ids(&merged);
            let totals = compute_totals(&merged, &reversed);
            (merged, totals, reversed)
        }
        None => (display, kpis_summary.clone(), display_reversed),
    };

    let reconciliation = reconcile(&totals_summary, input.summary.as_ref(), &entries);
    let ui = derive_ui_status(&reconciliation.issues, reconciliation.summary_available);

    AccountingReport {
        kpis_summary,
        totals_summary,
        by_day: compute_by_day_confirmed(&entries, &reversed),
        by_asset: compute_by_asset_confirmed(&entries, &reversed),
        fees: compute_fee_summary(&entries),
        reconciliation,
        ui,
        entries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventType, UiState};
    use rust_decimal::Decimal;

    fn confirmed(id: &str, gross: i64, at: &str) -> LedgerEvent {
        LedgerEvent::new(id, EventType::Confirmed)
            .with_amounts(Decimal::from(gross), Decimal::ZERO, Decimal::from(gross))
            .at(at)
    }

    #[test]
    fn test_totals_window_used_for_reconciliation() {
        let display = SourcePair::new(vec![confirmed("INV3", 30, "2024-03-03T00:00:00Z")], vec![]);
        let totals = SourcePair::new(
            vec![
                confirmed("INV1", 10, "2024-03-01T00:00:00Z"),
                confirmed("INV2", 20, "2024-03-02T00:00:00Z"),
                confirmed("INV3", 30, "2024-03-03T00:00:00Z"),
            ],
            vec![],
        );
        let summary = ExternalSummary {
            confirmed_count: 3,
            gross_sum: Decimal::from(60),
            net_sum: Decimal::from(60),
            ..Default::default()
        };

        let report = build_report(&ReportInput {
            display,
            totals: Some(totals),
            summary: Some(summary),
        });

        assert_eq!(report.kpis_summary.confirmed_count, 1);
        assert_eq!(report.totals_summary.confirmed_count, 3);
        assert_eq!(report.by_day.len(), 3);
        assert_eq!(report.entries[0].invoice_id, "INV3");
        assert_eq!(report.ui.status, UiState::Ok);
    }

    #[test]
    fn test_display_window_fallback() {
        let display = SourcePair::new(vec![confirmed("INV1", 10, "2024-03-01T00:00:00Z")], vec![]);
        let report = build_report(&ReportInput {
            display,
            totals: None,
            summary: None,
        });

        assert_eq!(report.kpis_summary, report.totals_summary);
        assert_eq!(report.ui.status, UiState::Warn);
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let report = build_report(&ReportInput::default());
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["totalsSummary"]["confirmedCount"], 0);
        assert_eq!(value["totalsSummary"]["grossSum"], "0");
        assert_eq!(value["totalsSummary"]["feeFiatCurrency"], "CHF");
        assert_eq!(value["reconciliation"]["issues"][0]["type"], "summary_not_available");
        assert_eq!(value["ui"]["status"], "warn");
        assert_eq!(value["ui"]["action"], "open_summary_json");
    }
}
