//! Reconciliation against an external summary
//!
//! # Rules (evaluated in order)
//!
//! 1. Summary absent → `summary_not_available` (medium), nothing else
//! 2. Confirmed count differs and the summary count is non-zero → `count_mismatch` (high)
//! 3. Gross drift above 1e-6 → `gross_mismatch` (critical, high when the
//!    dataset holds legacy FX-valued rows)
//! 4. Fee drift above 1e-6 → `fee_mismatch` (high); skipped entirely when the
//!    summary fee sum is zero, which means "not provided"
//! 5. Net drift above 1e-6 → `net_mismatch` (critical)
//! 6. Fiat fee drift or currency difference → `fee_fiat_mismatch` (low); only
//!    when the summary supplies a non-zero fiat fee sum
//! 7. Rounded or out-of-range amounts in the dataset or the summary, or an
//!    overflowing computed sum → `amount_precision_loss` (critical). Without a
//!    summary the loss shows only through `lossyAmounts` and `overflow`.
//!
//! # Status
//!
//! | Condition                         | Status |
//! |-----------------------------------|--------|
//! | Summary missing                   | warn   |
//! | Worst severity high or critical   | error  |
//! | Worst severity low or medium      | warn   |
//! | No issues                         | ok     |

use crate::aggregate::{FeeFiatCurrency, Totals};
use crate::decimal::{canonical, money_epsilon, nearly_equal, to_canonical_string};
use crate::types::{
    ExternalSummary, IssueType, LedgerEvent, ReconciliationIssue, Severity, SuggestedAction,
    UiState, UiStatus, ValuationSchema,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of a reconciliation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconciliation {
    /// Whether an external summary was supplied
    pub summary_available: bool,
    /// Issues in rule order
    pub issues: Vec<ReconciliationIssue>,
    /// Highest severity among issues
    pub worst_severity: Option<Severity>,
}

/// Compare computed totals with the external summary
///
/// `dataset` is the event list the totals were computed from; it is only
/// inspected for valuation-schema and lossy-amount flags.
pub fn reconcile(
    computed: &Totals,
    summary: Option<&ExternalSummary>,
    dataset: &[LedgerEvent],
) -> Reconciliation {
    let summary = match summary {
        Some(summary) => summary,
        None => {
            let issues = vec![ReconciliationIssue::new(
                IssueType::SummaryNotAvailable,
                Severity::Medium,
                "External summary not available; totals are computed from entries only",
            )];
            return Reconciliation {
                summary_available: false,
                worst_severity: worst_severity(&issues),
                issues,
            };
        }
    };

    let mut issues = Vec::new();

    if summary.confirmed_count != 0 && summary.confirmed_count != computed.confirmed_count {
        issues.push(
            ReconciliationIssue::new(
                IssueType::CountMismatch,
                Severity::High,
                format!(
                    "Confirmed count mismatch: computed {} vs summary {}",
                    computed.confirmed_count, summary.confirmed_count
                ),
            )
            .with_meta("computed", computed.confirmed_count)
            .with_meta("summary", summary.confirmed_count),
        );
    }

    if !nearly_equal(computed.gross_sum, summary.gross_sum, money_epsilon()) {
        let legacy = dataset
            .iter()
            .any(|e| e.valuation_schema == ValuationSchema::LegacyFx);
        let (severity, hint) = if legacy {
            (
                Severity::High,
                "Dataset contains legacy FX-valued rows; drift may stem from the valuation migration",
            )
        } else {
            (
                Severity::Critical,
                "Check for missing ledger rows or a stale summary",
            )
        };

        issues.push(
            amount_issue(
                IssueType::GrossMismatch,
                severity,
                "Gross sum",
                computed.gross_sum,
                summary.gross_sum,
            )
            .with_meta("legacyValuation", legacy)
            .with_meta("hint", hint),
        );
    }

    if !summary.fee_sum.is_zero() && !nearly_equal(computed.fee_sum, summary.fee_sum, money_epsilon())
    {
        issues.push(amount_issue(
            IssueType::FeeMismatch,
            Severity::High,
            "Fee sum",
            computed.fee_sum,
            summary.fee_sum,
        ));
    }

    if !nearly_equal(computed.net_sum, summary.net_sum, money_epsilon()) {
        issues.push(amount_issue(
            IssueType::NetMismatch,
            Severity::Critical,
            "Net sum",
            computed.net_sum,
            summary.net_sum,
        ));
    }

    if let Some(fiat_sum) = summary.fee_fiat_sum.filter(|v| !v.is_zero()) {
        if !nearly_equal(computed.fee_fiat_sum, fiat_sum, money_epsilon()) {
            issues.push(amount_issue(
                IssueType::FeeFiatMismatch,
                Severity::Low,
                "Fiat fee sum",
                computed.fee_fiat_sum,
                fiat_sum,
            ));
        }

        let computed_code = match computed.fee_fiat_currency {
            FeeFiatCurrency::Chf => "CHF",
            FeeFiatCurrency::Mixed => "MIXED",
        };
        if let Some(code) = summary
            .fee_fiat_currency
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
        {
            if !code.eq_ignore_ascii_case(computed_code) {
                issues.push(
                    ReconciliationIssue::new(
                        IssueType::FeeFiatMismatch,
                        Severity::Low,
                        format!(
                            "Fiat fee currency mismatch: computed {} vs summary {}",
                            computed_code, code
                        ),
                    )
                    .with_meta("computed", computed_code)
                    .with_meta("summary", code),
                );
            }
        }
    }

    issues.extend(precision_issue(computed, summary, dataset));

    Reconciliation {
        summary_available: true,
        worst_severity: worst_severity(&issues),
        issues,
    }
}

/// Amounts that could not be held exactly make every comparison suspect
fn precision_issue(
    computed: &Totals,
    summary: &ExternalSummary,
    dataset: &[LedgerEvent],
) -> Option<ReconciliationIssue> {
    let lossy_rows = dataset.iter().filter(|e| e.lossy_amounts).count();
    let summary_lossy = summary.lossy_amounts;
    if lossy_rows == 0 && !summary_lossy && !computed.overflow {
        return None;
    }

    Some(
        ReconciliationIssue::new(
            IssueType::AmountPrecisionLoss,
            Severity::Critical,
            format!(
                "Amounts exceed 28 significant digits: {} lossy row(s), summary lossy: {}, totals overflow: {}",
                lossy_rows, summary_lossy, computed.overflow
            ),
        )
        .with_meta("lossyRows", lossy_rows)
        .with_meta("summaryLossy", summary_lossy)
        .with_meta("totalsOverflow", computed.overflow),
    )
}

/// Amount mismatch with delta meta
fn amount_issue(
    issue_type: IssueType,
    severity: Severity,
    label: &str,
    computed: Decimal,
    summary: Decimal,
) -> ReconciliationIssue {
    let delta = computed.saturating_sub(summary);
    let abs_delta = delta.abs();
    let rel_delta = if summary.is_zero() {
        Value::Null
    } else {
        abs_delta
            .checked_div(summary.abs())
            .map(|rel| Value::from(to_canonical_string(rel.round_dp(12))))
            .unwrap_or(Value::Null)
    };

    ReconciliationIssue::new(
        issue_type,
        severity,
        format!(
            "{} mismatch: computed {} vs summary {} (delta {})",
            label,
            canonical(computed),
            canonical(summary),
            canonical(delta)
        ),
    )
    .with_meta("computed", to_canonical_string(computed))
    .with_meta("summary", to_canonical_string(summary))
    .with_meta("delta", to_canonical_string(delta))
    .with_meta("absDelta", to_canonical_string(abs_delta))
    .with_meta("relDelta", rel_delta)
}

/// Highest severity, `None` when there are no issues
pub fn worst_severity(issues: &[ReconciliationIssue]) -> Option<Severity> {
    issues.iter().map(|i| i.severity).max()
}

/// Rank of the worst severity (0 when there are no issues)
pub fn worst_rank(issues: &[ReconciliationIssue]) -> u8 {
    worst_severity(issues).map_or(0, Severity::rank)
}

/// Derive the UI status block from issues
pub fn derive_ui_status(issues: &[ReconciliationIssue], summary_available: bool) -> UiStatus {
    let worst = worst_rank(issues);
    let status = if !summary_available {
        UiState::Warn
    } else if worst >= Severity::High.rank() {
        UiState::Error
    } else if worst >= Severity::Low.rank() {
        UiState::Warn
    } else {
        UiState::Ok
    };

    let summary_missing = !summary_available
        || issues
            .iter()
            .any(|i| i.issue_type == IssueType::SummaryNotAvailable);
    let serious_mismatches = issues
        .iter()
        .filter(|i| i.issue_type.is_mismatch() && i.severity >= Severity::High)
        .count();

    let (headline, subline, action) = match (status, summary_missing, serious_mismatches > 0) {
        (_, true, _) => (
            "Summary unavailable".to_string(),
            "External summary could not be loaded; totals are computed from entries only"
                .to_string(),
            SuggestedAction::OpenSummaryJson,
        ),
        (UiState::Error, false, true) => (
            "Totals mismatch".to_string(),
            format!(
                "{} mismatch(es) against the external summary; backfill the window to rebuild ledger rows",
                serious_mismatches
            ),
            SuggestedAction::TriggerBackfill,
        ),
        (UiState::Error, false, false) => (
            "Reconciliation failed".to_string(),
            "Issues need review; inspect the merged entries".to_string(),
            SuggestedAction::OpenEntriesJson,
        ),
        (UiState::Warn, false, _) => (
            "Minor drift".to_string(),
            format!(
                "{} minor issue(s) against the external summary; inspect the merged entries",
                issues.len()
            ),
            SuggestedAction::OpenEntriesJson,
        ),
        (UiState::Ok, false, _) => (
            "Reconciled".to_string(),
            "Computed totals match the external summary".to_string(),
            SuggestedAction::Reload,
        ),
    };

    UiStatus {
        status,
        headline,
        subline,
        action,
    }
}
