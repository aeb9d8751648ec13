//! Totals and rollups over a canonical event list
//!
//! # Counting rules
//!
//! - `confirmed_count`: final confirmations only, no fallback counting
//! - `gross_sum` / `net_sum`: final confirmations, fee charges and fallback
//!   value-movement rows
//! - `fee_sum`: `fee_charged` rows only; a confirmation's `feeAmount` never
//!   contributes
//! - `fee_fiat_currency`: `CHF` unless a fee row carries another fiat code
//!
//! Day and asset rollups keep final-confirmed rows only, group them and run
//! [`compute_totals`] on each group. Fee charges and fallback rows never open
//! or move a rollup group.
//!
//! Sums are exact. A sum that no longer fits a [`Decimal`] saturates and
//! sets [`Totals::overflow`].

use crate::classify::classify;
use crate::decimal::{canonical, exact_add};
use crate::finality::is_final_confirmed;
use crate::types::LedgerEvent;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Fiat currency the fee rows were valued in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeFiatCurrency {
    /// All fee rows in CHF (or unspecified)
    #[default]
    #[serde(rename = "CHF")]
    Chf,
    /// At least one fee row in another currency
    #[serde(rename = "MIXED")]
    Mixed,
}

/// Scalar totals for a set of events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    /// Final confirmations
    pub confirmed_count: u64,
    /// Gross sum
    pub gross_sum: Decimal,
    /// Fee sum (fee rows only)
    pub fee_sum: Decimal,
    /// Net sum
    pub net_sum: Decimal,
    /// Fiat-valued fee sum
    pub fee_fiat_sum: Decimal,
    /// Fiat currency of `fee_fiat_sum`
    pub fee_fiat_currency: FeeFiatCurrency,
    /// A sum exceeded the decimal range and was clamped
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub overflow: bool,
}

/// Totals for one UTC calendar day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayRollup {
    /// UTC day
    pub day: NaiveDate,
    /// Totals for the day
    #[serde(flatten)]
    pub totals: Totals,
}

/// Totals for one (currency, network) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRollup {
    /// Currency / asset code
    pub currency: String,
    /// Network
    pub network: String,
    /// Totals for the asset
    #[serde(flatten)]
    pub totals: Totals,
}

/// Fee rows summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeSummary {
    /// Number of `fee_charged` rows
    pub fee_count: u64,
    /// Fee sum
    pub fee_sum: Decimal,
    /// Fiat-valued fee sum
    pub fee_fiat_sum: Decimal,
    /// Fiat currency of `fee_fiat_sum`
    pub fee_fiat_currency: FeeFiatCurrency,
}

/// Whether an event contributes to gross/net
fn contributes(event: &LedgerEvent, reversed: &HashSet<String>) -> bool {
    let class = classify(event);
    class.is_fee_charge || class.is_value_movement || is_final_confirmed(event, reversed)
}

/// Compute totals over a set of events
pub fn compute_totals<'a, I>(events: I, reversed: &HashSet<String>) -> Totals
where
    I: IntoIterator<Item = &'a LedgerEvent>,
{
    let mut totals = Totals::default();

    for event in events {
        if is_final_confirmed(event, reversed) {
            totals.confirmed_count += 1;
        }

        if contributes(event, reversed) {
            accumulate(&mut totals.gross_sum, event.gross_amount, &mut totals.overflow);
            accumulate(&mut totals.net_sum, event.net_amount, &mut totals.overflow);
        }

        if classify(event).is_fee_charge {
            accumulate(&mut totals.fee_sum, event.fee_amount, &mut totals.overflow);
            if let Some(fiat) = event.fee_fiat_amount {
                accumulate(&mut totals.fee_fiat_sum, fiat, &mut totals.overflow);
            }
            let non_chf = event
                .fee_fiat_currency
                .as_deref()
                .map(str::trim)
                .filter(|code| !code.is_empty())
                .map_or(false, |code| !code.eq_ignore_ascii_case("CHF"));
            if non_chf {
                totals.fee_fiat_currency = FeeFiatCurrency::Mixed;
            }
        }
    }

    totals.gross_sum = canonical(totals.gross_sum);
    totals.fee_sum = canonical(totals.fee_sum);
    totals.net_sum = canonical(totals.net_sum);
    totals.fee_fiat_sum = canonical(totals.fee_fiat_sum);
    totals
}

fn accumulate(sum: &mut Decimal, value: Decimal, overflow: &mut bool) {
    *sum = match exact_add(*sum, value) {
        Some(next) => next,
        None => {
            *overflow = true;
            sum.saturating_add(value)
        }
    };
}

/// Totals per UTC day over final-confirmed rows, ascending
///
/// Rows with an unparsable `createdAt` are left out of the grouping only;
/// they still count in [`compute_totals`].
pub fn compute_by_day_confirmed(
    events: &[LedgerEvent],
    reversed: &HashSet<String>,
) -> Vec<DayRollup> {
    let mut groups: BTreeMap<NaiveDate, Vec<&LedgerEvent>> = BTreeMap::new();

    for event in events.iter().filter(|e| is_final_confirmed(e, reversed)) {
        if let Some(at) = event.created_at_utc() {
            groups.entry(at.date_naive()).or_default().push(event);
        }
    }

    groups
        .into_iter()
        .map(|(day, rows)| DayRollup {
            day,
            totals: compute_totals(rows.iter().copied(), reversed),
        })
        .collect()
}

/// Totals per (currency, network) over final-confirmed rows, ordered by key
pub fn compute_by_asset_confirmed(
    events: &[LedgerEvent],
    reversed: &HashSet<String>,
) -> Vec<AssetRollup> {
    let mut groups: BTreeMap<(String, String), Vec<&LedgerEvent>> = BTreeMap::new();

    for event in events.iter().filter(|e| is_final_confirmed(e, reversed)) {
        let key = (
            event.currency.trim().to_string(),
            event.network.trim().to_string(),
        );
        groups.entry(key).or_default().push(event);
    }

    groups
        .into_iter()
        .map(|((currency, network), rows)| AssetRollup {
            currency,
            network,
            totals: compute_totals(rows.iter().copied(), reversed),
        })
        .collect()
}

/// Summary of `fee_charged` rows
pub fn compute_fee_summary(events: &[LedgerEvent]) -> FeeSummary {
    let fee_rows: Vec<&LedgerEvent> = events
        .iter()
        .filter(|e| classify(e).is_fee_charge)
        .collect();
    let totals = compute_totals(fee_rows.iter().copied(), &HashSet::new());

    FeeSummary {
        fee_count: fee_rows.len() as u64,
        fee_sum: totals.fee_sum,
        fee_fiat_sum: totals.fee_fiat_sum,
        fee_fiat_currency: totals.fee_fiat_currency,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finality::reversed_invoice_ids;
    use crate::types::EventType;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn confirmed(id: &str, gross: &str, fee: &str, net: &str, at: &str) -> LedgerEvent {
        LedgerEvent::new(id, EventType::Confirmed)
            .with_amounts(dec(gross), dec(fee), dec(net))
            .at(at)
    }

    fn fee(id: &str, amount: &str, fiat: Option<(&str, &str)>) -> LedgerEvent {
        let mut event = LedgerEvent::new(id, EventType::FeeCharged)
            .with_amounts(Decimal::ZERO, dec(amount), Decimal::ZERO)
            .at("2024-03-01T09:00:00Z");
        if let Some((value, code)) = fiat {
            event.fee_fiat_amount = Some(dec(value));
            event.fee_fiat_currency = Some(code.to_string());
        }
        event
    }

    #[test]
    fn test_fee_isolation() {
        let events = vec![
            confirmed("INV1", "100", "2.5", "97.5", "2024-03-01T10:00:00Z"),
            fee("INV1", "1.25", None),
        ];
        let totals = compute_totals(&events, &reversed_invoice_ids(&events));

        assert_eq!(totals.confirmed_count, 1);
        assert_eq!(totals.fee_sum, dec("1.25"));
        assert_eq!(totals.gross_sum, dec("100"));
        assert_eq!(totals.net_sum, dec("97.5"));
    }

    #[test]
    fn test_reversed_rows_excluded() {
        let events = vec![
            confirmed("INV1", "100", "0", "100", "2024-03-01T10:00:00Z"),
            LedgerEvent::new("INV1", EventType::ConfirmedReversed)
                .with_amounts(dec("100"), Decimal::ZERO, dec("100"))
                .at("2024-03-02T10:00:00Z"),
        ];
        let totals = compute_totals(&events, &reversed_invoice_ids(&events));

        assert_eq!(totals.confirmed_count, 0);
        assert!(totals.gross_sum.is_zero());
        assert!(totals.net_sum.is_zero());
    }

    #[test]
    fn test_fallback_value_movement_not_counted() {
        let events = vec![LedgerEvent::new("INV9", "payout.settled")
            .with_amounts(dec("10.10"), Decimal::ZERO, dec("10.10"))];
        let totals = compute_totals(&events, &HashSet::new());

        assert_eq!(totals.confirmed_count, 0);
        assert_eq!(totals.gross_sum.to_string(), "10.1");
    }

    #[test]
    fn test_fee_fiat_currency() {
        let none: Vec<LedgerEvent> = vec![];
        assert_eq!(
            compute_totals(&none, &HashSet::new()).fee_fiat_currency,
            FeeFiatCurrency::Chf
        );

        let chf = vec![fee("A", "1", Some(("0.9", "chf"))), fee("B", "1", None)];
        let totals = compute_totals(&chf, &HashSet::new());
        assert_eq!(totals.fee_fiat_currency, FeeFiatCurrency::Chf);
        assert_eq!(totals.fee_fiat_sum, dec("0.9"));

        let mixed = vec![fee("A", "1", Some(("0.9", "CHF"))), fee("B", "1", Some(("1.1", "EUR")))];
        assert_eq!(
            compute_totals(&mixed, &HashSet::new()).fee_fiat_currency,
            FeeFiatCurrency::Mixed
        );
    }

    #[test]
    fn test_by_day_drops_unparsable_dates_only() {
        let events = vec![
            confirmed("INV1", "10", "0", "10", "2024-03-01T23:59:59Z"),
            confirmed("INV2", "20", "0", "20", "2024-03-02T00:00:01Z"),
            confirmed("INV3", "30", "0", "30", "someday"),
        ];
        let reversed = reversed_invoice_ids(&events);

        let by_day = compute_by_day_confirmed(&events, &reversed);
        assert_eq!(by_day.len(), 2);
        assert_eq!(by_day[0].day, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(by_day[0].totals.gross_sum, dec("10"));
        assert_eq!(by_day[1].totals.confirmed_count, 1);

        assert_eq!(compute_totals(&events, &reversed).confirmed_count, 3);
    }

    #[test]
    fn test_by_day_skips_reversal_only_days() {
        let events = vec![
            confirmed("INV1", "10", "0", "10", "2024-03-01T10:00:00Z"),
            LedgerEvent::new("INV1", EventType::ConfirmedReversed).at("2024-03-04T10:00:00Z"),
        ];
        let by_day = compute_by_day_confirmed(&events, &reversed_invoice_ids(&events));
        assert!(by_day.is_empty());
    }

    #[test]
    fn test_by_asset_groups() {
        let events = vec![
            confirmed("INV1", "10", "0", "10", "2024-03-01T10:00:00Z").on("USDT", "TRON"),
            confirmed("INV2", "5.5", "0", "5.5", "2024-03-01T11:00:00Z").on("USDT", "TRON"),
            confirmed("INV3", "1", "0", "1", "2024-03-01T12:00:00Z").on("USDT", "ETH"),
        ];
        let by_asset = compute_by_asset_confirmed(&events, &HashSet::new());

        assert_eq!(by_asset.len(), 2);
        assert_eq!(by_asset[0].network, "ETH");
        assert_eq!(by_asset[1].totals.gross_sum, dec("15.5"));
        assert_eq!(by_asset[1].totals.confirmed_count, 2);
    }

    #[test]
    fn test_rollups_ignore_unconfirmed_rows() {
        let events = vec![
            fee("INV1", "7", None)
                .with_amounts(dec("7"), dec("7"), Decimal::ZERO)
                .at("2024-03-05T10:00:00Z")
                .on("USDT", "TRON"),
            LedgerEvent::new("INV2", "payout.settled")
                .with_amounts(dec("50"), Decimal::ZERO, dec("50"))
                .at("2024-03-06T10:00:00Z")
                .on("BTC", "BTC"),
        ];
        let reversed = reversed_invoice_ids(&events);

        assert!(compute_by_day_confirmed(&events, &reversed).is_empty());
        assert!(compute_by_asset_confirmed(&events, &reversed).is_empty());

        // Window totals still carry both rows
        assert_eq!(compute_totals(&events, &reversed).gross_sum, dec("57"));
    }

    #[test]
    fn test_rollup_sums_only_confirmed_rows() {
        let events = vec![
            confirmed("INV1", "10", "0", "10", "2024-03-05T08:00:00Z").on("USDT", "TRON"),
            fee("INV1", "7", None)
                .with_amounts(dec("7"), dec("7"), Decimal::ZERO)
                .at("2024-03-05T09:00:00Z")
                .on("USDT", "TRON"),
        ];
        let reversed = reversed_invoice_ids(&events);

        let by_day = compute_by_day_confirmed(&events, &reversed);
        assert_eq!(by_day.len(), 1);
        assert_eq!(by_day[0].totals.gross_sum, dec("10"));
        assert!(by_day[0].totals.fee_sum.is_zero());

        let by_asset = compute_by_asset_confirmed(&events, &reversed);
        assert_eq!(by_asset.len(), 1);
        assert_eq!(by_asset[0].totals.gross_sum, dec("10"));
    }

    #[test]
    fn test_totals_flag_overflow() {
        let events = vec![
            confirmed("INV1", "79228162514264337593543950335", "0", "1", "2024-03-01T10:00:00Z"),
            confirmed("INV2", "1", "0", "1", "2024-03-01T11:00:00Z"),
        ];
        let totals = compute_totals(&events, &HashSet::new());

        assert!(totals.overflow);
        assert_eq!(totals.gross_sum, Decimal::MAX);
        assert_eq!(totals.net_sum, dec("2"));

        let fine = compute_totals(&events[1..], &HashSet::new());
        assert!(!fine.overflow);
    }

    #[test]
    fn test_fee_summary() {
        let events = vec![
            confirmed("INV1", "100", "3", "97", "2024-03-01T10:00:00Z"),
            fee("INV1", "0.5", Some(("0.45", "CHF"))),
            fee("INV2", "0.25", Some(("0.2", "CHF"))),
        ];
        let fees = compute_fee_summary(&events);

        assert_eq!(fees.fee_count, 2);
        assert_eq!(fees.fee_sum, dec("0.75"));
        assert_eq!(fees.fee_fiat_sum, dec("0.65"));
    }
}
