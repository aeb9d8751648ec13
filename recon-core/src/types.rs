//! Core types for the reconciliation engine
//!
//! Wire shapes use camelCase field names. Numeric fields accept strings or
//! numbers and never fail to decode (see [`crate::decimal`]).

use crate::decimal::{
    deserialize_amount_read, deserialize_count, deserialize_optional_amount_read, AmountRead,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Event type literal for a confirmed invoice
pub const CONFIRMED: &str = "invoice.confirmed";
/// Event type literal for a reversed confirmation
pub const CONFIRMED_REVERSED: &str = "invoice.confirmed_reversed";
/// Event type literal for a fee charge
pub const FEE_CHARGED: &str = "fee_charged";

/// Ledger event type
///
/// Known literals map to dedicated variants; everything else is kept verbatim
/// in [`EventType::Other`] so new types stay visible to the fallback rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    /// `invoice.confirmed`
    Confirmed,
    /// `invoice.confirmed_reversed`
    ConfirmedReversed,
    /// `fee_charged`
    FeeCharged,
    /// Any other literal
    Other(String),
}

impl EventType {
    /// Wire literal
    pub fn as_str(&self) -> &str {
        match self {
            EventType::Confirmed => CONFIRMED,
            EventType::ConfirmedReversed => CONFIRMED_REVERSED,
            EventType::FeeCharged => FEE_CHARGED,
            EventType::Other(s) => s,
        }
    }
}

impl From<String> for EventType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            CONFIRMED => EventType::Confirmed,
            CONFIRMED_REVERSED => EventType::ConfirmedReversed,
            FEE_CHARGED => EventType::FeeCharged,
            _ => EventType::Other(raw),
        }
    }
}

impl From<&str> for EventType {
    fn from(raw: &str) -> Self {
        EventType::from(raw.to_string())
    }
}

impl From<EventType> for String {
    fn from(event_type: EventType) -> Self {
        match event_type {
            EventType::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl Default for EventType {
    fn default() -> Self {
        EventType::Other(String::new())
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Valuation schema an event was recorded under
///
/// Rows written before the FX valuation migration carry `legacy_fx`; their
/// gross values may legitimately drift from a summary computed today.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuationSchema {
    /// Current valuation rules
    #[default]
    Current,
    /// Pre-migration FX valuation
    LegacyFx,
}

/// Ledger event (also the shape of synthesized pipeline rows)
///
/// Decoding goes through [`WireEvent`], which tolerates odd field types and
/// flags amounts that did not fit a [`Decimal`] exactly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "WireEvent")]
pub struct LedgerEvent {
    /// Invoice this event belongs to (may be empty)
    pub invoice_id: String,

    /// Event type
    pub event_type: EventType,

    /// Gross amount
    pub gross_amount: Decimal,

    /// Fee amount
    pub fee_amount: Decimal,

    /// Net amount
    pub net_amount: Decimal,

    /// Asset / currency code
    pub currency: String,

    /// Settlement network
    pub network: String,

    /// Deposit address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deposit_address: Option<String>,

    /// Sender address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_address: Option<String>,

    /// On-chain transaction hash
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,

    /// Creation time (ISO 8601, kept raw)
    pub created_at: String,

    /// Merchant the event belongs to
    pub merchant_id: String,

    /// FX pair used for valuation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fx_pair: Option<String>,

    /// Fee converted to fiat
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_fiat_amount: Option<Decimal>,

    /// Fiat currency of `fee_fiat_amount`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_fiat_currency: Option<String>,

    /// Valuation schema
    pub valuation_schema: ValuationSchema,

    /// Compliance decision
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,

    /// AML status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aml_status: Option<String>,

    /// An amount was rounded or out of range when decoded
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub lossy_amounts: bool,
}

/// Raw decoding shape of [`LedgerEvent`]
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEvent {
    #[serde(default, deserialize_with = "lenient_string")]
    invoice_id: String,
    #[serde(default, deserialize_with = "lenient_event_type")]
    event_type: EventType,
    #[serde(default, deserialize_with = "deserialize_amount_read")]
    gross_amount: AmountRead,
    #[serde(default, deserialize_with = "deserialize_amount_read")]
    fee_amount: AmountRead,
    #[serde(default, deserialize_with = "deserialize_amount_read")]
    net_amount: AmountRead,
    #[serde(default, deserialize_with = "lenient_string")]
    currency: String,
    #[serde(default, deserialize_with = "lenient_string")]
    network: String,
    #[serde(default, deserialize_with = "lenient_optional_string")]
    deposit_address: Option<String>,
    #[serde(default, deserialize_with = "lenient_optional_string")]
    sender_address: Option<String>,
    #[serde(default, deserialize_with = "lenient_optional_string")]
    tx_hash: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    created_at: String,
    #[serde(default, deserialize_with = "lenient_string")]
    merchant_id: String,
    #[serde(default, deserialize_with = "lenient_optional_string")]
    fx_pair: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_amount_read")]
    fee_fiat_amount: Option<AmountRead>,
    #[serde(default, deserialize_with = "lenient_optional_string")]
    fee_fiat_currency: Option<String>,
    #[serde(default, deserialize_with = "lenient_valuation_schema")]
    valuation_schema: ValuationSchema,
    #[serde(default, deserialize_with = "lenient_optional_string")]
    decision: Option<String>,
    #[serde(default, deserialize_with = "lenient_optional_string")]
    aml_status: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    lossy_amounts: bool,
}

impl From<WireEvent> for LedgerEvent {
    fn from(wire: WireEvent) -> Self {
        let lossy_amounts = wire.lossy_amounts
            || wire.gross_amount.is_lossy()
            || wire.fee_amount.is_lossy()
            || wire.net_amount.is_lossy()
            || wire.fee_fiat_amount.is_some_and(AmountRead::is_lossy);

        Self {
            invoice_id: wire.invoice_id,
            event_type: wire.event_type,
            gross_amount: wire.gross_amount.value(),
            fee_amount: wire.fee_amount.value(),
            net_amount: wire.net_amount.value(),
            currency: wire.currency,
            network: wire.network,
            deposit_address: wire.deposit_address,
            sender_address: wire.sender_address,
            tx_hash: wire.tx_hash,
            created_at: wire.created_at,
            merchant_id: wire.merchant_id,
            fx_pair: wire.fx_pair,
            fee_fiat_amount: wire.fee_fiat_amount.map(AmountRead::value),
            fee_fiat_currency: wire.fee_fiat_currency,
            valuation_schema: wire.valuation_schema,
            decision: wire.decision,
            aml_status: wire.aml_status,
            lossy_amounts,
        }
    }
}

impl LedgerEvent {
    /// Create event with the given invoice id and type
    pub fn new(invoice_id: impl Into<String>, event_type: impl Into<EventType>) -> Self {
        Self {
            invoice_id: invoice_id.into(),
            event_type: event_type.into(),
            ..Default::default()
        }
    }

    /// Set gross/fee/net amounts
    pub fn with_amounts(mut self, gross: Decimal, fee: Decimal, net: Decimal) -> Self {
        self.gross_amount = gross;
        self.fee_amount = fee;
        self.net_amount = net;
        self
    }

    /// Set creation timestamp
    pub fn at(mut self, created_at: impl Into<String>) -> Self {
        self.created_at = created_at.into();
        self
    }

    /// Set currency and network
    pub fn on(mut self, currency: impl Into<String>, network: impl Into<String>) -> Self {
        self.currency = currency.into();
        self.network = network.into();
        self
    }

    /// Parsed creation time, `None` if unparsable
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        crate::merge::parse_timestamp(&self.created_at)
    }
}

/// Externally supplied summary for a merchant window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "WireSummary")]
pub struct ExternalSummary {
    /// Confirmed invoice count
    pub confirmed_count: u64,

    /// Gross sum
    pub gross_sum: Decimal,

    /// Fee sum (zero means "not provided")
    pub fee_sum: Decimal,

    /// Net sum
    pub net_sum: Decimal,

    /// Fee sum in fiat
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_fiat_sum: Option<Decimal>,

    /// Fiat currency of `fee_fiat_sum`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_fiat_currency: Option<String>,

    /// A sum was rounded or out of range when decoded
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub lossy_amounts: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSummary {
    #[serde(default, deserialize_with = "deserialize_count")]
    confirmed_count: u64,
    #[serde(default, deserialize_with = "deserialize_amount_read")]
    gross_sum: AmountRead,
    #[serde(default, deserialize_with = "deserialize_amount_read")]
    fee_sum: AmountRead,
    #[serde(default, deserialize_with = "deserialize_amount_read")]
    net_sum: AmountRead,
    #[serde(default, deserialize_with = "deserialize_optional_amount_read")]
    fee_fiat_sum: Option<AmountRead>,
    #[serde(default, deserialize_with = "lenient_optional_string")]
    fee_fiat_currency: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    lossy_amounts: bool,
}

impl From<WireSummary> for ExternalSummary {
    fn from(wire: WireSummary) -> Self {
        let lossy_amounts = wire.lossy_amounts
            || wire.gross_sum.is_lossy()
            || wire.fee_sum.is_lossy()
            || wire.net_sum.is_lossy()
            || wire.fee_fiat_sum.is_some_and(AmountRead::is_lossy);

        Self {
            confirmed_count: wire.confirmed_count,
            gross_sum: wire.gross_sum.value(),
            fee_sum: wire.fee_sum.value(),
            net_sum: wire.net_sum.value(),
            fee_fiat_sum: wire.fee_fiat_sum.map(AmountRead::value),
            fee_fiat_currency: wire.fee_fiat_currency,
            lossy_amounts,
        }
    }
}

/// Merchant window the sources were scoped to
///
/// `limit` bounds the caller's fetch only; the engine never looks at it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowParams {
    /// Merchant id (empty = any)
    #[serde(default)]
    pub merchant_id: String,

    /// Inclusive lower bound (ISO date or datetime, empty = open)
    #[serde(default)]
    pub from: String,

    /// Inclusive upper bound (ISO date or datetime, empty = open)
    #[serde(default)]
    pub to: String,

    /// Fetch bound
    #[serde(default)]
    pub limit: Option<usize>,
}

impl WindowParams {
    /// Window for a merchant with open bounds
    pub fn for_merchant(merchant_id: impl Into<String>) -> Self {
        Self {
            merchant_id: merchant_id.into(),
            ..Default::default()
        }
    }

    /// Whether an event falls inside the window
    ///
    /// Events with an unparsable `createdAt`, or bounds that fail to parse,
    /// are kept: they are dropped only from day grouping downstream.
    pub fn contains(&self, event: &LedgerEvent) -> bool {
        if !self.merchant_id.is_empty()
            && !event.merchant_id.is_empty()
            && self.merchant_id != event.merchant_id
        {
            return false;
        }

        let at = match event.created_at_utc() {
            Some(at) => at,
            None => return true,
        };

        if let Some(from) = bound(&self.from, false) {
            if at < from {
                return false;
            }
        }
        if let Some(to) = bound(&self.to, true) {
            if at > to {
                return false;
            }
        }
        true
    }
}

/// Bare dates as upper bounds cover the whole day
fn bound(raw: &str, upper: bool) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if upper {
        if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return day.and_hms_milli_opt(23, 59, 59, 999).map(|dt| dt.and_utc());
        }
    }
    crate::merge::parse_timestamp(raw)
}

/// Issue severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational drift
    Low,
    /// Degraded but usable
    Medium,
    /// Needs operator attention
    High,
    /// Totals cannot be trusted
    Critical,
}

impl Severity {
    /// Numeric rank (critical=4 … low=1)
    pub fn rank(self) -> u8 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
            Severity::Critical => 4,
        }
    }
}

/// Reconciliation issue type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    /// No external summary was supplied
    SummaryNotAvailable,
    /// Confirmed counts differ
    CountMismatch,
    /// Gross sums differ
    GrossMismatch,
    /// Fee sums differ
    FeeMismatch,
    /// Net sums differ
    NetMismatch,
    /// Fiat fee sums or currencies differ
    FeeFiatMismatch,
    /// Amounts did not fit the decimal type exactly
    AmountPrecisionLoss,
}

impl IssueType {
    /// Wire name
    pub fn as_str(self) -> &'static str {
        match self {
            IssueType::SummaryNotAvailable => "summary_not_available",
            IssueType::CountMismatch => "count_mismatch",
            IssueType::GrossMismatch => "gross_mismatch",
            IssueType::FeeMismatch => "fee_mismatch",
            IssueType::NetMismatch => "net_mismatch",
            IssueType::FeeFiatMismatch => "fee_fiat_mismatch",
            IssueType::AmountPrecisionLoss => "amount_precision_loss",
        }
    }

    /// Whether this is one of the `*_mismatch` types
    pub fn is_mismatch(self) -> bool {
        !matches!(
            self,
            IssueType::SummaryNotAvailable | IssueType::AmountPrecisionLoss
        )
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A discrepancy found by the comparator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationIssue {
    /// Issue type
    #[serde(rename = "type")]
    pub issue_type: IssueType,

    /// Severity
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Triage data (deltas, hints)
    #[serde(default)]
    pub meta: BTreeMap<String, serde_json::Value>,
}

impl ReconciliationIssue {
    /// Create issue without meta
    pub fn new(issue_type: IssueType, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            issue_type,
            severity,
            message: message.into(),
            meta: BTreeMap::new(),
        }
    }

    /// Attach a meta entry
    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }
}

/// Overall reconciliation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UiState {
    /// Totals reconciled
    Ok,
    /// Degraded or minor drift
    Warn,
    /// Totals disagree
    Error,
}

/// Remediation suggested to the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Inspect the locally computed summary JSON
    OpenSummaryJson,
    /// Inspect the merged entries JSON
    OpenEntriesJson,
    /// Re-derive ledger rows for the window
    TriggerBackfill,
    /// Refresh the view
    Reload,
}

/// Status block for the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiStatus {
    /// Overall status
    pub status: UiState,
    /// One-line headline
    pub headline: String,
    /// Explanation
    pub subline: String,
    /// Suggested remediation
    pub action: SuggestedAction,
}

/// Accept strings, numbers and null for free-text fields
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn lenient_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

/// Unknown or missing schema tags read as [`ValuationSchema::Current`]
fn lenient_valuation_schema<'de, D>(deserializer: D) -> Result<ValuationSchema, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = lenient_string(deserializer)?;
    Ok(match raw.trim() {
        "legacy_fx" => ValuationSchema::LegacyFx,
        _ => ValuationSchema::Current,
    })
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(matches!(value, serde_json::Value::Bool(true)))
}

fn lenient_event_type<'de, D>(deserializer: D) -> Result<EventType, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_string(deserializer).map(EventType::from)
}
