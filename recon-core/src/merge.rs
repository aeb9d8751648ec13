//! Ledger / pipeline merge
//!
//! The ledger is authoritative; the pipeline is synthesized from current
//! invoice state and only fills gaps.
//!
//! # Rules
//!
//! - Key: `(invoiceId, eventType)` when both the invoice id and the event
//!   type are non-empty, otherwise `(eventType, createdAt)`
//! - Every ledger row is kept
//! - A pipeline row is kept only if no ledger row (or earlier pipeline row)
//!   shares its key
//! - Output is sorted newest first; unparsable timestamps sort as epoch 0
//!
//! Merging is idempotent but not commutative: precedence is never a recency
//! tie-break.

use crate::types::{EventType, LedgerEvent};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::HashSet;

/// Deduplication key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    /// Invoice id + event type
    Invoice(String, EventType),
    /// Event type + raw creation time
    Timeline(EventType, String),
}

/// Compute the dedup key of an event
pub fn dedup_key(event: &LedgerEvent) -> DedupKey {
    if !event.invoice_id.is_empty() && !event.event_type.as_str().is_empty() {
        DedupKey::Invoice(event.invoice_id.clone(), event.event_type.clone())
    } else {
        DedupKey::Timeline(event.event_type.clone(), event.created_at.clone())
    }
}

/// Merge ledger and pipeline rows into one canonical list
pub fn merge_sources(ledger: &[LedgerEvent], pipeline: &[LedgerEvent]) -> Vec<LedgerEvent> {
    let mut seen: HashSet<DedupKey> = ledger.iter().map(dedup_key).collect();
    let mut merged: Vec<LedgerEvent> = ledger.to_vec();

    for event in pipeline {
        if seen.insert(dedup_key(event)) {
            merged.push(event.clone());
        }
    }

    sort_newest_first(&mut merged);
    merged
}

/// Stable sort by `createdAt` descending
pub fn sort_newest_first(events: &mut [LedgerEvent]) {
    events.sort_by_cached_key(|e| std::cmp::Reverse(sort_millis(e)));
}

fn sort_millis(event: &LedgerEvent) -> i64 {
    event
        .created_at_utc()
        .map(|at| at.timestamp_millis())
        .unwrap_or(0)
}

/// Parse an ISO timestamp
///
/// Accepts RFC 3339, naive `YYYY-MM-DDTHH:MM:SS[.f]` (read as UTC) and bare
/// `YYYY-MM-DD` (UTC midnight).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
