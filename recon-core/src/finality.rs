//! Finality of confirmations
//!
//! A single `invoice.confirmed_reversed` voids every confirmation of that
//! invoice id in the evaluated window, regardless of arrival order. Reversal
//! is keyed by id only, never by timestamp sequencing.
//!
//! Confirm → reverse → re-confirm is treated as permanently voided. Whether a
//! later re-confirmation should count again is unresolved upstream; do not
//! switch to "most recent event wins" without confirming intent.

use crate::classify::classify;
use crate::types::LedgerEvent;
use std::collections::HashSet;

/// Invoice ids carrying at least one reversal
pub fn reversed_invoice_ids(events: &[LedgerEvent]) -> HashSet<String> {
    events
        .iter()
        .filter(|e| classify(e).is_reversed && !e.invoice_id.is_empty())
        .map(|e| e.invoice_id.clone())
        .collect()
}

/// Whether a confirmation still counts after reversals
///
/// A confirmation without an invoice id cannot be targeted by a reversal and
/// is trusted as final.
pub fn is_final_confirmed(event: &LedgerEvent, reversed: &HashSet<String>) -> bool {
    classify(event).is_confirmed
        && (event.invoice_id.is_empty() || !reversed.contains(&event.invoice_id))
}
