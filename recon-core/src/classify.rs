//! Event classification
//!
//! Tags each event with the roles it can play in totals. Confirmation rows
//! only count through finality (see [`crate::finality`]), so they are never
//! value movement on their own.

use crate::types::{EventType, LedgerEvent};
use rust_decimal::Decimal;

/// Roles an event can play in aggregation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Classification {
    /// `invoice.confirmed`
    pub is_confirmed: bool,
    /// `invoice.confirmed_reversed`
    pub is_reversed: bool,
    /// `fee_charged`
    pub is_fee_charge: bool,
    /// Contributes to gross/net regardless of finality
    pub is_value_movement: bool,
}

/// Classify an event
pub fn classify(event: &LedgerEvent) -> Classification {
    match &event.event_type {
        EventType::Confirmed => Classification {
            is_confirmed: true,
            ..Default::default()
        },
        EventType::ConfirmedReversed => Classification {
            is_reversed: true,
            ..Default::default()
        },
        // Fees are booked from fee rows only, never derived from confirmations
        EventType::FeeCharged => Classification {
            is_fee_charge: true,
            is_value_movement: true,
            ..Default::default()
        },
        EventType::Other(_) => Classification {
            is_value_movement: moves_value(event),
            ..Default::default()
        },
    }
}

/// Fallback for types not enumerated yet: any positive amount moves value
fn moves_value(event: &LedgerEvent) -> bool {
    event.gross_amount > Decimal::ZERO
        || event.fee_amount > Decimal::ZERO
        || event.net_amount > Decimal::ZERO
}
