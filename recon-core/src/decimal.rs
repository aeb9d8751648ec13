//! Exact decimal arithmetic for money fields
//!
//! Amounts arrive as JSON strings or JSON numbers. Both are parsed straight
//! into [`Decimal`], so no value ever passes through binary floating point
//! inside the engine. Unparsable input becomes zero.
//!
//! [`Decimal`] holds 28 significant digits within ±7.9e28. Input outside
//! that envelope is never coerced silently: [`read_amount`] reports it as
//! [`AmountRead::Rounded`] or [`AmountRead::OutOfRange`], and sums that do
//! not fit fail [`exact_add`].
//!
//! Display strings are canonical: no exponent notation, no superfluous
//! leading or trailing zeros, and never `-0`.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer};
use serde_json::{Number, Value};
use std::str::FromStr;
use thiserror::Error;

/// Fractional digits kept by [`normalize_decimal_str`]
pub const NORMALIZE_SCALE: u32 = 12;

/// Tolerance for money comparisons between independent rounding paths (1e-6)
pub fn money_epsilon() -> Decimal {
    Decimal::new(1, 6)
}

/// Amount that cannot be represented exactly
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountError {
    /// Magnitude beyond the decimal range
    #[error("amount outside the representable range")]
    OutOfRange,

    /// More significant digits than the decimal type holds
    #[error("amount has more than 28 significant digits")]
    PrecisionLoss,
}

/// Outcome of reading an amount from the wire
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AmountRead {
    /// Parsed without loss
    Exact(Decimal),
    /// Numeric, but rounded to 28 significant digits
    Rounded(Decimal),
    /// Numeric, but beyond the decimal range
    OutOfRange,
    /// Missing or not a number
    #[default]
    Invalid,
}

impl AmountRead {
    /// Value used in totals (zero when out of range or invalid)
    pub fn value(self) -> Decimal {
        match self {
            AmountRead::Exact(v) | AmountRead::Rounded(v) => v,
            AmountRead::OutOfRange | AmountRead::Invalid => Decimal::ZERO,
        }
    }

    /// Whether a numeric input lost information
    pub fn is_lossy(self) -> bool {
        matches!(self, AmountRead::Rounded(_) | AmountRead::OutOfRange)
    }

    /// Exact value; invalid input counts as zero
    pub fn exact(self) -> Result<Decimal, AmountError> {
        match self {
            AmountRead::Exact(v) => Ok(v),
            AmountRead::Invalid => Ok(Decimal::ZERO),
            AmountRead::Rounded(_) => Err(AmountError::PrecisionLoss),
            AmountRead::OutOfRange => Err(AmountError::OutOfRange),
        }
    }

    fn numeric(self) -> Option<Decimal> {
        match self {
            AmountRead::Exact(v) | AmountRead::Rounded(v) => Some(v),
            AmountRead::OutOfRange | AmountRead::Invalid => None,
        }
    }
}

/// Read an amount in plain or scientific notation
pub fn read_amount(raw: &str) -> AmountRead {
    let literal = match numeric_literal(raw.trim()) {
        Some(literal) => literal,
        None => return AmountRead::Invalid,
    };

    let parsed = if literal.contains('e') {
        Decimal::from_scientific(&literal)
    } else {
        Decimal::from_str(&literal)
    };

    match parsed {
        Ok(value) if significant_digits(&literal) == significant_digits(&value.to_string()) => {
            AmountRead::Exact(value)
        }
        Ok(value) => AmountRead::Rounded(value),
        Err(_) => AmountRead::OutOfRange,
    }
}

/// Read an amount from a JSON value (string or number)
pub fn amount_from_value(value: &Value) -> AmountRead {
    match value {
        Value::String(s) => read_amount(s),
        Value::Number(n) => number_to_amount(n),
        _ => AmountRead::Invalid,
    }
}

fn number_to_amount(n: &Number) -> AmountRead {
    if let Some(i) = n.as_i64() {
        return AmountRead::Exact(Decimal::from(i));
    }
    if let Some(u) = n.as_u64() {
        return AmountRead::Exact(Decimal::from(u));
    }
    // f64 Display is the shortest round-trip form and never uses an exponent
    match n.as_f64() {
        Some(f) => read_amount(&f.to_string()),
        None => AmountRead::Invalid,
    }
}

/// Validate `[+-]digits[.digits][e[+-]digits]`; returns it without `+` and
/// with a lowercase exponent marker
fn numeric_literal(s: &str) -> Option<String> {
    let (negative, unsigned) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };

    let (mantissa, exponent) = match unsigned.find(&['e', 'E'][..]) {
        Some(i) => (&unsigned[..i], Some(&unsigned[i + 1..])),
        None => (unsigned, None),
    };

    let (int, frac) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if (int.is_empty() && frac.is_empty()) || !all_digits(int) || !all_digits(frac) {
        return None;
    }

    let mut literal = String::with_capacity(s.len());
    if negative {
        literal.push('-');
    }
    literal.push_str(mantissa);

    if let Some(exponent) = exponent {
        let (exp_negative, digits) = match exponent.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, exponent.strip_prefix('+').unwrap_or(exponent)),
        };
        if digits.is_empty() || !all_digits(digits) {
            return None;
        }
        literal.push('e');
        if exp_negative {
            literal.push('-');
        }
        literal.push_str(digits);
    }

    Some(literal)
}

/// Mantissa digits without leading or trailing zeros
fn significant_digits(literal: &str) -> String {
    let mantissa = literal.split('e').next().unwrap_or(literal);
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    digits
        .trim_start_matches('0')
        .trim_end_matches('0')
        .to_string()
}

/// Trim trailing zeros and fold `-0` into `0`
pub fn canonical(value: Decimal) -> Decimal {
    let normalized = value.normalize();
    if normalized.is_zero() {
        Decimal::ZERO
    } else {
        normalized
    }
}

/// Canonical display string
pub fn to_canonical_string(value: Decimal) -> String {
    canonical(value).to_string()
}

/// Exact sum, `None` when the result does not fit without rounding
///
/// Both operands are scaled to the larger fractional length and added as
/// integers.
pub fn exact_add(a: Decimal, b: Decimal) -> Option<Decimal> {
    let scale = a.scale().max(b.scale());
    let sum = rescaled_mantissa(a, scale)?.checked_add(rescaled_mantissa(b, scale)?)?;
    Decimal::try_from_i128_with_scale(sum, scale).ok()
}

fn rescaled_mantissa(value: Decimal, scale: u32) -> Option<i128> {
    10i128
        .checked_pow(scale - value.scale())?
        .checked_mul(value.mantissa())
}

/// Exact base-10 sum of two decimal strings in canonical form
///
/// Unparsable operands count as zero. Operands or sums beyond 28
/// significant digits are an error rather than a rounded result.
pub fn add_decimal_str(a: &str, b: &str) -> Result<String, AmountError> {
    let lhs = read_amount(a).exact()?;
    let rhs = read_amount(b).exact()?;
    exact_add(lhs, rhs)
        .map(to_canonical_string)
        .ok_or(AmountError::OutOfRange)
}

/// Collapse float noise: truncate to 12 fractional digits, then trim zeros
///
/// `"478.46000000000004"` → `"478.46"`. Truncation happens on the text, so
/// long noise tails never count as precision loss.
pub fn normalize_decimal_str(raw: &str) -> Result<String, AmountError> {
    let truncated = truncate_fraction(raw.trim(), NORMALIZE_SCALE as usize);
    let value = read_amount(truncated).exact()?;
    Ok(to_canonical_string(value.round_dp_with_strategy(
        NORMALIZE_SCALE,
        RoundingStrategy::ToZero,
    )))
}

fn truncate_fraction(s: &str, digits: usize) -> &str {
    if s.contains(&['e', 'E'][..]) {
        return s;
    }
    match s.find('.') {
        Some(dot) if s.len() > dot + 1 + digits && s[dot + 1..].bytes().all(|b| b.is_ascii_digit()) => {
            &s[..dot + 1 + digits]
        }
        _ => s,
    }
}

/// `|a - b| <= eps`; false if the difference is not representable
pub fn nearly_equal(a: Decimal, b: Decimal, eps: Decimal) -> bool {
    match a.checked_sub(b) {
        Some(diff) => diff.abs() <= eps,
        None => false,
    }
}

/// [`nearly_equal`] over raw strings
///
/// Falls back to equality of the trimmed strings when either side is not
/// numeric.
pub fn nearly_equal_str(a: &str, b: &str, eps: Decimal) -> bool {
    match (read_amount(a).numeric(), read_amount(b).numeric()) {
        (Some(x), Some(y)) => nearly_equal(x, y, eps),
        _ => a.trim() == b.trim(),
    }
}

/// Serde: amount from string, number or null
pub fn deserialize_amount_read<'de, D>(deserializer: D) -> Result<AmountRead, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(amount_from_value(&value))
}

/// Serde: optional amount, `null` stays `None`
pub fn deserialize_optional_amount_read<'de, D>(
    deserializer: D,
) -> Result<Option<AmountRead>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => None,
        other => Some(amount_from_value(&other)),
    })
}

/// Serde: non-negative count from string or number (zero when unusable)
pub fn deserialize_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(amount_from_value(&value)
        .value()
        .trunc()
        .to_u64()
        .unwrap_or(0))
}
