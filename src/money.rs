//! Money Arithmetic Module
//!
//! Every reserve, trade amount, fee and price in the engine is a
//! `bigdecimal::BigDecimal`. All parsing, division and formatting MUST go
//! through this module so that there is exactly one precision policy.
//!
//! ## Why not native integers or floats
//! Virtual reserves are scaled by 10^18 (wei-style units) and their product
//! is ~10^50, far beyond `u128` and beyond the 28 digits of `rust_decimal`.
//! Floating point collapses small trades against such reserves to zero.
//!
//! ## Precision
//! Additions, subtractions and multiplications are exact. Divisions are
//! rounded to a configurable number of significant digits (never below
//! [`MIN_PRECISION`]).
//!
//! ## Usage
//! ```rust
//! use curve_ledger::money::{parse_amount, div, DEFAULT_PRECISION};
//!
//! let usdt = parse_amount("1000e18").unwrap();
//! let half = div(&usdt, &parse_amount("2").unwrap(), DEFAULT_PRECISION).unwrap();
//! assert_eq!(half, parse_amount("500e18").unwrap());
//! ```

use bigdecimal::{BigDecimal, RoundingMode, Zero};
use std::str::FromStr;
use thiserror::Error;

/// Default number of significant digits kept by divisions.
pub const DEFAULT_PRECISION: u64 = 50;

/// Lowest precision the engine accepts from configuration.
pub const MIN_PRECISION: u64 = 40;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Amount must not be negative")]
    NegativeAmount,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Division by zero")]
    DivisionByZero,
}

// ============================================================================
// Parse: Client → Internal
// ============================================================================

/// Parse a strictly positive amount.
///
/// Accepts plain (`"0.5"`) and scientific (`"1000e18"`) notation. Explicit
/// signs are rejected so that `"-0"` or `"+5"` never reach the ledger.
pub fn parse_amount(amount_str: &str) -> Result<BigDecimal, MoneyError> {
    let value = parse_non_negative(amount_str)?;
    if value.is_zero() {
        return Err(MoneyError::InvalidAmount);
    }
    Ok(value)
}

/// Parse an amount that may be zero (reserves, balances).
pub fn parse_non_negative(amount_str: &str) -> Result<BigDecimal, MoneyError> {
    let amount_str = amount_str.trim();
    if amount_str.is_empty() {
        return Err(MoneyError::InvalidFormat("empty string".into()));
    }
    if amount_str.starts_with('-') {
        return Err(MoneyError::NegativeAmount);
    }
    if amount_str.starts_with('+') {
        return Err(MoneyError::InvalidFormat("explicit sign".into()));
    }

    BigDecimal::from_str(amount_str)
        .map_err(|e| MoneyError::InvalidFormat(format!("{}: {}", amount_str, e)))
}

// ============================================================================
// Arithmetic
// ============================================================================

/// `numerator / denominator`, rounded to `precision` significant digits.
pub fn div(
    numerator: &BigDecimal,
    denominator: &BigDecimal,
    precision: u64,
) -> Result<BigDecimal, MoneyError> {
    if denominator.is_zero() {
        return Err(MoneyError::DivisionByZero);
    }
    Ok((numerator / denominator).with_prec(precision.max(MIN_PRECISION)))
}

/// Like [`div`] but yields zero for a zero denominator.
pub fn div_or_zero(numerator: &BigDecimal, denominator: &BigDecimal, precision: u64) -> BigDecimal {
    div(numerator, denominator, precision).unwrap_or_else(|_| BigDecimal::zero())
}

/// `amount * percent / 100`
pub fn percent_of(amount: &BigDecimal, percent: &BigDecimal) -> BigDecimal {
    // dividing by 100 only moves the decimal point, so it stays exact
    (amount * percent) / BigDecimal::from(100)
}

/// Returns `(max(value, 0), was_clamped)`.
pub fn clamp_non_negative(value: BigDecimal) -> (BigDecimal, bool) {
    if value < BigDecimal::zero() {
        (BigDecimal::zero(), true)
    } else {
        (value, false)
    }
}

/// Clamp into `[lo, hi]`.
pub fn clamp(value: BigDecimal, lo: &BigDecimal, hi: &BigDecimal) -> BigDecimal {
    if &value < lo {
        lo.clone()
    } else if &value > hi {
        hi.clone()
    } else {
        value
    }
}

#[inline]
pub fn is_positive(value: &BigDecimal) -> bool {
    *value > BigDecimal::zero()
}

// ============================================================================
// Format: Internal → Client
// ============================================================================

/// Fixed-point display string with `display_decimals` fractional digits.
pub fn format_amount(value: &BigDecimal, display_decimals: i64) -> String {
    value
        .with_scale_round(display_decimals, RoundingMode::HalfEven)
        .to_string()
}
