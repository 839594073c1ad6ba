//! Amount Precision Module
//!
//! Every amount that reaches a ledger goes through this module first.
//!
//! ## Rules
//! 1. Amounts are truncated to the asset's precision, never rounded up.
//!    The platform must never send more than was requested.
//! 2. The rounding strategy is always an explicit argument. There is no
//!    process-wide decimal context.
//! 3. Fund-moving operations reject anything below one minimum unit
//!    (`10^-precision`) before a remote call is made.
//!
//! ## Usage
//! ```rust
//! use ledger_bridge::amount::{truncate, is_above_minimum};
//! use rust_decimal::Decimal;
//! use std::str::FromStr;
//!
//! let amount = truncate(Decimal::from_str("1.23456").unwrap(), 3);
//! assert_eq!(amount.to_string(), "1.234");
//! assert!(is_above_minimum(amount, 3));
//! ```

use rust_decimal::prelude::*;

use crate::error::LedgerError;

/// Truncation that can only move an amount down.
///
/// For the non-negative amounts handled here this is the same as rounding
/// toward zero; for negative inputs it still satisfies `normalize(a) <= a`.
pub const PAYER_SAFE: RoundingStrategy = RoundingStrategy::ToNegativeInfinity;

// ============================================================================
// Normalization
// ============================================================================

/// Reduce `amount` to at most `precision` fractional digits using `strategy`.
pub fn normalize(amount: Decimal, precision: u32, strategy: RoundingStrategy) -> Decimal {
    let mut value = amount.round_dp_with_strategy(precision, strategy);
    // Pad to the asset's scale so the value renders the way the ledger expects.
    value.rescale(precision);
    value
}

/// [`normalize`] with [`PAYER_SAFE`].
#[inline]
pub fn truncate(amount: Decimal, precision: u32) -> Decimal {
    normalize(amount, precision, PAYER_SAFE)
}

/// Smallest nonzero amount representable at `precision`.
///
/// Returns `None` when the precision is finer than `Decimal` can represent.
pub fn minimum_unit(precision: u32) -> Option<Decimal> {
    Decimal::try_new(1, precision).ok()
}

/// `false` iff `amount < 10^-precision`.
pub fn is_above_minimum(amount: Decimal, precision: u32) -> bool {
    match minimum_unit(precision) {
        Some(unit) => amount >= unit,
        None => amount > Decimal::ZERO,
    }
}

/// Truncate `amount` and reject it if nothing representable is left.
///
/// `context` names the operation for the error message, e.g. "issue".
pub fn checked_amount(
    amount: Decimal,
    precision: u32,
    symbol: &str,
    context: &str,
) -> Result<Decimal, LedgerError> {
    let normalized = truncate(amount, precision);
    if !is_above_minimum(normalized, precision) {
        return Err(LedgerError::Arithmetic(format!(
            "Failed to {} because {} is less than the minimum amount allowed for {} tokens",
            context, normalized, symbol
        )));
    }
    Ok(normalized)
}

// ============================================================================
// Base Units (integer encoding used on-chain)
// ============================================================================

/// Convert a decimal amount to integer base units (`amount * 10^precision`).
///
/// The amount is truncated first, so no fractional base unit survives.
pub fn to_base_units(amount: Decimal, precision: u32) -> Result<i64, LedgerError> {
    let factor = 10i64
        .checked_pow(precision)
        .ok_or_else(|| LedgerError::Arithmetic(format!("precision {} is too large", precision)))?;
    let units = truncate(amount, precision)
        .checked_mul(Decimal::from(factor))
        .ok_or_else(|| LedgerError::Arithmetic(format!("{} overflows base units", amount)))?;
    units
        .trunc()
        .to_i64()
        .ok_or_else(|| LedgerError::Arithmetic(format!("{} overflows base units", amount)))
}

/// Convert integer base units back into a decimal at `precision`.
pub fn from_base_units(units: i64, precision: u32) -> Result<Decimal, LedgerError> {
    Decimal::try_from_i128_with_scale(units as i128, precision).map_err(|_| {
        LedgerError::Arithmetic(format!(
            "{} base units at precision {} is not representable",
            units, precision
        ))
    })
}

/// Render an amount with exactly `precision` fractional digits.
///
/// Used for wire formats such as `"1.000 STEEM"` and sidechain quantities.
pub fn format_amount(amount: Decimal, precision: u32) -> String {
    truncate(amount, precision).to_string()
}

/// Parse a ledger asset string of the form `"12.345 SYMBOL"`.
pub fn parse_asset_string(value: &str) -> Option<(Decimal, String)> {
    let mut parts = value.split_whitespace();
    let amount = Decimal::from_str(parts.next()?).ok()?;
    let symbol = parts.next()?.to_uppercase();
    if parts.next().is_some() {
        return None;
    }
    Some((amount, symbol))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_truncate_never_rounds_up() {
        assert_eq!(truncate(dec("1.23999"), 3), dec("1.239"));
        assert_eq!(truncate(dec("0.0009"), 3), dec("0.000"));
        assert_eq!(truncate(dec("5"), 3).to_string(), "5.000");
    }

    #[test]
    fn test_normalize_bounds() {
        let cases = ["0", "0.1", "1.99999999", "123456.7891011", "0.00000001", "-1.55"];
        for case in cases {
            let a = dec(case);
            for p in 0..10 {
                let n = truncate(a, p);
                assert!(n <= a, "{} truncated to {} dp gave {}", a, p, n);
                assert!(n.scale() <= p);
            }
        }
    }

    #[test]
    fn test_explicit_strategy() {
        assert_eq!(
            normalize(dec("1.2355"), 3, RoundingStrategy::MidpointAwayFromZero),
            dec("1.236")
        );
        assert_eq!(normalize(dec("1.2355"), 3, PAYER_SAFE), dec("1.235"));
    }

    #[test]
    fn test_minimum_unit_boundary() {
        assert!(!is_above_minimum(dec("0.0009"), 3));
        assert!(is_above_minimum(dec("0.001"), 3));
        assert!(is_above_minimum(dec("1"), 0));
        assert!(!is_above_minimum(dec("0.9"), 0));
        assert!(!is_above_minimum(Decimal::ZERO, 8));
    }

    #[test]
    fn test_minimum_unit_extreme_precision() {
        assert_eq!(minimum_unit(40), None);
        assert!(is_above_minimum(dec("0.0000000001"), 40));
        assert!(!is_above_minimum(Decimal::ZERO, 40));
    }

    #[test]
    fn test_checked_amount() {
        assert_eq!(
            checked_amount(dec("1.23456"), 2, "SGTK", "send").unwrap(),
            dec("1.23")
        );
        let err = checked_amount(dec("0.001"), 2, "SGTK", "send").unwrap_err();
        assert_eq!(err.code(), "ARITHMETIC_ERROR");
    }

    #[test]
    fn test_base_units() {
        assert_eq!(to_base_units(dec("1.5"), 5).unwrap(), 150_000);
        assert_eq!(to_base_units(dec("0.123456"), 5).unwrap(), 12_345);
        assert_eq!(from_base_units(150_000, 5).unwrap(), dec("1.5"));
        assert_eq!(from_base_units(1, 8).unwrap().to_string(), "0.00000001");
    }

    #[test]
    fn test_base_units_unrepresentable_precision() {
        let err = from_base_units(1, 29).unwrap_err();
        assert_eq!(err.code(), "ARITHMETIC_ERROR");
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(dec("1"), 3), "1.000");
        assert_eq!(format_amount(dec("2.34567"), 3), "2.345");
    }

    #[test]
    fn test_parse_asset_string() {
        assert_eq!(
            parse_asset_string("12.345 STEEM"),
            Some((dec("12.345"), "STEEM".to_string()))
        );
        assert_eq!(parse_asset_string("nonsense"), None);
        assert_eq!(parse_asset_string("1.000 SBD extra"), None);
    }
}
