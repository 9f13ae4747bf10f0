//! Conversion between raw integer token units and decimal amounts.
//!
//! Comparisons against thresholds happen on raw `U256` values. `Decimal` is only
//! used for reporting, and its 96-bit mantissa cannot hold every on-chain value.

use alloy::primitives::U256;
use rust_decimal::Decimal;

use crate::blockchain::types::{ChainError, ChainResult};

/// Largest scale `Decimal` can carry.
pub const MAX_DECIMALS: u8 = 28;

/// Largest mantissa a `Decimal` holds (2^96 - 1).
const MAX_MANTISSA: U256 = U256::from_limbs([u64::MAX, u32::MAX as u64, 0, 0]);

/// Convert a raw on-chain value into a decimal amount, e.g. `1000000` at 6 decimals is `1`.
///
/// Fractional digits that do not fit the mantissa are truncated. Fails only when the
/// whole-token part itself is out of range.
pub fn to_decimal(raw: U256, decimals: u8) -> ChainResult<Decimal> {
    check_decimals(decimals)?;
    let ten = U256::from(10u8);
    let mut mantissa = raw;
    let mut scale = u32::from(decimals);
    while mantissa > MAX_MANTISSA {
        if scale == 0 {
            return Err(ChainError::Conversion(format!(
                "value {raw} at {decimals} decimals exceeds the decimal range"
            )));
        }
        mantissa /= ten;
        scale -= 1;
    }
    let mantissa: u128 = mantissa
        .try_into()
        .map_err(|_| ChainError::Conversion(format!("value {raw} does not fit a decimal")))?;
    let mantissa = i128::try_from(mantissa).map_err(|e| ChainError::Conversion(e.to_string()))?;
    Decimal::try_from_i128_with_scale(mantissa, scale)
        .map(|d| d.normalize())
        .map_err(|e| ChainError::Conversion(format!("value {raw} at {decimals} decimals: {e}")))
}

/// Like [`to_decimal`], but saturates at `Decimal::MAX` instead of failing.
///
/// For display and event payloads, where an amount must always be produced.
pub fn to_decimal_saturating(raw: U256, decimals: u8) -> Decimal {
    let (raw, decimals) = if decimals > MAX_DECIMALS {
        let excess = U256::from(decimals - MAX_DECIMALS);
        (raw / U256::from(10u8).pow(excess), MAX_DECIMALS)
    } else {
        (raw, decimals)
    };
    to_decimal(raw, decimals).unwrap_or(Decimal::MAX)
}

/// Convert a decimal amount into raw units. Digits beyond `decimals` are truncated.
pub fn to_raw(amount: Decimal, decimals: u8) -> ChainResult<U256> {
    scale_to_raw(amount, decimals, false)
}

/// Convert a decimal amount into raw units, rounding any excess digits up.
///
/// The smallest raw value that is at least `amount`, suited to minimum thresholds.
pub fn to_raw_ceil(amount: Decimal, decimals: u8) -> ChainResult<U256> {
    scale_to_raw(amount, decimals, true)
}

fn scale_to_raw(amount: Decimal, decimals: u8, round_up: bool) -> ChainResult<U256> {
    check_decimals(decimals)?;
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ChainError::Conversion(format!("negative amount {amount}")));
    }
    let ten = U256::from(10u8);
    let mantissa = U256::from(amount.mantissa().unsigned_abs());
    let scale = amount.scale();
    let target = u32::from(decimals);

    if scale <= target {
        let factor = ten.pow(U256::from(target - scale));
        return mantissa
            .checked_mul(factor)
            .ok_or_else(|| ChainError::Conversion(format!("{amount} overflows at {decimals} decimals")));
    }

    let divisor = ten.pow(U256::from(scale - target));
    let (quotient, remainder) = mantissa.div_rem(divisor);
    if round_up && !remainder.is_zero() {
        Ok(quotient + U256::from(1u8))
    } else {
        Ok(quotient)
    }
}

fn check_decimals(decimals: u8) -> ChainResult<()> {
    if decimals > MAX_DECIMALS {
        return Err(ChainError::Conversion(format!(
            "{decimals} decimals exceeds the supported maximum of {MAX_DECIMALS}"
        )));
    }
    Ok(())
}
