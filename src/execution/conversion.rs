//! Fixed-point conversion of deposit amounts into target-asset quantities.
//!
//! Amounts enter as smallest-unit integers; the produced amount is a
//! decimal floored to [`TARGET_ASSET_SCALE`] fractional digits. Rounding is
//! always down: the conversion must never create value out of rounding.

use crate::constants::TARGET_ASSET_SCALE;
use crate::error::{DcaError, Result};
use bigdecimal::num_bigint::BigInt;
use bigdecimal::{BigDecimal, RoundingMode};

/// Convert `amount_in` smallest units (at `deposit_scale` fractional
/// digits) into target-asset units at the given price.
pub fn amount_out(amount_in: i64, deposit_scale: i16, price: &BigDecimal) -> Result<BigDecimal> {
    if amount_in <= 0 {
        return Err(DcaError::ValidationError(format!(
            "amount_in must be positive, got {amount_in}"
        )));
    }
    if price <= &BigDecimal::from(0) {
        return Err(DcaError::ValidationError(format!(
            "price must be positive, got {price}"
        )));
    }

    let value_in = BigDecimal::new(BigInt::from(amount_in), i64::from(deposit_scale));
    let raw = value_in / price;
    Ok(raw.with_scale_round(TARGET_ASSET_SCALE, RoundingMode::Down))
}
