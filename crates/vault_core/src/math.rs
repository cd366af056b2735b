//! Fixed-point arithmetic helpers - no unwrap, no panics
//!
//! Saturating helpers are used for bookkeeping sums where clamping is the
//! intended behavior. Anything that feeds a balance goes through the checked
//! variants, which widen to 256 bits for the intermediate product.

use ethnum::U256;

use crate::error::{VaultError, VaultResult};
use crate::types::BPS_DENOMINATOR;

/// Add u128 with saturation at MAX
pub fn add_u128(a: u128, b: u128) -> u128 {
    a.saturating_add(b)
}

/// Subtract u128 with saturation at 0
pub fn sub_u128(a: u128, b: u128) -> u128 {
    a.saturating_sub(b)
}

/// Minimum of two u128
pub fn min_u128(a: u128, b: u128) -> u128 {
    if a < b { a } else { b }
}

/// Checked addition
pub fn checked_add(a: u128, b: u128) -> VaultResult<u128> {
    a.checked_add(b).ok_or(VaultError::Arithmetic("addition overflow"))
}

/// Checked subtraction
pub fn checked_sub(a: u128, b: u128) -> VaultResult<u128> {
    a.checked_sub(b).ok_or(VaultError::Arithmetic("subtraction underflow"))
}

/// floor(a * b / denom) with a 256-bit intermediate
pub fn mul_div_floor(a: u128, b: u128, denom: u128) -> VaultResult<u128> {
    if denom == 0 {
        return Err(VaultError::Arithmetic("division by zero"));
    }
    let product = U256::new(a) * U256::new(b);
    narrow(product / U256::new(denom))
}

/// ceil(a * b / denom) with a 256-bit intermediate
pub fn mul_div_ceil(a: u128, b: u128, denom: u128) -> VaultResult<u128> {
    if denom == 0 {
        return Err(VaultError::Arithmetic("division by zero"));
    }
    let product = U256::new(a) * U256::new(b);
    let d = U256::new(denom);
    let quotient = product / d;
    if product % d == U256::ZERO {
        narrow(quotient)
    } else {
        narrow(quotient + U256::ONE)
    }
}

/// floor(amount * bps / 10_000)
pub fn bps_of(amount: u128, bps: u16) -> VaultResult<u128> {
    mul_div_floor(amount, u128::from(bps), BPS_DENOMINATOR)
}

fn narrow(x: U256) -> VaultResult<u128> {
    let (high, low) = x.into_words();
    if high != 0 {
        return Err(VaultError::Arithmetic("result exceeds u128"));
    }
    Ok(low)
}
