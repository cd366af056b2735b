//! Invariant checking helpers
//!
//! Shared by unit tests, the integration suite, the keeper's health report
//! and the model-checking harnesses.

use crate::error::VaultResult;
use crate::math::{add_u128, sub_u128};
use crate::supply::SupplyToken;
use crate::types::CREDITS_RESOLUTION;
use crate::vault::Vault;

/// Rounding tolerance for a token with `holders` accounts: one unit of least
/// precision per holder, plus one for the aggregate
pub fn rounding_epsilon(holders: usize) -> u128 {
    add_u128(holders as u128, 1)
}

/// Solvency: backing >= supply - epsilon
pub fn solvency_ok(vault: &Vault) -> VaultResult<bool> {
    let supply = vault.total_supply()?;
    let value = vault.total_value()?;
    let epsilon = rounding_epsilon(vault.token().holder_count());
    Ok(value >= sub_u128(supply, epsilon))
}

/// Signed gap between backing and supply, in whole tokens (floor toward zero)
pub fn collateral_surplus_tokens(vault: &Vault) -> VaultResult<i128> {
    let supply = vault.total_supply()?;
    let value = vault.total_value()?;
    let whole = |v: u128| (v / CREDITS_RESOLUTION) as i128;
    Ok(if value >= supply {
        whole(value - supply)
    } else {
        -whole(supply - value)
    })
}

/// Sum of resolved holder balances
pub fn sum_of_balances(token: &SupplyToken) -> VaultResult<u128> {
    let mut sum = 0u128;
    for (holder, _) in token.holders() {
        sum = add_u128(sum, token.balance_of(holder)?);
    }
    Ok(sum)
}

/// Holder balances add up to total supply within the per-holder rounding bound
pub fn balances_match_supply(token: &SupplyToken) -> VaultResult<bool> {
    let supply = token.total_supply()?;
    let sum = sum_of_balances(token)?;
    let epsilon = rounding_epsilon(token.holder_count());
    // Balances floor individually, so the sum can only trail supply
    Ok(sum <= add_u128(supply, epsilon) && sub_u128(supply, sum) <= epsilon)
}

/// Supply never decreases across a rebase
pub fn supply_not_decreased(before: u128, after: u128) -> bool {
    after >= before
}
