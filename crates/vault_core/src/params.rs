//! Tunable vault parameters

use serde::{Deserialize, Serialize};

use crate::allocation::WithdrawalOrder;
use crate::math::bps_of;
use crate::error::VaultResult;
use crate::types::{AssetId, HolderId, BPS_DENOMINATOR, CREDITS_RESOLUTION};

/// How a withdrawal's net value is split across base assets
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedeemPolicy {
    /// Everything paid out in one asset
    DefaultAsset(AssetId),
    /// Split by each asset's share of total backing
    #[default]
    ProRata,
}

/// Vault parameters
///
/// Thresholds are whole token units (0 disables the trigger). Basis-point
/// fields are out of 10_000.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultParams {
    /// Share of each asset's backing kept idle by allocation passes
    pub vault_buffer_bps: u16,

    /// Fee withheld on withdrawal; stays in the vault as backing
    pub redeem_fee_bps: u16,

    /// Tolerated unmet remainder of a withdrawal
    pub max_shortfall_bps: u16,

    /// Deposits at or above this size trigger an allocation pass
    pub auto_allocate_threshold: u64,

    /// Deposits at or above this size trigger a rebase first
    pub rebase_threshold: u64,

    /// Cap on supply growth per rebase (0 = uncapped)
    pub max_yield_bps_per_rebase: u16,

    /// Share of recognized yield minted to the trustee
    pub trustee_fee_bps: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub trustee: Option<HolderId>,

    pub redeem_policy: RedeemPolicy,

    pub withdrawal_order: WithdrawalOrder,
}

impl Default for VaultParams {
    fn default() -> Self {
        Self {
            vault_buffer_bps: 0,
            redeem_fee_bps: 0,
            max_shortfall_bps: 0,
            auto_allocate_threshold: 0,
            rebase_threshold: 0,
            max_yield_bps_per_rebase: 0,
            trustee_fee_bps: 0,
            trustee: None,
            redeem_policy: RedeemPolicy::ProRata,
            withdrawal_order: WithdrawalOrder::Registration,
        }
    }
}

impl VaultParams {
    /// Clamp basis-point fields to 100%
    pub fn sanitized(mut self) -> Self {
        let max = BPS_DENOMINATOR as u16;
        self.vault_buffer_bps = self.vault_buffer_bps.min(max);
        self.redeem_fee_bps = self.redeem_fee_bps.min(max);
        self.max_shortfall_bps = self.max_shortfall_bps.min(max);
        self.max_yield_bps_per_rebase = self.max_yield_bps_per_rebase.min(max);
        self.trustee_fee_bps = self.trustee_fee_bps.min(max);
        self
    }

    pub fn auto_allocate_threshold_canonical(&self) -> Option<u128> {
        threshold(self.auto_allocate_threshold)
    }

    pub fn rebase_threshold_canonical(&self) -> Option<u128> {
        threshold(self.rebase_threshold)
    }

    pub fn redeem_fee(&self, amount: u128) -> VaultResult<u128> {
        bps_of(amount, self.redeem_fee_bps)
    }
}

fn threshold(units: u64) -> Option<u128> {
    match units {
        0 => None,
        n => Some(u128::from(n) * CREDITS_RESOLUTION),
    }
}
