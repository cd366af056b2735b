//! Asset table and precision normalization
//!
//! Every cross-asset amount is expressed in 18-decimal canonical units. Both
//! directions truncate, so the vault never credits more than it received.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};
use crate::types::{AssetId, StrategyId, CANONICAL_DECIMALS};

/// Convert a raw asset amount into canonical 18-decimal units
pub fn normalize(decimals: u8, raw: u128) -> VaultResult<u128> {
    let scale = scale_factor(decimals)?;
    raw.checked_mul(scale)
        .ok_or(VaultError::Arithmetic("normalized amount exceeds u128"))
}

/// Convert a canonical amount back into raw asset units (floor)
pub fn denormalize(decimals: u8, canonical: u128) -> VaultResult<u128> {
    let scale = scale_factor(decimals)?;
    Ok(canonical / scale)
}

fn scale_factor(decimals: u8) -> VaultResult<u128> {
    if decimals > CANONICAL_DECIMALS {
        return Err(VaultError::Precision { decimals });
    }
    Ok(10u128.pow(u32::from(CANONICAL_DECIMALS - decimals)))
}

/// Accepted base asset
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    /// Token decimals, at most 18
    pub decimals: u8,
    /// Whether deposits of this asset are accepted
    #[serde(default = "default_accepted")]
    pub accepted: bool,
    /// Strategy that receives this asset on allocation
    #[serde(default)]
    pub default_strategy: Option<StrategyId>,
}

fn default_accepted() -> bool {
    true
}

impl Asset {
    pub fn new(id: impl Into<AssetId>, decimals: u8) -> Self {
        Self {
            id: id.into(),
            decimals,
            accepted: true,
            default_strategy: None,
        }
    }

    pub fn with_default_strategy(mut self, strategy: impl Into<StrategyId>) -> Self {
        self.default_strategy = Some(strategy.into());
        self
    }

    pub fn normalize(&self, raw: u128) -> VaultResult<u128> {
        normalize(self.decimals, raw)
    }

    pub fn denormalize(&self, canonical: u128) -> VaultResult<u128> {
        denormalize(self.decimals, canonical)
    }
}

/// Registered assets, iterated in identifier order
#[derive(Clone, Debug, Default)]
pub struct AssetLedger {
    assets: BTreeMap<AssetId, Asset>,
}

impl AssetLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an asset; rejects precision above 18 decimals
    pub fn add_asset(&mut self, asset: Asset) -> VaultResult<()> {
        scale_factor(asset.decimals)?;
        if self.assets.contains_key(&asset.id) {
            return Err(VaultError::DuplicateAsset(asset.id));
        }
        self.assets.insert(asset.id.clone(), asset);
        Ok(())
    }

    pub fn get(&self, id: &AssetId) -> VaultResult<&Asset> {
        self.assets
            .get(id)
            .ok_or_else(|| VaultError::UnknownAsset(id.clone()))
    }

    /// Look up an asset that currently accepts deposits
    pub fn accepted(&self, id: &AssetId) -> VaultResult<&Asset> {
        match self.assets.get(id) {
            Some(asset) if asset.accepted => Ok(asset),
            _ => Err(VaultError::UnacceptedAsset(id.clone())),
        }
    }

    pub fn set_accepted(&mut self, id: &AssetId, accepted: bool) -> VaultResult<()> {
        let asset = self
            .assets
            .get_mut(id)
            .ok_or_else(|| VaultError::UnknownAsset(id.clone()))?;
        asset.accepted = accepted;
        Ok(())
    }

    pub fn set_default_strategy(
        &mut self,
        id: &AssetId,
        strategy: Option<StrategyId>,
    ) -> VaultResult<()> {
        let asset = self
            .assets
            .get_mut(id)
            .ok_or_else(|| VaultError::UnknownAsset(id.clone()))?;
        asset.default_strategy = strategy;
        Ok(())
    }

    /// Clear every default that points at `strategy`
    pub fn clear_default_strategy(&mut self, strategy: &StrategyId) {
        for asset in self.assets.values_mut() {
            if asset.default_strategy.as_ref() == Some(strategy) {
                asset.default_strategy = None;
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Asset> {
        self.assets.values()
    }

    pub fn ids(&self) -> Vec<AssetId> {
        self.assets.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}
