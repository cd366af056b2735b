//! Strategy capability interface and the ordered strategy registry
//!
//! The vault only ever talks to strategies through [`Strategy`]. Every call is
//! treated as untrusted: deposit and withdraw results are clamped to the requested
//! amount and errors are wrapped with the strategy identifier so callers can
//! decide whether to skip or abort.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use arrayvec::ArrayVec;
use serde::{Deserialize, Serialize};

use crate::asset::Asset;
use crate::error::{StrategyError, VaultError, VaultResult};
use crate::math::{add_u128, min_u128, sub_u128};
use crate::types::{AssetId, StrategyId, MAX_STRATEGIES};

/// Capability set every pluggable yield venue implements.
/// Amounts are in the asset's raw units.
pub trait Strategy: Send {
    /// Deposit up to `amount`; returns the amount actually accepted
    fn deposit(&mut self, asset: &AssetId, amount: u128) -> Result<u128, StrategyError>;

    /// Withdraw `amount`; returns the amount actually returned
    fn withdraw(&mut self, asset: &AssetId, amount: u128) -> Result<u128, StrategyError>;

    fn reported_balance(&self, asset: &AssetId) -> Result<u128, StrategyError>;

    fn supports_asset(&self, asset: &AssetId) -> bool;
}

/// Shared handle, so an owner can keep driving a strategy after registration
impl<S: Strategy> Strategy for Arc<Mutex<S>> {
    fn deposit(&mut self, asset: &AssetId, amount: u128) -> Result<u128, StrategyError> {
        lock(self)?.deposit(asset, amount)
    }

    fn withdraw(&mut self, asset: &AssetId, amount: u128) -> Result<u128, StrategyError> {
        lock(self)?.withdraw(asset, amount)
    }

    fn reported_balance(&self, asset: &AssetId) -> Result<u128, StrategyError> {
        lock(self)?.reported_balance(asset)
    }

    fn supports_asset(&self, asset: &AssetId) -> bool {
        lock(self).map_or(false, |s| s.supports_asset(asset))
    }
}

fn lock<S>(m: &Mutex<S>) -> Result<std::sync::MutexGuard<'_, S>, StrategyError> {
    m.lock()
        .map_err(|_| StrategyError::Unavailable("strategy lock poisoned".to_string()))
}

/// Capability flags granted to a registered strategy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub supports_deposit: bool,
    pub supports_withdraw: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            supports_deposit: true,
            supports_withdraw: true,
        }
    }
}

impl Capabilities {
    /// Drain-only venue: no new deposits
    pub fn withdraw_only() -> Self {
        Self {
            supports_deposit: false,
            supports_withdraw: true,
        }
    }
}

/// Registry entry wrapping one strategy handle
pub struct StrategyEntry {
    pub id: StrategyId,
    pub accepted_assets: BTreeSet<AssetId>,
    pub capabilities: Capabilities,
    pub active: bool,
    /// Last canonical balance observed per asset by a rebase pass
    checkpoints: BTreeMap<AssetId, u128>,
    handle: Box<dyn Strategy>,
}

impl StrategyEntry {
    pub fn accepts(&self, asset: &AssetId) -> bool {
        self.accepted_assets.contains(asset)
    }

    pub fn checkpoint(&self, asset: &AssetId) -> u128 {
        self.checkpoints.get(asset).copied().unwrap_or(0)
    }

    pub fn can_deposit(&self, asset: &AssetId) -> bool {
        self.active && self.capabilities.supports_deposit && self.accepts(asset)
    }

    pub fn can_withdraw(&self, asset: &AssetId) -> bool {
        self.capabilities.supports_withdraw && self.accepts(asset)
    }
}

impl fmt::Debug for StrategyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyEntry")
            .field("id", &self.id)
            .field("accepted_assets", &self.accepted_assets)
            .field("capabilities", &self.capabilities)
            .field("active", &self.active)
            .field("checkpoints", &self.checkpoints)
            .finish_non_exhaustive()
    }
}

/// Strategies in registration order
#[derive(Debug, Default)]
pub struct StrategyRegistry {
    entries: ArrayVec<StrategyEntry, MAX_STRATEGIES>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a strategy for a set of assets
    pub fn register(
        &mut self,
        id: StrategyId,
        handle: Box<dyn Strategy>,
        accepted_assets: impl IntoIterator<Item = AssetId>,
        capabilities: Capabilities,
    ) -> VaultResult<()> {
        if self.position(&id).is_some() {
            return Err(VaultError::DuplicateStrategy(id));
        }
        if self.entries.is_full() {
            return Err(VaultError::RegistryFull);
        }

        let accepted_assets: BTreeSet<AssetId> = accepted_assets.into_iter().collect();
        if let Some(asset) = accepted_assets.iter().find(|a| !handle.supports_asset(a)) {
            return Err(VaultError::UnsupportedAsset {
                strategy: id,
                asset: asset.clone(),
            });
        }

        log::info!(
            "Registered strategy {} for {} asset(s)",
            id,
            accepted_assets.len()
        );
        self.entries.push(StrategyEntry {
            id,
            accepted_assets,
            capabilities,
            active: true,
            checkpoints: BTreeMap::new(),
            handle,
        });
        Ok(())
    }

    pub fn deactivate(&mut self, id: &StrategyId) -> VaultResult<()> {
        self.get_mut(id)?.active = false;
        log::info!("Deactivated strategy {}", id);
        Ok(())
    }

    pub fn activate(&mut self, id: &StrategyId) -> VaultResult<()> {
        self.get_mut(id)?.active = true;
        Ok(())
    }

    /// Remove a strategy once every accepted asset reports a zero balance
    pub fn remove(&mut self, id: &StrategyId) -> VaultResult<Box<dyn Strategy>> {
        let idx = self
            .position(id)
            .ok_or_else(|| VaultError::UnknownStrategy(id.clone()))?;

        let entry = &self.entries[idx];
        for asset in entry.accepted_assets.iter() {
            let held = entry
                .handle
                .reported_balance(asset)
                .map_err(|e| VaultError::strategy_call(id, e))?;
            if held > 0 {
                return Err(VaultError::StrategyNotEmpty(id.clone()));
            }
        }

        let entry = self.entries.remove(idx);
        log::info!("Removed strategy {}", id);
        Ok(entry.handle)
    }

    pub fn get(&self, id: &StrategyId) -> VaultResult<&StrategyEntry> {
        self.entries
            .iter()
            .find(|e| &e.id == id)
            .ok_or_else(|| VaultError::UnknownStrategy(id.clone()))
    }

    fn get_mut(&mut self, id: &StrategyId) -> VaultResult<&mut StrategyEntry> {
        self.entries
            .iter_mut()
            .find(|e| &e.id == id)
            .ok_or_else(|| VaultError::UnknownStrategy(id.clone()))
    }

    /// Registration index of `id`
    pub fn position(&self, id: &StrategyId) -> Option<usize> {
        self.entries.iter().position(|e| &e.id == id)
    }

    pub fn contains(&self, id: &StrategyId) -> bool {
        self.position(id).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StrategyEntry> {
        self.entries.iter()
    }

    pub fn ids(&self) -> Vec<StrategyId> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pass-through balance query in raw asset units
    pub fn reported_balance_raw(&self, id: &StrategyId, asset: &AssetId) -> VaultResult<u128> {
        let entry = self.get(id)?;
        if !entry.accepts(asset) {
            return Err(VaultError::UnsupportedAsset {
                strategy: id.clone(),
                asset: asset.clone(),
            });
        }
        entry
            .handle
            .reported_balance(asset)
            .map_err(|e| VaultError::strategy_call(id, e))
    }

    /// Pass-through balance query normalized to canonical units
    pub fn reported_balance(&self, id: &StrategyId, asset: &Asset) -> VaultResult<u128> {
        let raw = self.reported_balance_raw(id, &asset.id)?;
        asset.normalize(raw)
    }

    /// Offer `amount` to a strategy; returns what it accepted (never more than offered)
    pub fn deposit(&mut self, id: &StrategyId, asset: &AssetId, amount: u128) -> VaultResult<u128> {
        let entry = self.get_mut(id)?;
        if !entry.accepts(asset) {
            return Err(VaultError::UnsupportedAsset {
                strategy: id.clone(),
                asset: asset.clone(),
            });
        }
        if !entry.active || !entry.capabilities.supports_deposit {
            return Err(VaultError::CapabilityDisabled {
                strategy: id.clone(),
                capability: "deposit",
            });
        }

        let accepted = entry
            .handle
            .deposit(asset, amount)
            .map_err(|e| VaultError::strategy_call(id, e))?;
        Ok(min_u128(accepted, amount))
    }

    /// Pull `amount` from a strategy; returns what actually came back
    pub fn withdraw(&mut self, id: &StrategyId, asset: &AssetId, amount: u128) -> VaultResult<u128> {
        let entry = self.get_mut(id)?;
        if !entry.accepts(asset) {
            return Err(VaultError::UnsupportedAsset {
                strategy: id.clone(),
                asset: asset.clone(),
            });
        }
        if !entry.capabilities.supports_withdraw {
            return Err(VaultError::CapabilityDisabled {
                strategy: id.clone(),
                capability: "withdraw",
            });
        }

        let returned = entry
            .handle
            .withdraw(asset, amount)
            .map_err(|e| VaultError::strategy_call(id, e))?;
        if returned > amount {
            log::warn!("Strategy {} returned {} on a pull of {}", id, returned, amount);
        }
        Ok(min_u128(returned, amount))
    }

    /// Hand pulled funds back to a strategy when a withdrawal is unwound.
    /// Skips the active and deposit-capability checks; returns what was accepted.
    pub fn return_funds(
        &mut self,
        id: &StrategyId,
        asset: &AssetId,
        amount: u128,
    ) -> VaultResult<u128> {
        let entry = self.get_mut(id)?;
        let accepted = entry
            .handle
            .deposit(asset, amount)
            .map_err(|e| VaultError::strategy_call(id, e))?;
        Ok(min_u128(accepted, amount))
    }

    pub fn record_checkpoint(
        &mut self,
        id: &StrategyId,
        asset: &AssetId,
        canonical: u128,
    ) -> VaultResult<()> {
        self.get_mut(id)?.checkpoints.insert(asset.clone(), canonical);
        Ok(())
    }

    pub fn checkpoint(&self, id: &StrategyId, asset: &AssetId) -> VaultResult<u128> {
        Ok(self.get(id)?.checkpoint(asset))
    }
}

/// Reference in-memory strategy used by the keeper simulation and tests
#[derive(Clone, Debug, Default)]
pub struct InMemoryStrategy {
    assets: BTreeSet<AssetId>,
    balances: BTreeMap<AssetId, u128>,
    /// Maximum accepted per deposit call
    deposit_cap: Option<u128>,
}

impl InMemoryStrategy {
    pub fn new(assets: impl IntoIterator<Item = AssetId>) -> Self {
        Self {
            assets: assets.into_iter().collect(),
            balances: BTreeMap::new(),
            deposit_cap: None,
        }
    }

    pub fn with_deposit_cap(mut self, cap: u128) -> Self {
        self.deposit_cap = Some(cap);
        self
    }

    pub fn assets(&self) -> impl Iterator<Item = &AssetId> {
        self.assets.iter()
    }

    pub fn balance(&self, asset: &AssetId) -> u128 {
        self.balances.get(asset).copied().unwrap_or(0)
    }

    /// Credit harvested yield to the position
    pub fn accrue_yield(&mut self, asset: &AssetId, amount: u128) {
        let held = self.balance(asset);
        self.balances.insert(asset.clone(), add_u128(held, amount));
    }

    /// Write down the position (venue loss)
    pub fn realize_loss(&mut self, asset: &AssetId, amount: u128) {
        let held = self.balance(asset);
        self.balances.insert(asset.clone(), sub_u128(held, amount));
    }
}

impl Strategy for InMemoryStrategy {
    fn deposit(&mut self, asset: &AssetId, amount: u128) -> Result<u128, StrategyError> {
        if !self.supports_asset(asset) {
            return Err(StrategyError::UnsupportedAsset(asset.clone()));
        }
        let accepted = self.deposit_cap.map_or(amount, |cap| min_u128(cap, amount));
        self.accrue_yield(asset, accepted);
        Ok(accepted)
    }

    fn withdraw(&mut self, asset: &AssetId, amount: u128) -> Result<u128, StrategyError> {
        if !self.supports_asset(asset) {
            return Err(StrategyError::UnsupportedAsset(asset.clone()));
        }
        let held = self.balance(asset);
        if amount > held {
            return Err(StrategyError::InsufficientFunds {
                requested: amount,
                held,
            });
        }
        self.balances.insert(asset.clone(), held - amount);
        Ok(amount)
    }

    fn reported_balance(&self, asset: &AssetId) -> Result<u128, StrategyError> {
        if !self.supports_asset(asset) {
            return Err(StrategyError::UnsupportedAsset(asset.clone()));
        }
        Ok(self.balance(asset))
    }

    fn supports_asset(&self, asset: &AssetId) -> bool {
        self.assets.contains(asset)
    }
}
