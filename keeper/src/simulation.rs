//! Vault assembly and simulated yield for the keeper loop

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use vault_core::math::bps_of;
use vault_core::{
    Asset, AssetId, Capabilities, HolderId, InMemoryStrategy, StrategyId, Vault,
};

use crate::config::Config;

/// Shared handle the keeper keeps after registering a strategy
pub type SimStrategy = Arc<Mutex<InMemoryStrategy>>;

/// Simulated venues plus their per-tick yield
pub struct Simulation {
    pub strategies: BTreeMap<StrategyId, (SimStrategy, u16)>,
}

/// Build a vault, its strategies and seed deposits from `config`
pub fn build_vault(config: &Config) -> Result<(Vault, Simulation)> {
    let mut vault = Vault::new(config.params.clone());

    for asset in config.assets.iter() {
        let mut entry = Asset::new(asset.id.as_str(), asset.decimals);
        entry.default_strategy = asset.default_strategy.as_deref().map(StrategyId::from);
        vault
            .add_asset(entry)
            .context(format!("Failed to add asset {}", asset.id))?;
    }

    let mut strategies = BTreeMap::new();
    for s in config.strategies.iter() {
        let assets: Vec<AssetId> = s.assets.iter().map(|a| AssetId::from(a.as_str())).collect();
        let mut venue = InMemoryStrategy::new(assets.iter().cloned());
        if let Some(cap) = s.deposit_cap {
            venue = venue.with_deposit_cap(u128::from(cap));
        }
        let handle: SimStrategy = Arc::new(Mutex::new(venue));

        let capabilities = if s.withdraw_only {
            Capabilities::withdraw_only()
        } else {
            Capabilities::default()
        };
        let id = StrategyId::from(s.id.as_str());
        vault
            .register_strategy(id.clone(), Box::new(handle.clone()), assets, capabilities)
            .context(format!("Failed to register strategy {}", s.id))?;
        strategies.insert(id, (handle, s.yield_bps_per_tick));
    }

    for seed in config.seed_deposits.iter() {
        let asset_id = AssetId::from(seed.asset.as_str());
        let decimals = vault
            .ledger()
            .get(&asset_id)
            .context(format!("Seed deposit names unknown asset {}", seed.asset))?
            .decimals;
        let raw = u128::from(seed.amount) * 10u128.pow(u32::from(decimals));
        vault
            .deposit(&HolderId::from(seed.holder.as_str()), &asset_id, raw, 0)
            .context(format!("Seed deposit for {} failed", seed.holder))?;
    }

    Ok((vault, Simulation { strategies }))
}

impl Simulation {
    /// Credit one tick of yield to every simulated position.
    /// Returns the raw amounts accrued per (strategy, asset).
    pub fn accrue(&self) -> Result<Vec<(StrategyId, AssetId, u128)>> {
        let mut accrued = Vec::new();
        for (id, (handle, bps)) in self.strategies.iter() {
            if *bps == 0 {
                continue;
            }
            let mut venue = handle
                .lock()
                .map_err(|_| anyhow!("strategy {} lock poisoned", id))?;
            for asset in venue_assets(&venue) {
                let gain = bps_of(venue.balance(&asset), *bps)?;
                if gain > 0 {
                    venue.accrue_yield(&asset, gain);
                    accrued.push((id.clone(), asset, gain));
                }
            }
        }
        Ok(accrued)
    }
}

fn venue_assets(venue: &InMemoryStrategy) -> Vec<AssetId> {
    venue.assets().cloned().collect()
}
