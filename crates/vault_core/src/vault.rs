//! Vault orchestration: deposit, allocate, withdraw, rebase
//!
//! Ledger state is always mutated before a strategy is called, and every
//! public operation runs under the in-flight guard. Failed withdrawals roll
//! the token back to its pre-burn checkpoint, hand pulled funds back to their
//! strategies and drop the events they emitted.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::allocation::{AllocationPolicy, WithdrawalLeg, WithdrawalOrder};
use crate::asset::{Asset, AssetLedger};
use crate::error::{VaultError, VaultResult};
use crate::events::VaultEvent;
use crate::guard::ReentrancyGuard;
use crate::math::{add_u128, bps_of, checked_add, min_u128, mul_div_floor, sub_u128};
use crate::params::{RedeemPolicy, VaultParams};
use crate::strategy::{Capabilities, Strategy, StrategyRegistry};
use crate::supply::{RebaseOutcome, SupplyToken};
use crate::types::{AssetId, HolderId, StrategyId};

/// One strategy deposit made by an allocation pass
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AllocationLeg {
    pub asset: AssetId,
    pub strategy: StrategyId,
    pub offered: u128,
    pub accepted: u128,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AllocationReport {
    pub allocated: Vec<AllocationLeg>,
    /// Targets whose deposit call failed; the offered funds stayed idle
    pub skipped: Vec<(AssetId, StrategyId)>,
}

impl AllocationReport {
    /// Nothing moved and nothing was attempted
    pub fn is_noop(&self) -> bool {
        self.allocated.is_empty() && self.skipped.is_empty()
    }

    pub fn total_accepted(&self) -> u128 {
        self.allocated
            .iter()
            .fold(0u128, |acc, leg| add_u128(acc, leg.accepted))
    }
}

/// Result of a successful withdrawal
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Payout {
    pub holder: HolderId,
    /// Token amount burned (canonical)
    pub burned: u128,
    /// Redeem fee withheld (canonical)
    pub fee: u128,
    /// Raw amount paid per asset
    pub outputs: Vec<(AssetId, u128)>,
    /// Canonical value of `outputs`
    pub total_out: u128,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RebaseReport {
    /// Backing counted by this pass (canonical)
    pub total_value: u128,
    pub previous_supply: u128,
    pub new_supply: u128,
    /// Surplus recognized after the per-pass cap
    pub recognized_yield: u128,
    pub trustee_fee: u128,
    /// Strategies excluded because a balance query failed
    pub degraded: Vec<StrategyId>,
    pub outcome: RebaseOutcome,
}

impl RebaseReport {
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}

/// Per-strategy line of a [`VaultSnapshot`]
#[derive(Clone, Debug, Serialize)]
pub struct StrategySnapshot {
    pub id: StrategyId,
    pub active: bool,
    /// Canonical reported balance per asset; `None` when the query failed
    pub balances: BTreeMap<AssetId, Option<u128>>,
}

/// Read-only view of the vault for reporting
#[derive(Clone, Debug, Serialize)]
pub struct VaultSnapshot {
    pub total_supply: u128,
    pub total_value: u128,
    pub rebasing_credits_per_token: u128,
    pub non_rebasing_supply: u128,
    pub holders: usize,
    pub idle: BTreeMap<AssetId, u128>,
    pub strategies: Vec<StrategySnapshot>,
    pub capital_paused: bool,
    pub rebase_paused: bool,
}

/// Strategy, asset and raw amount of one completed pull
type Pull = (StrategyId, AssetId, u128);

/// Backing measured across idle reserve and strategies
struct Backing {
    total: u128,
    degraded: Vec<StrategyId>,
    checkpoints: Vec<(StrategyId, AssetId, u128)>,
}

#[derive(Debug, Default)]
pub struct Vault {
    ledger: AssetLedger,
    token: SupplyToken,
    registry: StrategyRegistry,
    policy: AllocationPolicy,
    /// Raw idle reserve per asset
    idle: BTreeMap<AssetId, u128>,
    params: VaultParams,
    capital_paused: bool,
    rebase_paused: bool,
    events: Vec<VaultEvent>,
    guard: ReentrancyGuard,
}

impl Vault {
    pub fn new(params: VaultParams) -> Self {
        let params = params.sanitized();
        Self {
            policy: AllocationPolicy::new(params.withdrawal_order.clone()),
            params,
            ..Self::default()
        }
    }

    // ========================================
    // Read surface
    // ========================================

    pub fn ledger(&self) -> &AssetLedger {
        &self.ledger
    }

    pub fn token(&self) -> &SupplyToken {
        &self.token
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &AllocationPolicy {
        &self.policy
    }

    pub fn params(&self) -> &VaultParams {
        &self.params
    }

    pub fn total_supply(&self) -> VaultResult<u128> {
        self.token.total_supply()
    }

    pub fn balance_of(&self, holder: &HolderId) -> VaultResult<u128> {
        self.token.balance_of(holder)
    }

    /// Raw idle reserve of `asset`
    pub fn idle_reserve(&self, asset: &AssetId) -> u128 {
        self.idle.get(asset).copied().unwrap_or(0)
    }

    pub fn is_capital_paused(&self) -> bool {
        self.capital_paused
    }

    pub fn is_rebase_paused(&self) -> bool {
        self.rebase_paused
    }

    /// Handle on the in-flight flag shared by every public operation
    pub fn reentrancy_guard(&self) -> ReentrancyGuard {
        self.guard.clone()
    }

    /// Canonical backing: idle reserve plus every strategy, deactivated ones
    /// included, that answers its balance query
    pub fn total_value(&self) -> VaultResult<u128> {
        Ok(self.measure_backing(false)?.total)
    }

    /// Raw backing of one asset: idle plus every strategy holding it
    pub fn check_balance(&self, asset: &AssetId) -> VaultResult<u128> {
        self.ledger.get(asset)?;
        checked_add(self.idle_reserve(asset), self.strategy_holdings_raw(asset))
    }

    pub fn drain_events(&mut self) -> Vec<VaultEvent> {
        self.flush_token_events();
        std::mem::take(&mut self.events)
    }

    pub fn snapshot(&self) -> VaultResult<VaultSnapshot> {
        let strategies = self
            .registry
            .iter()
            .map(|entry| {
                let balances = entry
                    .accepted_assets
                    .iter()
                    .map(|asset_id| {
                        let balance = self
                            .ledger
                            .get(asset_id)
                            .and_then(|asset| self.registry.reported_balance(&entry.id, asset))
                            .ok();
                        (asset_id.clone(), balance)
                    })
                    .collect();
                StrategySnapshot {
                    id: entry.id.clone(),
                    active: entry.active,
                    balances,
                }
            })
            .collect();

        Ok(VaultSnapshot {
            total_supply: self.token.total_supply()?,
            total_value: self.total_value()?,
            rebasing_credits_per_token: self.token.rebasing_credits_per_token(),
            non_rebasing_supply: self.token.non_rebasing_supply(),
            holders: self.token.holder_count(),
            idle: self.idle.clone(),
            strategies,
            capital_paused: self.capital_paused,
            rebase_paused: self.rebase_paused,
        })
    }

    // ========================================
    // Public operations
    // ========================================

    /// Deposit `raw` units of `asset`; returns the token amount minted
    pub fn deposit(
        &mut self,
        holder: &HolderId,
        asset: &AssetId,
        raw: u128,
        min_minted: u128,
    ) -> VaultResult<u128> {
        let _in_flight = self.guard.enter()?;
        if self.capital_paused {
            return Err(VaultError::CapitalPaused);
        }
        if raw == 0 {
            return Err(VaultError::ZeroAmount);
        }

        let minted = self.ledger.accepted(asset)?.normalize(raw)?;
        if minted < min_minted {
            return Err(VaultError::SlippageExceeded {
                actual: minted,
                minimum: min_minted,
            });
        }
        let new_idle = checked_add(self.idle_reserve(asset), raw)?;

        // Large deposits rebase first so they do not capture pending yield
        if let Some(threshold) = self.params.rebase_threshold_canonical() {
            if minted >= threshold && !self.rebase_paused {
                self.rebase_pass()?;
            }
        }

        self.token.mint(holder, minted)?;
        self.idle.insert(asset.clone(), new_idle);
        log::info!("Deposit: {} {} {} -> minted {}", holder, raw, asset, minted);
        self.events.push(VaultEvent::Deposited {
            holder: holder.clone(),
            asset: asset.clone(),
            raw,
            minted,
        });

        if let Some(threshold) = self.params.auto_allocate_threshold_canonical() {
            if minted >= threshold {
                self.allocate_pass()?;
            }
        }

        self.flush_token_events();
        Ok(minted)
    }

    /// Push idle reserve above the buffer into each asset's default strategy.
    /// Callable by anyone.
    pub fn allocate(&mut self) -> VaultResult<AllocationReport> {
        let _in_flight = self.guard.enter()?;
        self.allocate_pass()
    }

    /// Burn `amount` from `holder` and pay out the underlying assets.
    /// All-or-nothing: on failure the holder's balance is unchanged.
    pub fn withdraw(
        &mut self,
        holder: &HolderId,
        amount: u128,
        min_out: u128,
    ) -> VaultResult<Payout> {
        let _in_flight = self.guard.enter()?;
        if self.capital_paused {
            return Err(VaultError::CapitalPaused);
        }
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }

        let checkpoint = self.token.checkpoint(holder);
        let events_len = self.events.len();
        self.token.burn(holder, amount)?;

        let mut pulls = Vec::new();
        match self.redeem(holder, amount, min_out, &mut pulls) {
            Ok(payout) => {
                self.flush_token_events();
                Ok(payout)
            }
            Err(e) => {
                self.unwind_pulls(pulls);
                self.events.truncate(events_len);
                self.token.restore(checkpoint);
                log::warn!("Withdraw by {} of {} rolled back: {}", holder, amount, e);
                Err(e)
            }
        }
    }

    /// Pull `raw` units of `asset` from one strategy into idle reserve.
    /// A failing strategy is a hard error.
    pub fn withdraw_from_strategy(
        &mut self,
        strategy: &StrategyId,
        asset: &AssetId,
        raw: u128,
    ) -> VaultResult<u128> {
        let _in_flight = self.guard.enter()?;
        if raw == 0 {
            return Err(VaultError::ZeroAmount);
        }
        self.ledger.get(asset)?;

        let received = self.registry.withdraw(strategy, asset, raw)?;
        self.credit_idle(asset, received);
        self.events.push(VaultEvent::StrategyPulled {
            strategy: strategy.clone(),
            asset: asset.clone(),
            requested: raw,
            received,
        });
        Ok(received)
    }

    /// Recognize yield by raising supply to the measured backing
    pub fn rebase(&mut self) -> VaultResult<RebaseReport> {
        let _in_flight = self.guard.enter()?;
        if self.rebase_paused {
            return Err(VaultError::RebasePaused);
        }
        let report = self.rebase_pass()?;
        self.flush_token_events();
        Ok(report)
    }

    // ========================================
    // Admin surface
    // ========================================

    pub fn add_asset(&mut self, asset: Asset) -> VaultResult<()> {
        log::info!("Added asset {} ({} decimals)", asset.id, asset.decimals);
        self.ledger.add_asset(asset)
    }

    pub fn set_asset_accepted(&mut self, asset: &AssetId, accepted: bool) -> VaultResult<()> {
        self.ledger.set_accepted(asset, accepted)
    }

    pub fn register_strategy(
        &mut self,
        id: StrategyId,
        handle: Box<dyn Strategy>,
        accepted_assets: impl IntoIterator<Item = AssetId>,
        capabilities: Capabilities,
    ) -> VaultResult<()> {
        self.registry
            .register(id.clone(), handle, accepted_assets, capabilities)?;
        self.events
            .push(VaultEvent::StrategyRegistered { strategy: id });
        Ok(())
    }

    pub fn deactivate_strategy(&mut self, id: &StrategyId) -> VaultResult<()> {
        self.registry.deactivate(id)?;
        self.events.push(VaultEvent::StrategyDeactivated {
            strategy: id.clone(),
        });
        Ok(())
    }

    pub fn activate_strategy(&mut self, id: &StrategyId) -> VaultResult<()> {
        self.registry.activate(id)?;
        self.events.push(VaultEvent::StrategyActivated {
            strategy: id.clone(),
        });
        Ok(())
    }

    /// Remove an emptied strategy and clear any asset default pointing at it
    pub fn remove_strategy(&mut self, id: &StrategyId) -> VaultResult<Box<dyn Strategy>> {
        let _in_flight = self.guard.enter()?;
        let handle = self.registry.remove(id)?;
        self.ledger.clear_default_strategy(id);
        self.events.push(VaultEvent::StrategyRemoved {
            strategy: id.clone(),
        });
        Ok(handle)
    }

    /// Point `asset` at a registered strategy that accepts it, or clear it
    pub fn set_default_strategy(
        &mut self,
        asset: &AssetId,
        strategy: Option<StrategyId>,
    ) -> VaultResult<()> {
        if let Some(id) = &strategy {
            if !self.registry.get(id)?.accepts(asset) {
                return Err(VaultError::UnsupportedAsset {
                    strategy: id.clone(),
                    asset: asset.clone(),
                });
            }
        }
        self.ledger.set_default_strategy(asset, strategy)
    }

    pub fn set_withdrawal_order(&mut self, order: WithdrawalOrder) {
        self.params.withdrawal_order = order.clone();
        self.policy.withdrawal_order = order;
    }

    pub fn set_params(&mut self, params: VaultParams) {
        self.params = params.sanitized();
        self.policy.withdrawal_order = self.params.withdrawal_order.clone();
    }

    pub fn pause_capital(&mut self) {
        self.set_paused(true, self.rebase_paused);
    }

    pub fn unpause_capital(&mut self) {
        self.set_paused(false, self.rebase_paused);
    }

    pub fn pause_rebase(&mut self) {
        self.set_paused(self.capital_paused, true);
    }

    pub fn unpause_rebase(&mut self) {
        self.set_paused(self.capital_paused, false);
    }

    pub fn opt_out(&mut self, holder: &HolderId) -> VaultResult<()> {
        self.token.opt_out(holder)?;
        self.events.push(VaultEvent::RebaseOptOut {
            holder: holder.clone(),
        });
        Ok(())
    }

    pub fn opt_in(&mut self, holder: &HolderId) -> VaultResult<()> {
        self.token.opt_in(holder)?;
        self.events.push(VaultEvent::RebaseOptIn {
            holder: holder.clone(),
        });
        Ok(())
    }

    pub fn transfer(&mut self, from: &HolderId, to: &HolderId, amount: u128) -> VaultResult<()> {
        let _in_flight = self.guard.enter()?;
        self.token.transfer(from, to, amount)?;
        self.flush_token_events();
        Ok(())
    }

    // ========================================
    // Passes (run with the guard held)
    // ========================================

    fn allocate_pass(&mut self) -> VaultResult<AllocationReport> {
        let mut report = AllocationReport::default();

        for asset in self.ledger.ids() {
            let idle = self.idle_reserve(&asset);
            if idle == 0 {
                continue;
            }
            let Some(target) = self
                .policy
                .select_deposit_target(&self.ledger, &self.registry, &asset)
            else {
                continue;
            };

            let buffer = if self.params.vault_buffer_bps > 0 {
                let backing = add_u128(idle, self.strategy_holdings_raw(&asset));
                bps_of(backing, self.params.vault_buffer_bps)?
            } else {
                0
            };
            let offered = sub_u128(idle, buffer);
            if offered == 0 {
                continue;
            }

            // Decrement before the external call
            self.idle.insert(asset.clone(), idle - offered);

            match self.registry.deposit(&target, &asset, offered) {
                Ok(accepted) => {
                    self.credit_idle(&asset, offered - accepted);
                    log::info!(
                        "Allocate: {} {} -> {} (offered {})",
                        accepted,
                        asset,
                        target,
                        offered
                    );
                    self.events.push(VaultEvent::Allocated {
                        asset: asset.clone(),
                        strategy: target.clone(),
                        offered,
                        accepted,
                    });
                    report.allocated.push(AllocationLeg {
                        asset,
                        strategy: target,
                        offered,
                        accepted,
                    });
                }
                Err(e) => {
                    self.credit_idle(&asset, offered);
                    log::warn!("Allocate: {} into {} skipped: {}", asset, target, e);
                    self.events.push(VaultEvent::AllocationSkipped {
                        asset: asset.clone(),
                        strategy: target.clone(),
                        reason: e.to_string(),
                    });
                    report.skipped.push((asset, target));
                }
            }
        }

        Ok(report)
    }

    fn rebase_pass(&mut self) -> VaultResult<RebaseReport> {
        let backing = self.measure_backing(true)?;
        for (strategy, asset, canonical) in backing.checkpoints.iter() {
            self.registry.record_checkpoint(strategy, asset, *canonical)?;
        }
        for strategy in backing.degraded.iter() {
            log::warn!("Rebase: strategy {} excluded (degraded)", strategy);
        }

        let previous_supply = self.token.total_supply()?;
        let mut target = backing.total;
        let mut recognized = sub_u128(backing.total, previous_supply);

        if self.params.max_yield_bps_per_rebase > 0 {
            let cap = bps_of(previous_supply, self.params.max_yield_bps_per_rebase)?;
            if recognized > cap {
                recognized = cap;
                target = add_u128(previous_supply, cap);
            }
        }

        let trustee_fee = match &self.params.trustee {
            Some(trustee) if recognized > 0 && self.token.rebasing_credits() > 0 => {
                let fee = bps_of(recognized, self.params.trustee_fee_bps)?;
                (fee > 0).then(|| (trustee.clone(), fee))
            }
            _ => None,
        };

        let outcome = match trustee_fee.clone() {
            Some((trustee, fee)) => {
                let checkpoint = self.token.checkpoint(&trustee);
                self.token.mint(&trustee, fee)?;
                match self.token.rebase(target) {
                    Ok(outcome) => {
                        self.events
                            .push(VaultEvent::TrusteeFeeMinted { trustee, amount: fee });
                        outcome
                    }
                    Err(e) => {
                        self.token.restore(checkpoint);
                        return Err(e);
                    }
                }
            }
            None => self.token.rebase(target)?,
        };

        let new_supply = outcome.supply();
        log::info!(
            "Rebase: value {} supply {} -> {} ({} degraded)",
            backing.total,
            previous_supply,
            new_supply,
            backing.degraded.len()
        );
        self.events.push(VaultEvent::Rebased {
            previous_supply,
            new_supply,
            total_value: backing.total,
            degraded: backing.degraded.clone(),
        });

        Ok(RebaseReport {
            total_value: backing.total,
            previous_supply,
            new_supply,
            recognized_yield: recognized,
            trustee_fee: trustee_fee.map_or(0, |(_, fee)| fee),
            degraded: backing.degraded,
            outcome,
        })
    }

    /// Runs after the burn; any error makes the caller restore the token
    fn redeem(
        &mut self,
        holder: &HolderId,
        amount: u128,
        min_out: u128,
        pulls: &mut Vec<Pull>,
    ) -> VaultResult<Payout> {
        let fee = self.params.redeem_fee(amount)?;
        let net = sub_u128(amount, fee);
        let outputs = self.redeem_outputs(net)?;

        // Bring each output's liquidity into idle; nothing is paid out yet
        let mut payouts = Vec::with_capacity(outputs.len());
        let mut total_out = 0u128;
        for (asset, need) in outputs {
            if need == 0 {
                continue;
            }
            let tolerance = bps_of(need, self.params.max_shortfall_bps)?;
            let idle = self.idle_reserve(&asset);
            if idle < need {
                self.liquidate(&asset, need - idle, tolerance, pulls)?;
            }

            let available = self.idle_reserve(&asset);
            let paid = min_u128(need, available);
            if need - paid > tolerance {
                return Err(VaultError::InsufficientLiquidity {
                    asset,
                    requested: need,
                    available,
                });
            }
            total_out = checked_add(total_out, self.ledger.get(&asset)?.normalize(paid)?)?;
            payouts.push((asset, paid));
        }

        if total_out < min_out {
            return Err(VaultError::SlippageExceeded {
                actual: total_out,
                minimum: min_out,
            });
        }

        for (asset, paid) in payouts.iter() {
            let idle = self.idle_reserve(asset);
            self.idle.insert(asset.clone(), sub_u128(idle, *paid));
        }

        log::info!(
            "Withdraw: {} burned {} (fee {}) -> {:?}",
            holder,
            amount,
            fee,
            payouts
        );
        self.events.push(VaultEvent::Withdrawn {
            holder: holder.clone(),
            burned: amount,
            fee,
            outputs: payouts.clone(),
        });

        Ok(Payout {
            holder: holder.clone(),
            burned: amount,
            fee,
            outputs: payouts,
            total_out,
        })
    }

    /// Raw amount owed per asset for `net` canonical
    fn redeem_outputs(&self, net: u128) -> VaultResult<Vec<(AssetId, u128)>> {
        match &self.params.redeem_policy {
            RedeemPolicy::DefaultAsset(id) => {
                let asset = self.ledger.get(id)?;
                Ok(vec![(id.clone(), asset.denormalize(net)?)])
            }
            RedeemPolicy::ProRata => {
                let mut backing = Vec::with_capacity(self.ledger.len());
                let mut total = 0u128;
                for asset in self.ledger.iter() {
                    let raw = add_u128(
                        self.idle_reserve(&asset.id),
                        self.strategy_holdings_raw(&asset.id),
                    );
                    let canonical = asset.normalize(raw)?;
                    total = checked_add(total, canonical)?;
                    backing.push((asset, canonical));
                }

                if total == 0 {
                    let asset = self
                        .ledger
                        .ids()
                        .into_iter()
                        .next()
                        .ok_or(VaultError::Arithmetic("no backing assets registered"))?;
                    return Err(VaultError::InsufficientLiquidity {
                        asset,
                        requested: net,
                        available: 0,
                    });
                }

                backing
                    .into_iter()
                    .map(|(asset, canonical)| -> VaultResult<(AssetId, u128)> {
                        let share = mul_div_floor(net, canonical, total)?;
                        Ok((asset.id.clone(), asset.denormalize(share)?))
                    })
                    .collect()
            }
        }
    }

    /// Pull `amount` raw units of `asset` from strategies into idle.
    ///
    /// A failing leg is skipped and the remainder is re-planned without it.
    /// The failure is hard only when that strategy is the sole holder of the
    /// asset able to pay out.
    fn liquidate(
        &mut self,
        asset: &AssetId,
        amount: u128,
        tolerance: u128,
        pulls: &mut Vec<Pull>,
    ) -> VaultResult<()> {
        let sole_source = self.withdrawal_sources(asset) == 1;
        let mut failed: Vec<StrategyId> = Vec::new();
        let mut remaining = amount;

        while remaining > 0 {
            let plan = self.policy.select_withdrawal_sources_excluding(
                &self.registry,
                asset,
                remaining,
                tolerance,
                &failed,
            )?;
            if plan.is_empty() {
                break;
            }

            let mut skipped = false;
            for leg in plan.legs() {
                if remaining == 0 {
                    break;
                }
                match self.pull_leg(leg, asset, remaining) {
                    Ok(received) => {
                        remaining = sub_u128(remaining, received);
                        if received > 0 {
                            pulls.push((leg.strategy.clone(), asset.clone(), received));
                        }
                    }
                    Err(e) if sole_source => return Err(e),
                    Err(e) => {
                        log::warn!("Withdraw: skipping {} for {}: {}", leg.strategy, asset, e);
                        self.events.push(VaultEvent::StrategyPullSkipped {
                            strategy: leg.strategy.clone(),
                            asset: asset.clone(),
                            reason: e.to_string(),
                        });
                        failed.push(leg.strategy.clone());
                        skipped = true;
                    }
                }
            }

            // Short legs without failures cannot be improved by re-planning
            if !skipped {
                break;
            }
        }
        Ok(())
    }

    /// Strategies that can pay out `asset` and report a positive balance
    fn withdrawal_sources(&self, asset: &AssetId) -> usize {
        self.registry
            .iter()
            .filter(|e| e.can_withdraw(asset))
            .filter(|e| {
                self.registry
                    .reported_balance_raw(&e.id, asset)
                    .map_or(false, |held| held > 0)
            })
            .count()
    }

    /// Execute one planned leg, re-validated against the live balance
    fn pull_leg(&mut self, leg: &WithdrawalLeg, asset: &AssetId, remaining: u128) -> VaultResult<u128> {
        let live = self.registry.reported_balance_raw(&leg.strategy, asset)?;
        let pull = min_u128(min_u128(leg.amount, live), remaining);
        if pull == 0 {
            return Ok(0);
        }

        let received = self.registry.withdraw(&leg.strategy, asset, pull)?;
        self.credit_idle(asset, received);
        log::debug!("Withdraw: pulled {}/{} {} from {}", received, pull, asset, leg.strategy);
        self.events.push(VaultEvent::StrategyPulled {
            strategy: leg.strategy.clone(),
            asset: asset.clone(),
            requested: pull,
            received,
        });
        Ok(received)
    }

    /// Return the pulls of a failed withdrawal to their strategies, newest
    /// first. Whatever a strategy refuses stays in idle reserve.
    fn unwind_pulls(&mut self, pulls: Vec<Pull>) {
        for (strategy, asset, received) in pulls.into_iter().rev() {
            let returned = match self.registry.return_funds(&strategy, &asset, received) {
                Ok(returned) => returned,
                Err(e) => {
                    log::warn!("Unwind: {} refused {} {}: {}", strategy, received, asset, e);
                    0
                }
            };
            let idle = self.idle_reserve(&asset);
            self.idle.insert(asset.clone(), sub_u128(idle, returned));
            if returned < received {
                log::warn!(
                    "Unwind: {} {} kept idle after {} took back {}",
                    received - returned,
                    asset,
                    strategy,
                    returned
                );
            }
        }
    }

    // ========================================
    // Internals
    // ========================================

    /// Rebase passes count only active strategies; solvency counts them all
    fn measure_backing(&self, active_only: bool) -> VaultResult<Backing> {
        let mut total = 0u128;
        for asset in self.ledger.iter() {
            total = checked_add(total, asset.normalize(self.idle_reserve(&asset.id))?)?;
        }

        let mut degraded = Vec::new();
        let mut checkpoints = Vec::new();
        'strategies: for entry in self.registry.iter().filter(|e| e.active || !active_only) {
            let mut subtotal = 0u128;
            let mut observed = Vec::with_capacity(entry.accepted_assets.len());
            for asset_id in entry.accepted_assets.iter() {
                let Ok(asset) = self.ledger.get(asset_id) else {
                    continue;
                };
                match self.registry.reported_balance(&entry.id, asset) {
                    Ok(canonical) => {
                        subtotal = checked_add(subtotal, canonical)?;
                        observed.push((entry.id.clone(), asset_id.clone(), canonical));
                    }
                    Err(e) => {
                        log::debug!("Balance query on {} failed: {}", entry.id, e);
                        degraded.push(entry.id.clone());
                        continue 'strategies;
                    }
                }
            }
            total = checked_add(total, subtotal)?;
            checkpoints.extend(observed);
        }

        Ok(Backing {
            total,
            degraded,
            checkpoints,
        })
    }

    /// Raw amount of `asset` held across all strategies; failed queries count as zero
    fn strategy_holdings_raw(&self, asset: &AssetId) -> u128 {
        self.registry
            .iter()
            .filter(|e| e.accepts(asset))
            .filter_map(|e| self.registry.reported_balance_raw(&e.id, asset).ok())
            .fold(0u128, add_u128)
    }

    fn credit_idle(&mut self, asset: &AssetId, raw: u128) {
        if raw == 0 {
            return;
        }
        let idle = self.idle_reserve(asset);
        self.idle.insert(asset.clone(), add_u128(idle, raw));
    }

    fn set_paused(&mut self, capital_paused: bool, rebase_paused: bool) {
        self.capital_paused = capital_paused;
        self.rebase_paused = rebase_paused;
        log::info!(
            "Pause flags: capital={} rebase={}",
            capital_paused,
            rebase_paused
        );
        self.events.push(VaultEvent::PauseChanged {
            capital_paused,
            rebase_paused,
        });
    }

    fn flush_token_events(&mut self) {
        self.events
            .extend(self.token.drain_events().into_iter().map(VaultEvent::from));
    }
}
