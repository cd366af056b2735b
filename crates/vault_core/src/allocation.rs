//! Deposit-target selection and withdrawal-source planning
//!
//! Planning is pure: it reads the registry and asset table and returns a
//! plan. The vault executes the plan and re-validates every leg against the
//! strategy's live balance.

use arrayvec::ArrayVec;
use serde::{Deserialize, Serialize};

use crate::asset::AssetLedger;
use crate::error::{VaultError, VaultResult};
use crate::math::{add_u128, min_u128, sub_u128};
use crate::strategy::{StrategyEntry, StrategyRegistry};
use crate::types::{AssetId, StrategyId, MAX_STRATEGIES};

/// Order in which strategies are drained on withdrawal
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalOrder {
    /// Registration order
    #[default]
    Registration,
    /// Most recently registered first
    ReverseRegistration,
    /// Listed strategies first, then the rest in registration order
    Explicit(Vec<StrategyId>),
}

/// One planned pull, in raw asset units
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WithdrawalLeg {
    pub strategy: StrategyId,
    pub amount: u128,
}

/// Ordered liquidation plan for one asset
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WithdrawalPlan {
    legs: ArrayVec<WithdrawalLeg, MAX_STRATEGIES>,
    /// Amount asked of the planner
    pub requested: u128,
    /// Sum of all legs
    pub planned: u128,
}

impl WithdrawalPlan {
    pub fn legs(&self) -> &[WithdrawalLeg] {
        &self.legs
    }

    /// Unmet remainder tolerated by the plan
    pub fn shortfall(&self) -> u128 {
        sub_u128(self.requested, self.planned)
    }

    /// Plan served by exactly one strategy
    pub fn is_single_leg(&self) -> bool {
        self.legs.len() == 1
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPolicy {
    pub withdrawal_order: WithdrawalOrder,
}

impl AllocationPolicy {
    pub fn new(withdrawal_order: WithdrawalOrder) -> Self {
        Self { withdrawal_order }
    }

    /// Default strategy of `asset` when it can take a deposit right now
    pub fn select_deposit_target(
        &self,
        ledger: &AssetLedger,
        registry: &StrategyRegistry,
        asset: &AssetId,
    ) -> Option<StrategyId> {
        let target = ledger.get(asset).ok()?.default_strategy.as_ref()?;
        match registry.get(target) {
            Ok(entry) if entry.can_deposit(asset) => Some(target.clone()),
            _ => None,
        }
    }

    /// Strategies in drain order
    pub fn ordered<'a>(&self, registry: &'a StrategyRegistry) -> Vec<&'a StrategyEntry> {
        match &self.withdrawal_order {
            WithdrawalOrder::Registration => registry.iter().collect(),
            WithdrawalOrder::ReverseRegistration => registry.iter().rev().collect(),
            WithdrawalOrder::Explicit(listed) => {
                let mut ordered: Vec<&StrategyEntry> = Vec::with_capacity(registry.len());
                for id in listed {
                    if let Ok(entry) = registry.get(id) {
                        if !ordered.iter().any(|e| &e.id == id) {
                            ordered.push(entry);
                        }
                    }
                }
                for entry in registry.iter() {
                    if !listed.contains(&entry.id) {
                        ordered.push(entry);
                    }
                }
                ordered
            }
        }
    }

    /// Plan pulls of `amount` raw units of `asset`
    ///
    /// Deactivated strategies are still drained. A strategy whose balance
    /// query fails is left out of the plan. Fails with `InsufficientLiquidity`
    /// when the unmet remainder exceeds `tolerance`.
    pub fn select_withdrawal_sources(
        &self,
        registry: &StrategyRegistry,
        asset: &AssetId,
        amount: u128,
        tolerance: u128,
    ) -> VaultResult<WithdrawalPlan> {
        self.select_withdrawal_sources_excluding(registry, asset, amount, tolerance, &[])
    }

    /// Same as [`Self::select_withdrawal_sources`], never planning a leg on `exclude`
    pub fn select_withdrawal_sources_excluding(
        &self,
        registry: &StrategyRegistry,
        asset: &AssetId,
        amount: u128,
        tolerance: u128,
        exclude: &[StrategyId],
    ) -> VaultResult<WithdrawalPlan> {
        let mut plan = WithdrawalPlan {
            requested: amount,
            ..WithdrawalPlan::default()
        };

        for entry in self.ordered(registry) {
            let remaining = sub_u128(amount, plan.planned);
            if remaining == 0 {
                break;
            }
            if !entry.can_withdraw(asset) || exclude.contains(&entry.id) {
                continue;
            }

            let held = match registry.reported_balance_raw(&entry.id, asset) {
                Ok(held) => held,
                Err(e) => {
                    log::warn!("Planner: skipping {} ({})", entry.id, e);
                    continue;
                }
            };

            let pull = min_u128(held, remaining);
            if pull == 0 {
                continue;
            }
            log::debug!("Planner: {} -> {} {}", entry.id, pull, asset);
            // Capacity matches the registry, so this cannot overflow
            if plan
                .legs
                .try_push(WithdrawalLeg {
                    strategy: entry.id.clone(),
                    amount: pull,
                })
                .is_err()
            {
                break;
            }
            plan.planned = add_u128(plan.planned, pull);
        }

        if plan.shortfall() > tolerance {
            return Err(VaultError::InsufficientLiquidity {
                asset: asset.clone(),
                requested: amount,
                available: plan.planned,
            });
        }
        Ok(plan)
    }
}
