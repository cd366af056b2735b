//! Rebasing supply token
//!
//! Rebasing holders own credits; their token balance is
//! `credits / rebasing_credits_per_token`. A rebase lowers the global ratio, so
//! every rebasing balance grows proportionally without touching any account.
//! Holders that opted out keep a fixed token amount and a snapshot of the
//! ratio they were frozen at.
//!
//! Key invariants:
//! - `rebasing_credits_per_token` never increases
//! - A rebase never decreases total supply
//! - Sum of resolved balances <= total supply, short by at most one unit per holder

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};
use crate::math::{checked_add, checked_sub, min_u128, mul_div_ceil, mul_div_floor, sub_u128};
use crate::types::{HolderId, CREDITS_RESOLUTION, INITIAL_CREDITS_PER_TOKEN};

/// Per-holder balance representation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HolderBalance {
    /// Share of the rebasing credits pool
    Rebasing { credits: u128 },
    /// Opted out of rebasing: fixed token amount plus the ratio at opt-out
    Fixed {
        tokens: u128,
        frozen_credits_per_token: u128,
    },
}

impl Default for HolderBalance {
    fn default() -> Self {
        HolderBalance::Rebasing { credits: 0 }
    }
}

impl HolderBalance {
    pub fn is_rebasing(&self) -> bool {
        matches!(self, HolderBalance::Rebasing { .. })
    }

    /// Resolve the token balance against the live ratio (floor)
    pub fn resolve(&self, credits_per_token: u128) -> VaultResult<u128> {
        match *self {
            HolderBalance::Rebasing { credits } => {
                mul_div_floor(credits, CREDITS_RESOLUTION, credits_per_token)
            }
            HolderBalance::Fixed { tokens, .. } => Ok(tokens),
        }
    }
}

/// Result of a rebase pass on the token
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RebaseOutcome {
    Increased { previous_supply: u128, new_supply: u128 },
    Unchanged { supply: u128 },
}

impl RebaseOutcome {
    pub fn supply(&self) -> u128 {
        match *self {
            RebaseOutcome::Increased { new_supply, .. } => new_supply,
            RebaseOutcome::Unchanged { supply } => supply,
        }
    }
}

/// Emitted whenever a holder's resolved balance changes through mint or burn
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BalanceChange {
    pub holder: HolderId,
    pub balance: u128,
}

/// Snapshot of the global fields plus one holder's entry
#[derive(Clone, Debug)]
pub struct SupplyCheckpoint {
    holder: HolderId,
    entry: Option<HolderBalance>,
    rebasing_credits: u128,
    rebasing_credits_per_token: u128,
    non_rebasing_supply: u128,
    events_len: usize,
}

#[derive(Clone, Debug)]
pub struct SupplyToken {
    accounts: BTreeMap<HolderId, HolderBalance>,
    rebasing_credits: u128,
    rebasing_credits_per_token: u128,
    non_rebasing_supply: u128,
    events: Vec<BalanceChange>,
}

impl Default for SupplyToken {
    fn default() -> Self {
        Self {
            accounts: BTreeMap::new(),
            rebasing_credits: 0,
            rebasing_credits_per_token: INITIAL_CREDITS_PER_TOKEN,
            non_rebasing_supply: 0,
            events: Vec::new(),
        }
    }
}

impl SupplyToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rebasing_credits_per_token(&self) -> u128 {
        self.rebasing_credits_per_token
    }

    pub fn rebasing_credits(&self) -> u128 {
        self.rebasing_credits
    }

    pub fn non_rebasing_supply(&self) -> u128 {
        self.non_rebasing_supply
    }

    /// Rebasing credits resolved at the live ratio plus the fixed pool
    pub fn total_supply(&self) -> VaultResult<u128> {
        let rebasing = mul_div_floor(
            self.rebasing_credits,
            CREDITS_RESOLUTION,
            self.rebasing_credits_per_token,
        )?;
        checked_add(rebasing, self.non_rebasing_supply)
    }

    pub fn balance_of(&self, holder: &HolderId) -> VaultResult<u128> {
        match self.accounts.get(holder) {
            Some(entry) => entry.resolve(self.rebasing_credits_per_token),
            None => Ok(0),
        }
    }

    /// Credits held, expressed at the holder's own ratio
    pub fn credits_of(&self, holder: &HolderId) -> VaultResult<(u128, u128)> {
        match self.accounts.get(holder) {
            Some(HolderBalance::Rebasing { credits }) => {
                Ok((*credits, self.rebasing_credits_per_token))
            }
            Some(HolderBalance::Fixed {
                tokens,
                frozen_credits_per_token,
            }) => Ok((
                mul_div_floor(*tokens, *frozen_credits_per_token, CREDITS_RESOLUTION)?,
                *frozen_credits_per_token,
            )),
            None => Ok((0, self.rebasing_credits_per_token)),
        }
    }

    pub fn account(&self, holder: &HolderId) -> Option<&HolderBalance> {
        self.accounts.get(holder)
    }

    pub fn is_rebasing(&self, holder: &HolderId) -> bool {
        self.accounts
            .get(holder)
            .map_or(true, HolderBalance::is_rebasing)
    }

    pub fn holders(&self) -> impl Iterator<Item = (&HolderId, &HolderBalance)> {
        self.accounts.iter()
    }

    pub fn holder_count(&self) -> usize {
        self.accounts.len()
    }

    /// Mint `amount` tokens to `holder`
    pub fn mint(&mut self, holder: &HolderId, amount: u128) -> VaultResult<()> {
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let cpt = self.rebasing_credits_per_token;
        let entry = self.accounts.get(holder).copied().unwrap_or_default();

        let updated = match entry {
            HolderBalance::Rebasing { credits } => {
                let delta = mul_div_floor(amount, cpt, CREDITS_RESOLUTION)?;
                let credits = checked_add(credits, delta)?;
                self.rebasing_credits = checked_add(self.rebasing_credits, delta)?;
                HolderBalance::Rebasing { credits }
            }
            HolderBalance::Fixed {
                tokens,
                frozen_credits_per_token,
            } => {
                let tokens = checked_add(tokens, amount)?;
                self.non_rebasing_supply = checked_add(self.non_rebasing_supply, amount)?;
                HolderBalance::Fixed {
                    tokens,
                    frozen_credits_per_token,
                }
            }
        };

        self.accounts.insert(holder.clone(), updated);
        self.record(holder, updated)
    }

    /// Burn `amount` tokens from `holder`
    pub fn burn(&mut self, holder: &HolderId, amount: u128) -> VaultResult<()> {
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let cpt = self.rebasing_credits_per_token;
        let entry = self.accounts.get(holder).copied().unwrap_or_default();
        let available = entry.resolve(cpt)?;
        if available < amount {
            return Err(VaultError::InsufficientBalance {
                holder: holder.clone(),
                requested: amount,
                available,
            });
        }

        let updated = match entry {
            HolderBalance::Rebasing { credits } => {
                // Full burns clear dust; partial burns round the credit cost up
                let delta = if amount == available {
                    credits
                } else {
                    min_u128(mul_div_ceil(amount, cpt, CREDITS_RESOLUTION)?, credits)
                };
                self.rebasing_credits = sub_u128(self.rebasing_credits, delta);
                HolderBalance::Rebasing {
                    credits: credits - delta,
                }
            }
            HolderBalance::Fixed {
                tokens,
                frozen_credits_per_token,
            } => {
                self.non_rebasing_supply = sub_u128(self.non_rebasing_supply, amount);
                HolderBalance::Fixed {
                    tokens: tokens - amount,
                    frozen_credits_per_token,
                }
            }
        };

        self.accounts.insert(holder.clone(), updated);
        self.record(holder, updated)
    }

    /// Move `amount` tokens between holders
    pub fn transfer(&mut self, from: &HolderId, to: &HolderId, amount: u128) -> VaultResult<()> {
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        if from == to {
            let available = self.balance_of(from)?;
            if available < amount {
                return Err(VaultError::InsufficientBalance {
                    holder: from.clone(),
                    requested: amount,
                    available,
                });
            }
            return Ok(());
        }

        let checkpoint = self.checkpoint(from);
        self.burn(from, amount)?;
        if let Err(e) = self.mint(to, amount) {
            self.restore(checkpoint);
            return Err(e);
        }
        Ok(())
    }

    /// Distribute the surplus of `new_total_value` over current supply to
    /// rebasing holders. Never lowers supply.
    pub fn rebase(&mut self, new_total_value: u128) -> VaultResult<RebaseOutcome> {
        let previous_supply = self.total_supply()?;
        if new_total_value <= previous_supply || self.rebasing_credits == 0 {
            return Ok(RebaseOutcome::Unchanged {
                supply: previous_supply,
            });
        }

        // new_total_value > previous_supply >= non_rebasing_supply
        let rebasing_supply = checked_sub(new_total_value, self.non_rebasing_supply)?;

        // Round the ratio up so the resolved supply never exceeds the backing
        let cpt = mul_div_ceil(self.rebasing_credits, CREDITS_RESOLUTION, rebasing_supply)?;
        if cpt >= self.rebasing_credits_per_token {
            return Ok(RebaseOutcome::Unchanged {
                supply: previous_supply,
            });
        }

        self.rebasing_credits_per_token = cpt;
        let new_supply = self.total_supply()?;
        Ok(RebaseOutcome::Increased {
            previous_supply,
            new_supply,
        })
    }

    /// Freeze `holder` at the live ratio; later rebases no longer touch it
    pub fn opt_out(&mut self, holder: &HolderId) -> VaultResult<()> {
        let entry = self.accounts.get(holder).copied().unwrap_or_default();
        let credits = match entry {
            HolderBalance::Rebasing { credits } => credits,
            HolderBalance::Fixed { .. } => return Err(VaultError::AlreadyInMode(holder.clone())),
        };

        let tokens = entry.resolve(self.rebasing_credits_per_token)?;
        self.non_rebasing_supply = checked_add(self.non_rebasing_supply, tokens)?;
        self.rebasing_credits = sub_u128(self.rebasing_credits, credits);
        self.accounts.insert(
            holder.clone(),
            HolderBalance::Fixed {
                tokens,
                frozen_credits_per_token: self.rebasing_credits_per_token,
            },
        );
        Ok(())
    }

    /// Convert a fixed holder back into rebasing credits at the live ratio
    pub fn opt_in(&mut self, holder: &HolderId) -> VaultResult<()> {
        let tokens = match self.accounts.get(holder) {
            Some(HolderBalance::Fixed { tokens, .. }) => *tokens,
            _ => return Err(VaultError::AlreadyInMode(holder.clone())),
        };

        let credits = mul_div_floor(tokens, self.rebasing_credits_per_token, CREDITS_RESOLUTION)?;
        self.rebasing_credits = checked_add(self.rebasing_credits, credits)?;
        self.non_rebasing_supply = sub_u128(self.non_rebasing_supply, tokens);
        self.accounts
            .insert(holder.clone(), HolderBalance::Rebasing { credits });
        Ok(())
    }

    pub fn checkpoint(&self, holder: &HolderId) -> SupplyCheckpoint {
        SupplyCheckpoint {
            holder: holder.clone(),
            entry: self.accounts.get(holder).copied(),
            rebasing_credits: self.rebasing_credits,
            rebasing_credits_per_token: self.rebasing_credits_per_token,
            non_rebasing_supply: self.non_rebasing_supply,
            events_len: self.events.len(),
        }
    }

    /// Roll back to `checkpoint`. Only valid when no other holder was touched
    /// since it was taken.
    pub fn restore(&mut self, checkpoint: SupplyCheckpoint) {
        match checkpoint.entry {
            Some(entry) => {
                self.accounts.insert(checkpoint.holder, entry);
            }
            None => {
                self.accounts.remove(&checkpoint.holder);
            }
        }
        self.rebasing_credits = checkpoint.rebasing_credits;
        self.rebasing_credits_per_token = checkpoint.rebasing_credits_per_token;
        self.non_rebasing_supply = checkpoint.non_rebasing_supply;
        self.events.truncate(checkpoint.events_len);
    }

    pub fn drain_events(&mut self) -> Vec<BalanceChange> {
        std::mem::take(&mut self.events)
    }

    fn record(&mut self, holder: &HolderId, entry: HolderBalance) -> VaultResult<()> {
        let balance = entry.resolve(self.rebasing_credits_per_token)?;
        self.events.push(BalanceChange {
            holder: holder.clone(),
            balance,
        });
        Ok(())
    }
}
