//! Structured domain events recorded by the vault

use serde::Serialize;

use crate::supply::BalanceChange;
use crate::types::{AssetId, HolderId, StrategyId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum VaultEvent {
    BalanceChanged {
        holder: HolderId,
        balance: u128,
    },
    Deposited {
        holder: HolderId,
        asset: AssetId,
        raw: u128,
        minted: u128,
    },
    Withdrawn {
        holder: HolderId,
        burned: u128,
        fee: u128,
        outputs: Vec<(AssetId, u128)>,
    },
    Allocated {
        asset: AssetId,
        strategy: StrategyId,
        offered: u128,
        accepted: u128,
    },
    /// Strategy refused an allocation; funds stayed idle
    AllocationSkipped {
        asset: AssetId,
        strategy: StrategyId,
        reason: String,
    },
    StrategyPulled {
        strategy: StrategyId,
        asset: AssetId,
        requested: u128,
        received: u128,
    },
    /// A leg of a multi-strategy sweep failed and was skipped
    StrategyPullSkipped {
        strategy: StrategyId,
        asset: AssetId,
        reason: String,
    },
    Rebased {
        previous_supply: u128,
        new_supply: u128,
        total_value: u128,
        degraded: Vec<StrategyId>,
    },
    TrusteeFeeMinted {
        trustee: HolderId,
        amount: u128,
    },
    StrategyRegistered {
        strategy: StrategyId,
    },
    StrategyDeactivated {
        strategy: StrategyId,
    },
    StrategyActivated {
        strategy: StrategyId,
    },
    StrategyRemoved {
        strategy: StrategyId,
    },
    PauseChanged {
        capital_paused: bool,
        rebase_paused: bool,
    },
    RebaseOptOut {
        holder: HolderId,
    },
    RebaseOptIn {
        holder: HolderId,
    },
}

impl From<BalanceChange> for VaultEvent {
    fn from(change: BalanceChange) -> Self {
        VaultEvent::BalanceChanged {
            holder: change.holder,
            balance: change.balance,
        }
    }
}
