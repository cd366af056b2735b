//! Accounting and strategy-allocation engine for a rebasing, collateral-backed
//! stablecoin vault.
//!
//! Pure Rust, no I/O. Every public vault operation is all-or-nothing and
//! serialized behind a single in-flight guard.

pub mod types;
pub mod error;
pub mod math;
pub mod asset;
pub mod supply;
pub mod strategy;
pub mod allocation;
pub mod events;
pub mod params;
pub mod guard;
pub mod vault;
pub mod helpers;

// Re-export commonly used types
pub use types::*;
pub use error::*;
pub use asset::{Asset, AssetLedger};
pub use supply::{HolderBalance, RebaseOutcome, SupplyToken};
pub use strategy::{Capabilities, InMemoryStrategy, Strategy, StrategyRegistry};
pub use allocation::{AllocationPolicy, WithdrawalLeg, WithdrawalOrder, WithdrawalPlan};
pub use events::VaultEvent;
pub use guard::ReentrancyGuard;
pub use params::{RedeemPolicy, VaultParams};
pub use vault::{
    AllocationLeg, AllocationReport, Payout, RebaseReport, StrategySnapshot, Vault, VaultSnapshot,
};
