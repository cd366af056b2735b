//! Adversarial step generator over a one-asset, one-strategy vault

use std::sync::{Arc, Mutex};

#[cfg(kani)]
use kani::any;
use vault_core::{
    Asset, AssetId, Capabilities, InMemoryStrategy, StrategyId, Vault, VaultParams,
    CREDITS_RESOLUTION,
};

use crate::sanitizer::{holder, N_HOLDERS};

pub const ASSET: &str = "USD";
pub const STRATEGY: &str = "venue";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Deposit,
    Withdraw,
    Allocate,
    Accrue,
    Loss,
    Rebase,
    OptOut,
    Transfer,
}

#[cfg(kani)]
impl kani::Arbitrary for Step {
    fn any() -> Self {
        let choice: u8 = any();
        match choice % 8 {
            0 => Step::Deposit,
            1 => Step::Withdraw,
            2 => Step::Allocate,
            3 => Step::Accrue,
            4 => Step::Loss,
            5 => Step::Rebase,
            6 => Step::OptOut,
            _ => Step::Transfer,
        }
    }
}

/// Vault plus a handle on its only strategy
pub struct World {
    pub vault: Vault,
    pub strategy: Arc<Mutex<InMemoryStrategy>>,
}

impl World {
    pub fn new() -> Self {
        let asset = AssetId::from(ASSET);
        let mut vault = Vault::new(VaultParams::default());
        let strategy = Arc::new(Mutex::new(InMemoryStrategy::new([asset.clone()])));

        // Fresh ledger and registry: neither call can fail
        let _ = vault.add_asset(Asset::new(ASSET, 18).with_default_strategy(STRATEGY));
        let _ = vault.register_strategy(
            StrategyId::from(STRATEGY),
            Box::new(strategy.clone()),
            [asset],
            Capabilities::default(),
        );
        Self { vault, strategy }
    }

    pub fn asset(&self) -> AssetId {
        AssetId::from(ASSET)
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply one step; `amount` is whole tokens. Rejected operations are
/// expected and leave the world unchanged.
pub fn apply(world: &mut World, step: Step, actor: usize, amount: u128) {
    let actor = actor % N_HOLDERS;
    let who = holder(actor);
    let scaled = amount * CREDITS_RESOLUTION;
    let asset = world.asset();

    match step {
        Step::Deposit => {
            let _ = world.vault.deposit(&who, &asset, scaled, 0);
        }
        Step::Withdraw => {
            let _ = world.vault.withdraw(&who, scaled, 0);
        }
        Step::Allocate => {
            let _ = world.vault.allocate();
        }
        Step::Accrue => {
            if let Ok(mut s) = world.strategy.lock() {
                s.accrue_yield(&asset, scaled);
            }
        }
        Step::Loss => {
            if let Ok(mut s) = world.strategy.lock() {
                s.realize_loss(&asset, scaled);
            }
        }
        Step::Rebase => {
            let _ = world.vault.rebase();
        }
        Step::OptOut => {
            if world.vault.opt_out(&who).is_err() {
                let _ = world.vault.opt_in(&who);
            }
        }
        Step::Transfer => {
            let to = holder((actor + 1) % N_HOLDERS);
            let _ = world.vault.transfer(&who, &to, scaled);
        }
    }
}

#[cfg(kani)]
pub fn adversary_step(world: &mut World) {
    let step: Step = any();
    let actor: u8 = any();
    apply(world, step, actor as usize, crate::generators::any_amount());
}
