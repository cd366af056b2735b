//! Kani safety proofs for the supply and solvency invariants

use kani::{any, assume};
use vault_core::helpers::{balances_match_supply, solvency_ok, supply_not_decreased};
use vault_core::{VaultError, CREDITS_RESOLUTION};
use crate::{adversary::*, generators::*, sanitizer::*};

/// Rebase never lowers supply and never raises the credits-per-token ratio
#[kani::proof]
#[kani::unwind(4)]
fn rebase_is_monotone() {
    let seed = any_token_seed().sanitize();
    let mut token = seed.build();

    let supply_before = token.total_supply().unwrap();
    let cpt_before = token.rebasing_credits_per_token();

    let outcome = token.rebase(seed.new_value_canonical()).unwrap();

    kani::assert(
        supply_not_decreased(supply_before, outcome.supply()),
        "rebase must never decrease total supply",
    );
    kani::assert(
        token.rebasing_credits_per_token() <= cpt_before,
        "credits per token must never increase",
    );
}

/// Resolved supply after a rebase never exceeds the backing it was given
#[kani::proof]
#[kani::unwind(4)]
fn rebase_never_overshoots_backing() {
    let seed = any_token_seed().sanitize();
    let mut token = seed.build();
    let supply_before = token.total_supply().unwrap();
    assume(seed.new_value_canonical() > supply_before);

    let outcome = token.rebase(seed.new_value_canonical()).unwrap();
    kani::assert(
        outcome.supply() <= seed.new_value_canonical(),
        "rebase must not mint unbacked supply",
    );
    kani::assert(
        balances_match_supply(&token).unwrap(),
        "holder balances must add up to supply within rounding",
    );
}

/// A withdrawal the vault cannot cover leaves the holder's balance intact
#[kani::proof]
fn failed_withdraw_restores_balance() {
    let mut world = World::new();
    let who = holder(0);
    let deposit = any_amount().max(1) * CREDITS_RESOLUTION;
    let loss = any_amount() * CREDITS_RESOLUTION;
    assume(loss > 0 && loss < deposit);

    world
        .vault
        .deposit(&who, &world.asset(), deposit, 0)
        .unwrap();
    apply(&mut world, Step::Allocate, 0, 0);
    apply(&mut world, Step::Loss, 0, loss / CREDITS_RESOLUTION);

    let before = world.vault.balance_of(&who).unwrap();
    let result = world.vault.withdraw(&who, before, 0);

    kani::assert(
        matches!(result, Err(VaultError::InsufficientLiquidity { .. })),
        "uncovered withdrawal must fail with InsufficientLiquidity",
    );
    kani::assert(
        world.vault.balance_of(&who).unwrap() == before,
        "failed withdrawal must roll back the burn",
    );
}

/// Solvency holds across short adversarial sequences without losses
#[kani::proof]
#[kani::unwind(6)]
fn solvency_holds_across_short_adversary_sequences() {
    let mut world = World::new();

    let mut steps: u8 = any();
    steps = (steps % MAX_STEPS) + 1;

    for _ in 0..steps {
        let step: Step = any();
        assume(step != Step::Loss);
        let actor: u8 = any();
        apply(&mut world, step, actor as usize, any_amount());

        kani::assert(
            solvency_ok(&world.vault).unwrap(),
            "backing must cover supply within rounding",
        );
    }
}

/// The in-flight guard is released after an operation fails
#[kani::proof]
fn guard_released_on_error() {
    let mut world = World::new();
    let amount = any_amount();
    let _ = world.vault.withdraw(&holder(0), amount, 0);
    kani::assert(
        !world.vault.reentrancy_guard().is_entered(),
        "guard must be released on every exit path",
    );
}
