//! End-to-end vault scenarios
//!
//! Deposit, allocation, rebase and withdrawal flows against strategy doubles,
//! including the failure paths that must leave balances untouched.

use vault_core::{
    InMemoryStrategy, RebaseOutcome, RedeemPolicy, StrategyId, VaultError, VaultEvent,
    VaultParams, WithdrawalOrder,
};
use vault_core::helpers::solvency_ok;
use vault_integration_tests::*;

/// Deposit 100,000 USDC (6 decimals)
#[test]
fn test_deposit_normalizes_and_mints() {
    println!("========================================");
    println!("Deposit 100,000 USDC");
    println!("========================================");

    let mut h = Harness::new(VaultParams::default());
    let minted = h.deposit_units("alice", &usdc(), 100_000);

    println!("  Minted: {}", minted / ONE);
    assert_eq!(minted, 100_000 * ONE);
    assert_eq!(h.balance("alice"), 100_000 * ONE);
    assert_eq!(h.vault.total_supply().unwrap(), 100_000 * ONE);
    assert_eq!(h.vault.idle_reserve(&usdc()), usd6(100_000));
}

/// Allocation moves idle reserve into the default strategy
#[test]
fn test_allocate_moves_idle_to_strategy() {
    let mut h = Harness::new(VaultParams::default());
    let aave = h.add_strategy("aave", &[usdc()]);
    h.set_default(&usdc(), "aave");
    h.deposit_units("alice", &usdc(), 100_000);

    let report = h.vault.allocate().unwrap();

    assert_eq!(report.total_accepted(), usd6(100_000));
    assert_eq!(h.vault.idle_reserve(&usdc()), 0);
    assert_eq!(aave.balance(&usdc()), usd6(100_000));
    assert_eq!(h.vault.total_value().unwrap(), 100_000 * ONE);
}

/// Partial acceptance leaves the remainder idle
#[test]
fn test_allocate_partial_acceptance() {
    let mut h = Harness::new(VaultParams::default());
    let capped = h.add_strategy_with(
        "capped",
        &[usdc()],
        InMemoryStrategy::new([usdc()]).with_deposit_cap(usd6(60_000)),
    );
    h.set_default(&usdc(), "capped");
    h.deposit_units("alice", &usdc(), 100_000);

    h.vault.allocate().unwrap();

    assert_eq!(capped.balance(&usdc()), usd6(60_000));
    assert_eq!(h.vault.idle_reserve(&usdc()), usd6(40_000));
}

/// Allocation into a failing strategy leaves funds idle and reports the skip
#[test]
fn test_allocate_into_failing_strategy_is_skipped() {
    let mut h = Harness::new(VaultParams::default());
    let aave = h.add_strategy("aave", &[usdc()]);
    h.set_default(&usdc(), "aave");
    h.deposit_units("alice", &usdc(), 1_000);
    aave.fail_deposit(true);

    let report = h.vault.allocate().unwrap();

    assert_eq!(report.skipped, vec![(usdc(), StrategyId::from("aave"))]);
    assert_eq!(h.vault.idle_reserve(&usdc()), usd6(1_000));
    assert!(h
        .vault
        .drain_events()
        .iter()
        .any(|e| matches!(e, VaultEvent::AllocationSkipped { .. })));
}

/// Allocate twice with no deposit in between: the second call is a no-op
#[test]
fn test_allocate_is_idempotent() {
    let mut h = Harness::new(VaultParams {
        vault_buffer_bps: 500,
        ..VaultParams::default()
    });
    let aave = h.add_strategy("aave", &[usdc()]);
    h.set_default(&usdc(), "aave");
    h.deposit_units("alice", &usdc(), 10_000);

    h.vault.allocate().unwrap();
    let idle = h.vault.idle_reserve(&usdc());
    let deployed = aave.balance(&usdc());

    let second = h.vault.allocate().unwrap();

    assert!(second.is_noop());
    assert_eq!(h.vault.idle_reserve(&usdc()), idle);
    assert_eq!(aave.balance(&usdc()), deployed);
    assert_eq!(idle, usd6(500));
}

/// 5% yield, a 10% holder gains 500
#[test]
fn test_rebase_distributes_yield_proportionally() {
    println!("========================================");
    println!("Rebase 100,000 -> 105,000");
    println!("========================================");

    let mut h = Harness::new(VaultParams::default());
    let aave = h.add_strategy("aave", &[usdc()]);
    h.set_default(&usdc(), "aave");
    h.deposit_units("alice", &usdc(), 90_000);
    h.deposit_units("bob", &usdc(), 10_000);
    h.vault.allocate().unwrap();

    aave.accrue(&usdc(), usd6(5_000));
    let report = h.vault.rebase().unwrap();

    println!("  Supply: {} -> {}", report.previous_supply / ONE, report.new_supply / ONE);
    println!("  Bob:    {}", h.balance("bob") / ONE);

    assert!(matches!(report.outcome, RebaseOutcome::Increased { .. }));
    assert!(!report.is_degraded());
    assert!(diff(report.new_supply, 105_000 * ONE) <= 2);
    assert!(report.new_supply <= 105_000 * ONE);
    assert!(diff(h.balance("bob"), 10_500 * ONE) <= 1);
    assert!(diff(h.balance("alice"), 94_500 * ONE) <= 1);
}

/// Backing below supply never rebases down
#[test]
fn test_loss_leaves_supply_unchanged() {
    let mut h = Harness::new(VaultParams::default());
    let aave = h.add_strategy("aave", &[usdc()]);
    h.set_default(&usdc(), "aave");
    h.deposit_units("alice", &usdc(), 1_000);
    h.vault.allocate().unwrap();

    aave.lose(&usdc(), usd6(100));
    let report = h.vault.rebase().unwrap();

    assert_eq!(
        report.outcome,
        RebaseOutcome::Unchanged {
            supply: 1_000 * ONE
        }
    );
    assert_eq!(h.balance("alice"), 1_000 * ONE);
}

/// Withdrawal beyond idle plus strategy balances rolls back
#[test]
fn test_withdraw_beyond_liquidity_rolls_back() {
    println!("========================================");
    println!("Withdraw beyond liquidity");
    println!("========================================");

    let mut h = Harness::new(VaultParams::default());
    let aave = h.add_strategy("aave", &[usdc()]);
    h.set_default(&usdc(), "aave");
    h.deposit_units("alice", &usdc(), 1_000);
    h.vault.allocate().unwrap();
    aave.lose(&usdc(), usd6(100));
    h.vault.drain_events();

    let err = h.vault.withdraw(&holder("alice"), 1_000 * ONE, 0).unwrap_err();

    println!("  Error: {}", err);
    assert_eq!(
        err,
        VaultError::InsufficientLiquidity {
            asset: usdc(),
            requested: usd6(1_000),
            available: usd6(900),
        }
    );
    assert_eq!(h.balance("alice"), 1_000 * ONE);
    assert_eq!(h.vault.total_supply().unwrap(), 1_000 * ONE);
    assert_eq!(aave.balance(&usdc()), usd6(900));
    assert!(h.vault.drain_events().is_empty());
}

/// One of three strategies fails its balance query
#[test]
fn test_degraded_rebase_excludes_failing_strategy() {
    let mut h = Harness::new(VaultParams::default());
    let a = h.add_strategy("a", &[usdc()]);
    let b = h.add_strategy("b", &[usdt()]);
    let c = h.add_strategy("c", &[dai()]);
    h.set_default(&usdc(), "a");
    h.set_default(&usdt(), "b");
    h.set_default(&dai(), "c");

    h.deposit_units("alice", &usdc(), 50_000);
    h.deposit_units("alice", &usdt(), 50_000);
    h.deposit_units("bob", &dai(), 1_000);
    h.vault.allocate().unwrap();

    a.accrue(&usdc(), usd6(2_000));
    b.accrue(&usdt(), usd6(2_000));
    c.fail_balance(true);

    let report = h.vault.rebase().unwrap();

    assert_eq!(report.degraded, vec![StrategyId::from("c")]);
    // c's 1,000 DAI is not counted this pass
    assert_eq!(report.total_value, 104_000 * ONE);
    assert!(diff(report.new_supply, 104_000 * ONE) <= 2);
    assert!(h.balance("bob") > 1_000 * ONE);

    // Healthy again on the next pass; the extra backing is recognized
    c.fail_balance(false);
    let report = h.vault.rebase().unwrap();
    assert!(report.degraded.is_empty());
    assert_eq!(report.total_value, 105_000 * ONE);
}

/// Round trip: deposit then withdraw the minted amount before any rebase
#[test]
fn test_deposit_withdraw_round_trip() {
    let mut h = Harness::new(VaultParams::default());
    let aave = h.add_strategy("aave", &[usdc(), dai()]);
    h.set_default(&usdc(), "aave");

    let raw = 1_234_567_891u128;
    let minted = h
        .vault
        .deposit(&holder("alice"), &usdc(), raw, 0)
        .unwrap();
    h.vault.allocate().unwrap();
    assert_eq!(aave.balance(&usdc()), raw);

    let payout = h.vault.withdraw(&holder("alice"), minted, 0).unwrap();

    assert_eq!(payout.burned, minted);
    // Empty legs of the basket are omitted
    assert_eq!(payout.outputs, vec![(usdc(), raw)]);
    assert_eq!(h.balance("alice"), 0);
    assert_eq!(h.vault.total_supply().unwrap(), 0);
}

/// Pro-rata redemption pays out each asset by its share of backing
#[test]
fn test_pro_rata_redemption_basket() {
    let mut h = Harness::new(VaultParams::default());
    h.deposit_units("alice", &usdc(), 3_000);
    h.deposit_units("bob", &dai(), 1_000);

    let payout = h.vault.withdraw(&holder("alice"), 2_000 * ONE, 0).unwrap();

    assert_eq!(
        payout.outputs,
        vec![(dai(), 500 * ONE), (usdc(), usd6(1_500))]
    );
    assert_eq!(payout.total_out, 2_000 * ONE);
}

/// Default-asset redemption pays everything in one asset
#[test]
fn test_default_asset_redemption() {
    let mut h = Harness::new(VaultParams {
        redeem_policy: RedeemPolicy::DefaultAsset(usdc()),
        ..VaultParams::default()
    });
    h.deposit_units("alice", &usdc(), 3_000);
    h.deposit_units("bob", &dai(), 1_000);

    let payout = h.vault.withdraw(&holder("bob"), 1_000 * ONE, 0).unwrap();
    assert_eq!(payout.outputs, vec![(usdc(), usd6(1_000))]);
    assert_eq!(h.vault.idle_reserve(&dai()), 1_000 * ONE);
}

/// A failed pull in a multi-leg sweep is skipped and re-planned
#[test]
fn test_multi_leg_sweep_skips_failing_strategy() {
    let mut h = Harness::new(VaultParams {
        redeem_policy: RedeemPolicy::DefaultAsset(usdc()),
        ..VaultParams::default()
    });
    let a = h.add_strategy("a", &[usdc()]);
    let b = h.add_strategy("b", &[usdc()]);
    let c = h.add_strategy("c", &[usdc()]);
    for (id, who, whole) in [("a", "alice", 500), ("b", "bob", 1_000), ("c", "carol", 1_000)] {
        h.set_default(&usdc(), id);
        h.deposit_units(who, &usdc(), whole);
        h.vault.allocate().unwrap();
    }
    a.fail_withdraw(true);
    h.vault.drain_events();

    // First plan is a (500) + b (500); a fails and the rest comes from b
    let payout = h.vault.withdraw(&holder("bob"), 1_000 * ONE, 0).unwrap();

    assert_eq!(payout.outputs, vec![(usdc(), usd6(1_000))]);
    assert_eq!(a.balance(&usdc()), usd6(500));
    assert_eq!(b.balance(&usdc()), 0);
    assert_eq!(c.balance(&usdc()), usd6(1_000));
    assert_eq!(h.balance("bob"), 0);
    assert!(h
        .vault
        .drain_events()
        .iter()
        .any(|e| matches!(e, VaultEvent::StrategyPullSkipped { .. })));
}

/// A failure on the only strategy planned is a hard error with full rollback
#[test]
fn test_single_leg_failure_is_hard() {
    let mut h = Harness::new(VaultParams::default());
    let aave = h.add_strategy("aave", &[usdc()]);
    h.set_default(&usdc(), "aave");
    h.deposit_units("alice", &usdc(), 1_000);
    h.vault.allocate().unwrap();
    aave.fail_withdraw(true);

    let err = h.vault.withdraw(&holder("alice"), 400 * ONE, 0).unwrap_err();

    assert!(matches!(err, VaultError::StrategyCallFailed { .. }));
    assert_eq!(h.balance("alice"), 1_000 * ONE);
    assert_eq!(aave.balance(&usdc()), usd6(1_000));
}

/// A failing strategy that happens to be planned alone falls back to the others
#[test]
fn test_failed_single_leg_falls_back_to_other_strategy() {
    let mut h = Harness::new(VaultParams::default());
    let a = h.add_strategy("a", &[usdc()]);
    let b = h.add_strategy("b", &[usdc()]);
    for id in ["a", "b"] {
        h.set_default(&usdc(), id);
        h.deposit_units("alice", &usdc(), 1_000);
        h.vault.allocate().unwrap();
    }
    a.fail_withdraw(true);

    let payout = h.vault.withdraw(&holder("alice"), 400 * ONE, 0).unwrap();

    assert_eq!(payout.outputs, vec![(usdc(), usd6(400))]);
    assert_eq!(a.balance(&usdc()), usd6(1_000));
    assert_eq!(b.balance(&usdc()), usd6(600));
    assert_eq!(h.balance("alice"), 1_600 * ONE);
}

/// A withdrawal that fails after pulling funds hands them back
#[test]
fn test_failed_withdrawal_returns_pulled_funds() {
    let mut h = Harness::new(VaultParams {
        redeem_policy: RedeemPolicy::DefaultAsset(usdc()),
        ..VaultParams::default()
    });
    let a = h.add_strategy("a", &[usdc()]);
    let b = h.add_strategy("b", &[usdc()]);
    for (id, whole) in [("a", 500), ("b", 1_000)] {
        h.set_default(&usdc(), id);
        h.deposit_units("alice", &usdc(), whole);
        h.vault.allocate().unwrap();
    }
    b.fail_withdraw(true);
    h.vault.drain_events();

    let err = h.vault.withdraw(&holder("alice"), 1_000 * ONE, 0).unwrap_err();

    assert!(matches!(err, VaultError::InsufficientLiquidity { .. }));
    assert_eq!(a.balance(&usdc()), usd6(500));
    assert_eq!(b.balance(&usdc()), usd6(1_000));
    assert_eq!(h.vault.idle_reserve(&usdc()), 0);
    assert_eq!(h.balance("alice"), 1_500 * ONE);
    assert!(h.vault.drain_events().is_empty());
}

/// A direct pull from a failing strategy is a hard error
#[test]
fn test_withdraw_from_failing_strategy_is_hard() {
    let mut h = Harness::new(VaultParams::default());
    let aave = h.add_strategy("aave", &[usdc()]);
    h.set_default(&usdc(), "aave");
    h.deposit_units("alice", &usdc(), 1_000);
    h.vault.allocate().unwrap();
    aave.fail_withdraw(true);

    let err = h
        .vault
        .withdraw_from_strategy(&StrategyId::from("aave"), &usdc(), usd6(100))
        .unwrap_err();

    assert!(matches!(err, VaultError::StrategyCallFailed { .. }));
    assert_eq!(aave.balance(&usdc()), usd6(1_000));
    assert_eq!(h.vault.idle_reserve(&usdc()), 0);
}

/// Deactivated strategies are drained but not counted by a rebase
#[test]
fn test_rebase_skips_deactivated_strategy() {
    let mut h = Harness::new(VaultParams::default());
    let a = h.add_strategy("a", &[usdc()]);
    let b = h.add_strategy("b", &[usdc()]);
    for id in ["a", "b"] {
        h.set_default(&usdc(), id);
        h.deposit_units("alice", &usdc(), 1_000);
        h.vault.allocate().unwrap();
    }
    a.accrue(&usdc(), usd6(100));
    b.accrue(&usdc(), usd6(100));
    h.vault.deactivate_strategy(&StrategyId::from("b")).unwrap();

    let report = h.vault.rebase().unwrap();

    // Only a's 1,100 is measured, below supply, so nothing is recognized
    assert_eq!(report.total_value, 1_100 * ONE);
    assert_eq!(report.new_supply, 2_000 * ONE);
    assert!(report.degraded.is_empty());
    assert_eq!(h.vault.total_value().unwrap(), 2_200 * ONE);
    assert!(solvency_ok(&h.vault).unwrap());

    h.vault.activate_strategy(&StrategyId::from("b")).unwrap();
    let report = h.vault.rebase().unwrap();
    assert!(diff(report.new_supply, 2_200 * ONE) <= 2);
}

/// Withdrawal order is configuration
#[test]
fn test_explicit_withdrawal_order() {
    let mut h = Harness::new(VaultParams {
        redeem_policy: RedeemPolicy::DefaultAsset(usdc()),
        withdrawal_order: WithdrawalOrder::Explicit(vec![StrategyId::from("b")]),
        ..VaultParams::default()
    });
    let a = h.add_strategy("a", &[usdc()]);
    let b = h.add_strategy("b", &[usdc()]);
    for id in ["a", "b"] {
        h.set_default(&usdc(), id);
        h.deposit_units("alice", &usdc(), 1_000);
        h.vault.allocate().unwrap();
    }

    h.vault.withdraw(&holder("alice"), 500 * ONE, 0).unwrap();

    assert_eq!(a.balance(&usdc()), usd6(1_000));
    assert_eq!(b.balance(&usdc()), usd6(500));
}

/// Opted-out holders keep a fixed balance across rebases
#[test]
fn test_opt_out_holder_unaffected_by_rebase() {
    let mut h = Harness::new(VaultParams::default());
    let aave = h.add_strategy("aave", &[usdc()]);
    h.set_default(&usdc(), "aave");
    h.deposit_units("alice", &usdc(), 5_000);
    h.deposit_units("pool", &usdc(), 5_000);
    h.vault.opt_out(&holder("pool")).unwrap();
    h.vault.allocate().unwrap();

    aave.accrue(&usdc(), usd6(500));
    h.vault.rebase().unwrap();

    assert_eq!(h.balance("pool"), 5_000 * ONE);
    assert!(diff(h.balance("alice"), 5_500 * ONE) <= 1);

    h.vault.opt_in(&holder("pool")).unwrap();
    assert!(diff(h.balance("pool"), 5_000 * ONE) <= 1);
}

/// Transfers conserve supply
#[test]
fn test_transfer_conserves_supply() {
    let mut h = Harness::new(VaultParams::default());
    h.deposit_units("alice", &usdc(), 1_000);
    let supply = h.vault.total_supply().unwrap();

    h.vault
        .transfer(&holder("alice"), &holder("bob"), 250 * ONE)
        .unwrap();

    assert_eq!(h.balance("bob"), 250 * ONE);
    assert_eq!(h.balance("alice"), 750 * ONE);
    assert_eq!(h.vault.total_supply().unwrap(), supply);
}

/// Large deposits trigger a rebase first and do not capture pending yield
#[test]
fn test_rebase_threshold_protects_pending_yield() {
    let mut h = Harness::new(VaultParams {
        rebase_threshold: 10_000,
        ..VaultParams::default()
    });
    let aave = h.add_strategy("aave", &[usdc()]);
    h.set_default(&usdc(), "aave");
    h.deposit_units("alice", &usdc(), 1_000);
    h.vault.allocate().unwrap();
    aave.accrue(&usdc(), usd6(100));

    h.deposit_units("whale", &usdc(), 100_000);

    assert!(diff(h.balance("alice"), 1_100 * ONE) <= 1);
    assert_eq!(h.balance("whale"), 100_000 * ONE);
}

/// Removing a strategy requires it to be drained first
#[test]
fn test_remove_strategy_after_drain() {
    let mut h = Harness::new(VaultParams::default());
    h.add_strategy("aave", &[usdc()]);
    h.set_default(&usdc(), "aave");
    h.deposit_units("alice", &usdc(), 1_000);
    h.vault.allocate().unwrap();

    let id = StrategyId::from("aave");
    h.vault.deactivate_strategy(&id).unwrap();
    assert_eq!(
        h.vault.remove_strategy(&id).err(),
        Some(VaultError::StrategyNotEmpty(id.clone()))
    );

    let received = h
        .vault
        .withdraw_from_strategy(&id, &usdc(), usd6(1_000))
        .unwrap();
    assert_eq!(received, usd6(1_000));
    assert!(h.vault.remove_strategy(&id).is_ok());
    assert_eq!(h.vault.idle_reserve(&usdc()), usd6(1_000));
    assert_eq!(h.vault.check_balance(&usdc()).unwrap(), usd6(1_000));
}
