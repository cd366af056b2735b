//! Randomized operation sequences
//!
//! Without strategy losses the vault stays solvent, rebases never shrink
//! supply, and holder balances keep adding up to supply. Strategies fail
//! their balance queries and withdrawals at random; a rejected operation
//! leaves idle reserve, strategy balances and the token untouched.

use proptest::prelude::*;
use vault_core::helpers::{balances_match_supply, rounding_epsilon, supply_not_decreased};
use vault_core::{StrategyId, VaultError, VaultParams};
use vault_integration_tests::*;

const HOLDERS: [&str; 3] = ["alice", "bob", "carol"];
const VENUES: [&str; 2] = ["a", "b"];

#[derive(Clone, Debug)]
enum Op {
    Deposit { who: usize, usdc: bool, whole: u128 },
    Withdraw { who: usize, whole: u128 },
    Transfer { from: usize, to: usize, whole: u128 },
    Allocate,
    Accrue { venue: usize, whole: u128 },
    Rebase,
    PullDirect { venue: usize, whole: u128 },
    RouteUsdc { venue: usize },
    FailBalance { venue: usize, on: bool },
    FailWithdraw { venue: usize, on: bool },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..3usize, any::<bool>(), 1u128..50_000).prop_map(|(who, usdc, whole)| Op::Deposit {
            who,
            usdc,
            whole
        }),
        3 => (0..3usize, 1u128..20_000).prop_map(|(who, whole)| Op::Withdraw { who, whole }),
        1 => (0..3usize, 0..3usize, 1u128..10_000).prop_map(|(from, to, whole)| Op::Transfer {
            from,
            to,
            whole
        }),
        2 => Just(Op::Allocate),
        1 => (0..2usize, 1u128..2_000).prop_map(|(venue, whole)| Op::Accrue { venue, whole }),
        2 => Just(Op::Rebase),
        1 => (0..2usize, 1u128..5_000).prop_map(|(venue, whole)| Op::PullDirect { venue, whole }),
        1 => (0..2usize).prop_map(|venue| Op::RouteUsdc { venue }),
        1 => (0..2usize, any::<bool>()).prop_map(|(venue, on)| Op::FailBalance { venue, on }),
        1 => (0..2usize, any::<bool>()).prop_map(|(venue, on)| Op::FailWithdraw { venue, on }),
    ]
}

fn params() -> impl Strategy<Value = VaultParams> {
    (0u16..2_000, 0u16..100, 0u16..500).prop_map(|(buffer, fee, cap)| VaultParams {
        vault_buffer_bps: buffer,
        redeem_fee_bps: fee,
        max_yield_bps_per_rebase: cap,
        ..VaultParams::default()
    })
}

/// Failures a random sequence is allowed to hit
fn expected(err: &VaultError) -> bool {
    matches!(
        err,
        VaultError::InsufficientBalance { .. }
            | VaultError::InsufficientLiquidity { .. }
            | VaultError::StrategyCallFailed { .. }
    )
}

/// Everything a rejected operation must leave as it was
#[derive(Debug, PartialEq, Eq)]
struct Observed {
    idle: Vec<u128>,
    venues: Vec<u128>,
    supply: u128,
    balances: Vec<u128>,
}

fn observe(h: &Harness) -> Observed {
    let mut venues = Vec::new();
    for id in VENUES {
        let venue = h.strategy(id);
        venues.push(venue.balance(&usdc()));
        venues.push(venue.balance(&dai()));
    }
    Observed {
        idle: vec![h.vault.idle_reserve(&usdc()), h.vault.idle_reserve(&dai())],
        venues,
        supply: h.vault.total_supply().unwrap(),
        balances: HOLDERS.iter().map(|who| h.balance(who)).collect(),
    }
}

/// Canonical backing read straight from the venues, immune to failing queries
fn true_backing(h: &Harness) -> u128 {
    let usdc_raw = h.vault.idle_reserve(&usdc())
        + VENUES.iter().map(|id| h.strategy(id).balance(&usdc())).sum::<u128>();
    let dai_raw = h.vault.idle_reserve(&dai())
        + VENUES.iter().map(|id| h.strategy(id).balance(&dai())).sum::<u128>();
    usdc_raw * (ONE / usd6(1)) + dai_raw
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn invariants_hold_across_random_sequences(
        params in params(),
        ops in proptest::collection::vec(op(), 1..40),
    ) {
        let mut h = Harness::new(params);
        h.add_strategy("a", &[usdc(), dai()]);
        h.add_strategy("b", &[usdc()]);
        h.set_default(&usdc(), "a");
        h.set_default(&dai(), "a");

        for op in ops {
            let before = observe(&h);
            let result = match op.clone() {
                Op::Deposit { who, usdc: true, whole } => h
                    .vault
                    .deposit(&holder(HOLDERS[who]), &usdc(), usd6(whole), 0)
                    .map(|_| ()),
                Op::Deposit { who, usdc: false, whole } => h
                    .vault
                    .deposit(&holder(HOLDERS[who]), &dai(), whole * ONE, 0)
                    .map(|_| ()),
                Op::Withdraw { who, whole } => h
                    .vault
                    .withdraw(&holder(HOLDERS[who]), whole * ONE, 0)
                    .map(|_| ()),
                Op::Transfer { from, to, whole } => h
                    .vault
                    .transfer(&holder(HOLDERS[from]), &holder(HOLDERS[to]), whole * ONE),
                Op::Allocate => h.vault.allocate().map(|_| ()),
                Op::Accrue { venue, whole } => {
                    h.strategy(VENUES[venue]).accrue(&usdc(), usd6(whole));
                    Ok(())
                }
                Op::Rebase => {
                    let supply = h.vault.total_supply().unwrap();
                    let report = h.vault.rebase();
                    if let Ok(report) = &report {
                        prop_assert!(supply_not_decreased(supply, report.new_supply));
                        prop_assert!(report.new_supply <= true_backing(&h));
                    }
                    report.map(|_| ())
                }
                Op::PullDirect { venue, whole } => {
                    let held = h.strategy(VENUES[venue]).balance(&usdc());
                    let raw = usd6(whole).min(held);
                    if raw == 0 {
                        Ok(())
                    } else {
                        h.vault
                            .withdraw_from_strategy(&StrategyId::from(VENUES[venue]), &usdc(), raw)
                            .map(|_| ())
                    }
                }
                Op::RouteUsdc { venue } => {
                    h.set_default(&usdc(), VENUES[venue]);
                    Ok(())
                }
                Op::FailBalance { venue, on } => {
                    h.strategy(VENUES[venue]).fail_balance(on);
                    Ok(())
                }
                Op::FailWithdraw { venue, on } => {
                    h.strategy(VENUES[venue]).fail_withdraw(on);
                    Ok(())
                }
            };

            if let Err(e) = result {
                prop_assert!(expected(&e), "unexpected error after {:?}: {}", op, e);
                prop_assert_eq!(observe(&h), before, "{:?} left state behind", op);
            }

            let supply = h.vault.total_supply().unwrap();
            let epsilon = rounding_epsilon(h.vault.token().holder_count());
            prop_assert!(true_backing(&h) + epsilon >= supply);
            prop_assert!(balances_match_supply(h.vault.token()).unwrap());
        }
    }

    #[test]
    fn failed_withdrawal_changes_nothing(
        deposit in 1u128..100_000,
        extra in 1u128..100_000,
    ) {
        let mut h = Harness::new(VaultParams::default());
        h.deposit_units("alice", &usdc(), deposit);
        let supply = h.vault.total_supply().unwrap();
        let idle = h.vault.idle_reserve(&usdc());

        let err = h
            .vault
            .withdraw(&holder("alice"), (deposit + extra) * ONE, 0)
            .unwrap_err();

        prop_assert!(expected(&err));
        prop_assert_eq!(h.balance("alice"), deposit * ONE);
        prop_assert_eq!(h.vault.total_supply().unwrap(), supply);
        prop_assert_eq!(h.vault.idle_reserve(&usdc()), idle);
    }
}
