//! Vault health classification from a snapshot

use vault_core::{VaultSnapshot, CREDITS_RESOLUTION};

/// Coarse health state reported every tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    /// At least one strategy did not answer its balance query
    Degraded,
    /// Backing below supply beyond the rounding tolerance
    Undercollateralized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultHealth {
    pub status: HealthStatus,
    /// Backing minus supply (canonical, signed)
    pub surplus: i128,
    pub unreachable: Vec<String>,
}

/// Calculate surplus: value - supply
///
/// Returns a value where:
/// - surplus < -tolerance: undercollateralized
/// - otherwise: covered (yield pending if positive)
pub fn calculate_surplus(snapshot: &VaultSnapshot) -> i128 {
    let clamp = |v: u128| i128::try_from(v).unwrap_or(i128::MAX);
    clamp(snapshot.total_value) - clamp(snapshot.total_supply)
}

/// Strategies with at least one failed balance query
pub fn unreachable_strategies(snapshot: &VaultSnapshot) -> Vec<String> {
    snapshot
        .strategies
        .iter()
        .filter(|s| s.balances.values().any(Option::is_none))
        .map(|s| s.id.to_string())
        .collect()
}

pub fn evaluate(snapshot: &VaultSnapshot) -> VaultHealth {
    let surplus = calculate_surplus(snapshot);
    let unreachable = unreachable_strategies(snapshot);
    // One unit of least precision per holder
    let tolerance = snapshot.holders as i128 + 1;

    let status = if surplus < -tolerance {
        HealthStatus::Undercollateralized
    } else if !unreachable.is_empty() {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    VaultHealth {
        status,
        surplus,
        unreachable,
    }
}

/// Whole tokens, for log output
pub fn whole_tokens(amount: i128) -> f64 {
    amount as f64 / CREDITS_RESOLUTION as f64
}
