//! Keeper configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use vault_core::{RedeemPolicy, VaultParams};

/// Base asset the simulated vault accepts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    pub id: String,
    pub decimals: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_strategy: Option<String>,
}

/// Simulated in-memory yield venue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub id: String,
    pub assets: Vec<String>,

    /// Yield credited to every position each tick
    #[serde(default)]
    pub yield_bps_per_tick: u16,

    /// Maximum accepted per deposit call (raw units)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deposit_cap: Option<u64>,

    /// Registered without the deposit capability
    #[serde(default)]
    pub withdraw_only: bool,
}

/// Deposit made once at startup (whole asset units)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedDeposit {
    pub holder: String,
    pub asset: String,
    pub amount: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Polling interval in seconds
    pub poll_interval_secs: u64,

    /// Log a JSON snapshot of the vault every tick
    #[serde(default)]
    pub log_snapshots: bool,

    /// Optional path the latest snapshot is written to (`~` is expanded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<String>,

    pub assets: Vec<AssetConfig>,

    pub strategies: Vec<StrategyConfig>,

    #[serde(default)]
    pub seed_deposits: Vec<SeedDeposit>,

    #[serde(default)]
    pub params: VaultParams,
}

impl Config {
    /// Load configuration from TOML file
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("VAULT_KEEPER_CONFIG")
            .unwrap_or_else(|_| "keeper-config.toml".to_string());
        Self::load_from(&config_path)
    }

    pub fn load_from(path: &str) -> Result<Self> {
        let expanded = shellexpand::tilde(path);
        let config_str = std::fs::read_to_string(expanded.as_ref())
            .context(format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&config_str)
            .context("Failed to parse config TOML")?;

        Ok(config)
    }

    /// Three stablecoins, two venues, a small buffer
    pub fn default_local() -> Self {
        let asset = |id: &str, decimals: u8, default_strategy: &str| AssetConfig {
            id: id.to_string(),
            decimals,
            default_strategy: Some(default_strategy.to_string()),
        };

        Self {
            poll_interval_secs: 5,
            log_snapshots: false,
            snapshot_path: None,
            assets: vec![
                asset("DAI", 18, "lending"),
                asset("USDC", 6, "lending"),
                asset("USDT", 6, "curve"),
            ],
            strategies: vec![
                StrategyConfig {
                    id: "lending".to_string(),
                    assets: vec!["DAI".to_string(), "USDC".to_string()],
                    yield_bps_per_tick: 2,
                    deposit_cap: None,
                    withdraw_only: false,
                },
                StrategyConfig {
                    id: "curve".to_string(),
                    assets: vec!["USDT".to_string()],
                    yield_bps_per_tick: 3,
                    deposit_cap: None,
                    withdraw_only: false,
                },
            ],
            seed_deposits: vec![
                SeedDeposit {
                    holder: "alice".to_string(),
                    asset: "USDC".to_string(),
                    amount: 100_000,
                },
                SeedDeposit {
                    holder: "bob".to_string(),
                    asset: "DAI".to_string(),
                    amount: 25_000,
                },
            ],
            params: VaultParams {
                vault_buffer_bps: 200, // 2% kept idle for withdrawals
                redeem_fee_bps: 25,
                max_yield_bps_per_rebase: 100,
                redeem_policy: RedeemPolicy::ProRata,
                ..VaultParams::default()
            },
        }
    }

    /// Write default config to file
    pub fn write_default(path: &str) -> Result<()> {
        let config = Self::default_local();
        let toml_str = toml::to_string_pretty(&config)
            .context("Failed to serialize config")?;

        std::fs::write(path, toml_str)
            .context(format!("Failed to write config to {}", path))?;

        log::info!("Created default config at {}", path);
        Ok(())
    }
}
