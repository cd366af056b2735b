//! Rebasing Vault Keeper
//!
//! Off-chain maintenance service that periodically pushes idle reserve into
//! strategies, rebases to distribute harvested yield, and reports solvency.

mod config;
mod health;
mod simulation;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use config::Config;
use health::{evaluate, whole_tokens, HealthStatus};
use simulation::{build_vault, Simulation};
use tokio::sync::Mutex;
use tokio::time;
use vault_core::Vault;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting Rebasing Vault Keeper");

    let mut args = std::env::args().skip(1);
    if args.next().as_deref() == Some("--write-default-config") {
        let target = args.next().unwrap_or_else(|| "keeper-config.toml".to_string());
        return Config::write_default(&target);
    }

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({:#}), using default local config", e);
        Config::default_local()
    });

    let (vault, sim) = build_vault(&config).context("Failed to build vault")?;
    log::info!(
        "Vault ready: {} assets, {} strategies, supply {:.2}",
        vault.ledger().len(),
        vault.registry().len(),
        whole_tokens(vault.total_supply()? as i128)
    );

    let vault = Arc::new(Mutex::new(vault));

    log::info!("Keeper service started. Ticking every {}s", config.poll_interval_secs);

    // Main event loop
    let mut interval = time::interval(Duration::from_secs(config.poll_interval_secs.max(1)));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = tick(&vault, &sim, &config).await {
                    log::error!("Error during keeper tick: {:#}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Shutting down");
                return Ok(());
            }
        }
    }
}

/// One maintenance pass: accrue, allocate, rebase, report
async fn tick(vault: &Arc<Mutex<Vault>>, sim: &Simulation, config: &Config) -> Result<()> {
    let accrued = sim.accrue()?;
    for (strategy, asset, amount) in accrued.iter() {
        log::debug!("Accrued {} {} in {}", amount, asset, strategy);
    }

    let mut vault = vault.lock().await;

    let allocation = vault.allocate().context("Allocation pass failed")?;
    if !allocation.is_noop() {
        log::info!(
            "Allocated {} leg(s), {} skipped",
            allocation.allocated.len(),
            allocation.skipped.len()
        );
    }

    if vault.is_rebase_paused() {
        log::debug!("Rebase paused, skipping");
    } else {
        let report = vault.rebase().context("Rebase failed")?;
        if report.is_degraded() {
            log::warn!("Degraded rebase, excluded: {:?}", report.degraded);
        }
        log::info!(
            "Supply {:.4} -> {:.4} (yield {:.4})",
            whole_tokens(report.previous_supply as i128),
            whole_tokens(report.new_supply as i128),
            whole_tokens(report.recognized_yield as i128)
        );
    }

    let snapshot = vault.snapshot()?;
    let events = vault.drain_events();
    drop(vault);

    for event in events.iter() {
        log::debug!("{}", serde_json::to_string(event)?);
    }

    let health = evaluate(&snapshot);
    match health.status {
        HealthStatus::Healthy => {
            log::debug!("Vault healthy, surplus {:.4}", whole_tokens(health.surplus))
        }
        HealthStatus::Degraded => {
            log::warn!("Vault degraded, unreachable: {:?}", health.unreachable)
        }
        HealthStatus::Undercollateralized => log::error!(
            "Vault undercollateralized by {:.4}",
            whole_tokens(-health.surplus)
        ),
    }

    if config.log_snapshots || config.snapshot_path.is_some() {
        let json = serde_json::to_string_pretty(&snapshot).context("Failed to serialize snapshot")?;
        if config.log_snapshots {
            log::info!("Snapshot: {}", json);
        }
        if let Some(path) = config.snapshot_path.as_deref() {
            let expanded = shellexpand::tilde(path);
            std::fs::write(expanded.as_ref(), json)
                .context(format!("Failed to write snapshot to {}", path))?;
        }
    }

    Ok(())
}
