//! # DV Operator Node
//!
//! Runs a local committee of operators for one distributed validator and
//! drives an attester duty through consensus every slot until Ctrl+C.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration from `DV_*` environment variables
//! 2. Validate it
//! 3. Initialize logging
//! 4. Build the committee and start its tasks
//! 5. Start a duty at each slot and report the decisions

use anyhow::{bail, Context, Result};
use node_runtime::logging::init_logging;
use node_runtime::{LocalCluster, NodeConfig, OperatorDecision};
use sha2::{Digest, Sha256};
use shared_types::{RunnerRole, Slot};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = NodeConfig::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    init_logging(&config.logging)?;

    info!("===========================================");
    info!("  DV Operator Node v{}", env!("CARGO_PKG_VERSION"));
    info!("===========================================");
    info!(
        operators = config.cluster.operators,
        slot_duration = ?config.cluster.slot_duration,
        backend = ?config.storage.backend,
        "Configuration loaded"
    );

    let mut cluster = LocalCluster::new(&config).context("Failed to build committee")?;
    cluster.start();

    let operators = cluster.nodes().len();
    let mut ticker = tokio::time::interval(config.cluster.slot_duration);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("Node is running. Press Ctrl+C to stop.");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
            _ = ticker.tick() => {
                let slot = cluster.current_slot();
                if let Err(e) = run_slot(&mut cluster, slot, operators, config.cluster.slot_duration).await {
                    error!(slot, error = %format!("{:#}", e), "Duty failed");
                }
            }
        }
    }

    cluster.shutdown().await;
    Ok(())
}

async fn run_slot(
    cluster: &mut LocalCluster,
    slot: Slot,
    operators: usize,
    timeout: std::time::Duration,
) -> Result<()> {
    let input = attestation_input(slot);
    let Some(height) = cluster.start_duty(RunnerRole::Attester, slot, &input)? else {
        return Ok(());
    };

    let decisions = match cluster.wait_for_decisions(operators, timeout).await {
        Ok(decisions) => decisions,
        Err(e) => {
            warn!(slot, height, error = %e, "Committee did not decide within the slot");
            return Ok(());
        }
    };
    for decision in &decisions {
        info!(
            slot,
            operator_id = decision.operator_id,
            height = decision.event.height,
            round = decision.event.round,
            value = %hex::encode(&decision.event.value),
            "Operator decided"
        );
    }
    check_agreement(&decisions)
}

/// Stand-in for the attestation data root of `slot`.
fn attestation_input(slot: Slot) -> Vec<u8> {
    Sha256::digest(slot.to_be_bytes()).to_vec()
}

fn check_agreement(decisions: &[OperatorDecision]) -> Result<()> {
    let Some(first) = decisions.first() else {
        return Ok(());
    };
    for decision in &decisions[1..] {
        if decision.event.height == first.event.height && decision.event.value != first.event.value {
            bail!(
                "operators {} and {} decided different values at height {}",
                first.operator_id,
                decision.operator_id,
                first.event.height
            );
        }
    }
    Ok(())
}
