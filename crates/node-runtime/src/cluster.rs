//! # Local Cluster
//!
//! A full operator committee for one distributed validator, running in a
//! single process. Each operator gets its own signing key, decided store,
//! and validator; they talk through the [`LocalNetwork`].

use crate::adapters::{LocalNetwork, OperatorDecision};
use crate::container::{NodeConfig, StorageBackend, StorageConfig};
use anyhow::{bail, Context, Result};
use dv_01_qbft::adapters::{Ed25519Signer, Ed25519Verifier, GenesisSlotClock};
use dv_01_qbft::InstanceDependencies;
use dv_02_storage::{InMemoryStore, KeyValueStore, QbftStore};
use dv_03_validator::{Duty, MessageValidator, Validator};
use sha2::{Digest, Sha256};
use shared_types::{Height, Operator, OperatorId, RunnerRole, Share, Slot};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Domain separator for deterministic operator keys.
const OPERATOR_SEED_DOMAIN: &[u8] = b"dv-local-operator";

pub struct ClusterNode {
    pub operator_id: OperatorId,
    pub validator: Arc<Validator>,
    pub store: Arc<QbftStore>,
}

pub struct LocalCluster {
    clock: GenesisSlotClock,
    network: Arc<LocalNetwork>,
    nodes: Vec<ClusterNode>,
    decisions: mpsc::UnboundedReceiver<OperatorDecision>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl LocalCluster {
    /// Build every operator of the committee described by `config`.
    pub fn new(config: &NodeConfig) -> Result<Self> {
        let cluster = &config.cluster;
        let clock = match cluster.genesis_unix_secs {
            Some(secs) => GenesisSlotClock::from_unix_secs(secs, cluster.slot_duration),
            None => GenesisSlotClock::new(SystemTime::now(), cluster.slot_duration),
        };

        let signers: Vec<Arc<Ed25519Signer>> = (1..=cluster.operators as OperatorId)
            .map(|op| Arc::new(Ed25519Signer::from_seed(op, operator_seed(op))))
            .collect();
        let committee: Vec<Operator> = signers
            .iter()
            .zip(1..)
            .map(|(signer, id)| Operator {
                id,
                public_key: signer.public_key(),
            })
            .collect();

        let transport = MessageValidator::with_registry([cluster.validator_pk]);
        let (network, decisions) = LocalNetwork::new(transport);

        let mut nodes = Vec::with_capacity(signers.len());
        for (operator_id, signer) in (1..).zip(signers) {
            let share = Share::new(cluster.validator_pk, operator_id, committee.clone())
                .with_context(|| format!("Failed to build share for operator {}", operator_id))?;
            let store = Arc::new(QbftStore::new(open_store(&config.storage, operator_id)?));
            let deps = InstanceDependencies {
                event_bus: network.event_bus(operator_id),
                signer,
                verifier: Arc::new(Ed25519Verifier),
                store: store.clone(),
            };
            let validator = Validator::with_roles(
                Arc::new(share),
                &RunnerRole::ALL,
                deps,
                Arc::new(clock),
                config.consensus.runner_config(),
            )
            .with_context(|| format!("Failed to build validator for operator {}", operator_id))?;

            nodes.push(ClusterNode {
                operator_id,
                validator: Arc::new(validator),
                store,
            });
        }

        info!(
            operators = nodes.len(),
            validator = %cluster.validator_pk.short(),
            backend = ?config.storage.backend,
            "[cluster] Committee built"
        );

        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            clock,
            network,
            nodes,
            decisions,
            shutdown_tx,
            tasks: Vec::new(),
        })
    }

    pub fn nodes(&self) -> &[ClusterNode] {
        &self.nodes
    }

    pub fn node(&self, operator_id: OperatorId) -> Option<&ClusterNode> {
        self.nodes.iter().find(|n| n.operator_id == operator_id)
    }

    pub fn network(&self) -> &Arc<LocalNetwork> {
        &self.network
    }

    pub fn current_slot(&self) -> Slot {
        self.clock.current_slot()
    }

    /// Spawn the message router and every runner's driver.
    pub fn start(&mut self) {
        if !self.tasks.is_empty() {
            warn!("[cluster] Already started");
            return;
        }
        let routes = self
            .nodes
            .iter()
            .map(|n| (n.operator_id, n.validator.clone()))
            .collect();
        self.tasks.push(tokio::spawn(
            self.network.clone().run(routes, self.shutdown_tx.subscribe()),
        ));
        for node in &self.nodes {
            self.tasks
                .extend(node.validator.spawn_drivers(self.shutdown_tx.subscribe()));
        }
        debug!(tasks = self.tasks.len(), "[cluster] Started");
    }

    /// Start the same duty on every connected operator. Each operator
    /// proposes `input` when it leads.
    ///
    /// Returns the consensus height, or `None` for roles without consensus.
    pub fn start_duty(&self, role: RunnerRole, slot: Slot, input: &[u8]) -> Result<Option<Height>> {
        let mut height = None;
        for node in &self.nodes {
            if !self.network.is_connected(node.operator_id) {
                continue;
            }
            let duty = Duty {
                role,
                slot,
                validator_index: 0,
                validator_pk: node.validator.share().validator_pk,
            };
            height = node
                .validator
                .start_duty(duty, input.to_vec())
                .with_context(|| format!("Operator {} failed to start {} duty", node.operator_id, role))?;
        }
        Ok(height)
    }

    /// Collect `count` decisions, failing if they do not arrive in `timeout`.
    pub async fn wait_for_decisions(&mut self, count: usize, timeout: Duration) -> Result<Vec<OperatorDecision>> {
        let mut decisions = Vec::with_capacity(count);
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        while decisions.len() < count {
            tokio::select! {
                _ = &mut deadline => bail!(
                    "timed out after {:?} with {} of {} decisions",
                    timeout,
                    decisions.len(),
                    count
                ),
                decision = self.decisions.recv() => match decision {
                    Some(decision) => decisions.push(decision),
                    None => bail!("decision channel closed"),
                },
            }
        }
        Ok(decisions)
    }

    /// Signal shutdown and wait for every task to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "[cluster] Task failed during shutdown");
            }
        }
        info!("[cluster] Shutdown complete");
    }
}

fn operator_seed(operator_id: OperatorId) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(OPERATOR_SEED_DOMAIN);
    hasher.update(operator_id.to_be_bytes());
    hasher.finalize().into()
}

#[cfg_attr(not(feature = "rocksdb"), allow(unused_variables))]
fn open_store(config: &StorageConfig, operator_id: OperatorId) -> Result<Arc<dyn KeyValueStore>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(InMemoryStore::new())),
        #[cfg(feature = "rocksdb")]
        StorageBackend::RocksDb => {
            let path = operator_dir(&config.data_dir, operator_id);
            std::fs::create_dir_all(&config.data_dir)
                .with_context(|| format!("Failed to create {}", config.data_dir.display()))?;
            let store = dv_02_storage::RocksDbStore::open_default(&path)
                .with_context(|| format!("Failed to open database at {}", path.display()))?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "rocksdb"))]
        StorageBackend::RocksDb => bail!(crate::container::ConfigError::BackendUnavailable("rocksdb")),
    }
}

#[cfg_attr(not(feature = "rocksdb"), allow(dead_code))]
fn operator_dir(data_dir: &Path, operator_id: OperatorId) -> std::path::PathBuf {
    data_dir.join(format!("operator-{}", operator_id))
}
