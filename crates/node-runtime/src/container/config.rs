//! # Node Configuration
//!
//! Unified configuration for the consensus core, storage, the local cluster
//! and logging.
//!
//! ## Environment Variables
//!
//! | Variable | Field |
//! |----------|-------|
//! | `DV_OPERATORS` | `cluster.operators` |
//! | `DV_SLOT_DURATION_MS` | `cluster.slot_duration` |
//! | `DV_GENESIS_UNIX` | `cluster.genesis_unix_secs` |
//! | `DV_VALIDATOR_PK` | `cluster.validator_pk` (hex) |
//! | `DV_QUICK_TIMEOUT_MS` | `consensus.quick_timeout` |
//! | `DV_SLOW_TIMEOUT_MS` | `consensus.slow_timeout` |
//! | `DV_QUICK_THRESHOLD` | `consensus.quick_threshold` |
//! | `DV_QUEUE_CAPACITY` | `consensus.queue_capacity` |
//! | `DV_STORAGE_BACKEND` | `storage.backend` (`memory` or `rocksdb`) |
//! | `DV_DATA_DIR` | `storage.data_dir` |
//! | `DV_LOG_LEVEL` | `logging.level` (`RUST_LOG` still wins) |

use dv_01_qbft::adapters::DEFAULT_SLOT_DURATION;
use dv_01_qbft::roundtimer::{DEFAULT_QUICK_THRESHOLD, DEFAULT_QUICK_TIMEOUT, DEFAULT_SLOW_TIMEOUT};
use dv_01_qbft::{TimeoutOptions, DEFAULT_QUEUE_CAPACITY};
use dv_03_validator::RunnerConfig;
use shared_types::{Round, ValidatorPubKey};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Smallest committee that tolerates one faulty operator.
pub const MIN_OPERATORS: usize = 4;

/// Validator key used by the local cluster when none is configured.
pub const DEFAULT_VALIDATOR_PK: [u8; 48] = [0x11; 48];

/// Complete node configuration.
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    pub consensus: ConsensusConfig,
    pub storage: StorageConfig,
    pub cluster: ClusterConfig,
    pub logging: LoggingConfig,
}

impl NodeConfig {
    /// Defaults overridden by `DV_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = parsed::<usize>(&lookup, "DV_OPERATORS")? {
            config.cluster.operators = v;
        }
        if let Some(v) = parsed::<u64>(&lookup, "DV_SLOT_DURATION_MS")? {
            config.cluster.slot_duration = Duration::from_millis(v);
        }
        if let Some(v) = parsed::<u64>(&lookup, "DV_GENESIS_UNIX")? {
            config.cluster.genesis_unix_secs = Some(v);
        }
        if let Some(v) = lookup("DV_VALIDATOR_PK") {
            config.cluster.validator_pk = ValidatorPubKey::from_hex(&v).map_err(|e| {
                ConfigError::InvalidValue {
                    key: "DV_VALIDATOR_PK",
                    value: v.clone(),
                    reason: e.to_string(),
                }
            })?;
        }
        if let Some(v) = parsed::<u64>(&lookup, "DV_QUICK_TIMEOUT_MS")? {
            config.consensus.quick_timeout = Duration::from_millis(v);
        }
        if let Some(v) = parsed::<u64>(&lookup, "DV_SLOW_TIMEOUT_MS")? {
            config.consensus.slow_timeout = Duration::from_millis(v);
        }
        if let Some(v) = parsed::<Round>(&lookup, "DV_QUICK_THRESHOLD")? {
            config.consensus.quick_threshold = v;
        }
        if let Some(v) = parsed::<usize>(&lookup, "DV_QUEUE_CAPACITY")? {
            config.consensus.queue_capacity = v;
        }
        if let Some(v) = parsed::<StorageBackend>(&lookup, "DV_STORAGE_BACKEND")? {
            config.storage.backend = v;
        }
        if let Some(v) = lookup("DV_DATA_DIR") {
            config.storage.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("DV_LOG_LEVEL") {
            config.logging.level = v;
        }

        Ok(config)
    }

    /// Reject configurations the node cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster.operators < MIN_OPERATORS {
            return Err(ConfigError::CommitteeTooSmall(self.cluster.operators));
        }
        if self.cluster.operators > u8::MAX as usize {
            return Err(ConfigError::CommitteeTooLarge(self.cluster.operators));
        }
        if self.consensus.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.consensus.quick_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.consensus.quick_timeout > self.consensus.slow_timeout {
            return Err(ConfigError::QuickSlowerThanSlow {
                quick: self.consensus.quick_timeout,
                slow: self.consensus.slow_timeout,
            });
        }
        if self.cluster.slot_duration.is_zero() {
            return Err(ConfigError::ZeroSlotDuration);
        }
        if self.storage.backend == StorageBackend::RocksDb && !cfg!(feature = "rocksdb") {
            return Err(ConfigError::BackendUnavailable("rocksdb"));
        }
        Ok(())
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|value| {
            value.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
                key,
                value: value.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("committee of {0} operators is too small, need at least 4")]
    CommitteeTooSmall(usize),

    #[error("committee of {0} operators is too large for the local cluster")]
    CommitteeTooLarge(usize),

    #[error("queue capacity must be positive")]
    ZeroQueueCapacity,

    #[error("round timeouts must be positive")]
    ZeroTimeout,

    #[error("quick timeout {quick:?} exceeds slow timeout {slow:?}")]
    QuickSlowerThanSlow { quick: Duration, slow: Duration },

    #[error("slot duration must be positive")]
    ZeroSlotDuration,

    #[error("storage backend {0} is not compiled in")]
    BackendUnavailable(&'static str),
}

/// Round timer and queue parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusConfig {
    /// Per-round timeout up to `quick_threshold`.
    pub quick_timeout: Duration,
    /// Per-round timeout beyond `quick_threshold`.
    pub slow_timeout: Duration,
    pub quick_threshold: Round,
    /// Bound of every runner's message queue.
    pub queue_capacity: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            quick_timeout: DEFAULT_QUICK_TIMEOUT,
            slow_timeout: DEFAULT_SLOW_TIMEOUT,
            quick_threshold: DEFAULT_QUICK_THRESHOLD,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl ConsensusConfig {
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            timeouts: TimeoutOptions {
                quick_threshold: self.quick_threshold,
                quick: self.quick_timeout,
                slow: self.slow_timeout,
            },
            queue_capacity: self.queue_capacity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    #[default]
    Memory,
    RocksDb,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "rocksdb" => Ok(StorageBackend::RocksDb),
            other => Err(format!("unknown storage backend {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Each operator of the local cluster gets its own subdirectory.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            data_dir: PathBuf::from("./data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    /// Committee size.
    pub operators: usize,
    pub slot_duration: Duration,
    /// Genesis time; `None` starts the slot clock at process start.
    pub genesis_unix_secs: Option<u64>,
    pub validator_pk: ValidatorPubKey,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            operators: MIN_OPERATORS,
            slot_duration: DEFAULT_SLOT_DURATION,
            genesis_unix_secs: None,
            validator_pk: ValidatorPubKey(DEFAULT_VALIDATOR_PK),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            with_target: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = NodeConfig::default();
        assert_eq!(config.cluster.operators, 4);
        assert_eq!(config.consensus.quick_timeout, Duration::from_secs(2));
        assert_eq!(config.consensus.slow_timeout, Duration::from_secs(120));
        assert_eq!(config.consensus.quick_threshold, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = NodeConfig::from_lookup(lookup(&[
            ("DV_OPERATORS", "7"),
            ("DV_QUICK_TIMEOUT_MS", "250"),
            ("DV_QUEUE_CAPACITY", "64"),
            ("DV_STORAGE_BACKEND", "Memory"),
            ("DV_LOG_LEVEL", "debug"),
        ]))
        .unwrap();

        assert_eq!(config.cluster.operators, 7);
        assert_eq!(config.consensus.quick_timeout, Duration::from_millis(250));
        assert_eq!(config.consensus.queue_capacity, 64);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.consensus.runner_config().timeouts.quick, Duration::from_millis(250));
    }

    #[test]
    fn test_unparsable_value_names_the_variable() {
        let err = NodeConfig::from_lookup(lookup(&[("DV_OPERATORS", "four")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "DV_OPERATORS", .. }));
    }

    #[test]
    fn test_bad_validator_key_rejected() {
        let err = NodeConfig::from_lookup(lookup(&[("DV_VALIDATOR_PK", "abcd")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "DV_VALIDATOR_PK", .. }));
    }

    #[test]
    fn test_validate_rejects_small_committee() {
        let mut config = NodeConfig::default();
        config.cluster.operators = 3;
        assert_eq!(config.validate(), Err(ConfigError::CommitteeTooSmall(3)));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = NodeConfig::default();
        config.consensus.queue_capacity = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroQueueCapacity));
    }

    #[test]
    fn test_validate_rejects_quick_above_slow() {
        let mut config = NodeConfig::default();
        config.consensus.quick_timeout = Duration::from_secs(10);
        config.consensus.slow_timeout = Duration::from_secs(5);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::QuickSlowerThanSlow { .. })
        ));
    }

    #[cfg(not(feature = "rocksdb"))]
    #[test]
    fn test_rocksdb_backend_requires_feature() {
        let mut config = NodeConfig::default();
        config.storage.backend = StorageBackend::RocksDb;
        assert_eq!(config.validate(), Err(ConfigError::BackendUnavailable("rocksdb")));
    }
}
