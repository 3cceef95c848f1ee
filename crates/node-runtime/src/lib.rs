//! # Node Runtime
//!
//! Wires the consensus core, decided storage and validator dispatch into a
//! running operator committee.
//!
//! ## Modular Structure
//!
//! - `container/` - Configuration and error types
//! - `adapters/` - Port implementations connecting the crates
//! - `logging` - Subscriber bootstrap
//! - `cluster` - In-process committee of operators for local runs
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (defaults, then `DV_*` environment overrides)
//! 2. Validate it
//! 3. Initialize logging
//! 4. Build one validator per operator and connect them
//! 5. Start duties as slots tick

pub mod adapters;
pub mod cluster;
pub mod container;
pub mod logging;

pub use adapters::{LocalNetwork, NetworkEventBus, OperatorDecision};
pub use cluster::{ClusterNode, LocalCluster};
pub use container::{ConfigError, NodeConfig};
