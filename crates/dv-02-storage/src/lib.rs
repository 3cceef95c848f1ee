//! # Decided Storage
//!
//! Persists decided QBFT instances behind a prefix-addressed key-value port.
//!
//! ## Layout
//!
//! ```text
//! <role>/decided/<identifier><height BE>  -> bincode(DecidedInstance)
//! <role>/highest/<identifier>             -> bincode(DecidedInstance)
//! ```
//!
//! Big-endian heights keep a prefix scan ordered by height.
//!
//! ## Backends
//!
//! - [`InMemoryStore`]: tests and the local cluster.
//! - `RocksDbStore` (feature `rocksdb`): durable storage.

pub mod adapters;
pub mod ports;
pub mod qbft_store;

pub use adapters::*;
pub use ports::{BatchOperation, KeyValueStore};
pub use qbft_store::QbftStore;
