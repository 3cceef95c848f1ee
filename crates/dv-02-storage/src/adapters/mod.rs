//! Storage backends

pub mod memory;
#[cfg(feature = "rocksdb")]
pub mod rocks_db;

pub use memory::*;
#[cfg(feature = "rocksdb")]
pub use rocks_db::*;
