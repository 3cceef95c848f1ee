//! Adapters layer
//!
//! Implementations of the outbound ports that do not need another crate:
//! an in-memory event bus and decided store, Ed25519 message signing and a
//! genesis-based slot clock.

mod ed25519;
mod event_bus;
mod memory_store;
mod slot_clock;

pub use ed25519::*;
pub use event_bus::*;
pub use memory_store::*;
pub use slot_clock::*;
