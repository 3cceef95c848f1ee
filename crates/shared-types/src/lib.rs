//! # Shared Types Crate
//!
//! Domain identities and committee arithmetic shared by the consensus core,
//! the storage layer and the validator dispatch layer.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: identifiers, roles and quorum parameters are
//!   defined once here.
//! - **Immutable addressing**: a `MessageId` never changes once an instance
//!   stream is created for it.
//! - **Fixed quorum**: `QuorumParams` are derived once per committee and never
//!   mutated afterwards.

pub mod committee;
pub mod entities;
pub mod errors;

pub use committee::*;
pub use entities::*;
pub use errors::*;
