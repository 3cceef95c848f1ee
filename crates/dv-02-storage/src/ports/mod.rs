//! Ports
//!
//! - `outbound`: the key-value backend the store is written against.

pub mod outbound;

pub use outbound::*;
