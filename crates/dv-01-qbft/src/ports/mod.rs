//! Ports layer (Hexagonal Architecture)
//!
//! The instance is driven through its own methods; everything it drives
//! lives behind the outbound traits here.

mod outbound;

pub use outbound::*;
