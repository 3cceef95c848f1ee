//! Events layer
//!
//! Published: [`DecidedEvent`]. Consumed: [`RoundTimeout`] from the round
//! timer.

mod consumed;
mod published;

pub use consumed::*;
pub use published::*;
