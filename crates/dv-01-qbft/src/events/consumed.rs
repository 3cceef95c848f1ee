//! Events consumed by the instance

use serde::{Deserialize, Serialize};
use shared_types::{Height, Round};

/// Fired by the round timer when `round` at `height` expires.
///
/// Stale events (wrong height or an already-left round) are ignored by the
/// instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundTimeout {
    pub height: Height,
    pub round: Round,
}
