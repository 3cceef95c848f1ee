//! Events published by the instance

use serde::{Deserialize, Serialize};
use shared_types::{Height, MessageId, OperatorId, Round};

/// Emitted exactly once per (identifier, height) when a commit quorum forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecidedEvent {
    pub identifier: MessageId,
    pub height: Height,
    pub round: Round,
    #[serde(with = "hex::serde")]
    pub value: Vec<u8>,
    pub signers: Vec<OperatorId>,
}
