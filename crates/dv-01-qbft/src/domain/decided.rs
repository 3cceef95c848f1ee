//! Decided instances

use super::message::SignedMessage;
use crate::events::DecidedEvent;
use serde::{Deserialize, Serialize};
use shared_types::{Height, MessageId, OperatorId, Round};

/// A decided value and the commit quorum that decided it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecidedInstance {
    pub identifier: MessageId,
    pub height: Height,
    pub round: Round,
    #[serde(with = "hex::serde")]
    pub value: Vec<u8>,
    pub commits: Vec<SignedMessage>,
}

impl DecidedInstance {
    pub fn signers(&self) -> Vec<OperatorId> {
        let mut signers: Vec<OperatorId> =
            self.commits.iter().filter_map(SignedMessage::signer).collect();
        signers.sort_unstable();
        signers.dedup();
        signers
    }

    pub fn to_event(&self) -> DecidedEvent {
        DecidedEvent {
            identifier: self.identifier,
            height: self.height,
            round: self.round,
            value: self.value.clone(),
            signers: self.signers(),
        }
    }
}
