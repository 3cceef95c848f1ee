//! Event Bus adapter
//!
//! Records everything the instance emits. Used by tests and by runtimes
//! that poll for decisions instead of subscribing.

use crate::domain::{MessageType, SignedMessage};
use crate::events::DecidedEvent;
use crate::ports::EventBus;
use parking_lot::RwLock;

/// In-memory event bus adapter
#[derive(Debug, Default)]
pub struct InMemoryEventBus {
    broadcasts: RwLock<Vec<SignedMessage>>,
    decided: RwLock<Vec<DecidedEvent>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn broadcasts(&self) -> Vec<SignedMessage> {
        self.broadcasts.read().clone()
    }

    pub fn broadcasts_of(&self, msg_type: MessageType) -> Vec<SignedMessage> {
        self.broadcasts
            .read()
            .iter()
            .filter(|msg| msg.msg_type() == msg_type)
            .cloned()
            .collect()
    }

    pub fn decided(&self) -> Vec<DecidedEvent> {
        self.decided.read().clone()
    }

    /// Take and clear recorded broadcasts.
    pub fn drain_broadcasts(&self) -> Vec<SignedMessage> {
        std::mem::take(&mut *self.broadcasts.write())
    }
}

impl EventBus for InMemoryEventBus {
    fn broadcast(&self, msg: &SignedMessage) -> Result<(), String> {
        self.broadcasts.write().push(msg.clone());
        Ok(())
    }

    fn publish_decided(&self, event: &DecidedEvent) -> Result<(), String> {
        self.decided.write().push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ConsensusMessage;
    use shared_types::{MessageId, RunnerRole, ValidatorPubKey, VALIDATOR_PUBKEY_LEN};

    #[test]
    fn test_records_by_type() {
        let bus = InMemoryEventBus::new();
        let id = MessageId::new(ValidatorPubKey([2; VALIDATOR_PUBKEY_LEN]), RunnerRole::Proposer);
        for msg_type in [MessageType::Prepare, MessageType::Commit, MessageType::Prepare] {
            let msg = SignedMessage {
                message: ConsensusMessage::new(msg_type, id, 0, 1, vec![]),
                signers: vec![1],
                signature: vec![],
            };
            bus.broadcast(&msg).unwrap();
        }
        assert_eq!(bus.broadcasts_of(MessageType::Prepare).len(), 2);
        assert_eq!(bus.drain_broadcasts().len(), 3);
        assert!(bus.broadcasts().is_empty());
    }
}
