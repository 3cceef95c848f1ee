//! Transport message validator
//!
//! The pubsub layer calls [`MessageValidator::validate`] on every inbound
//! message before it is delivered or forwarded. Structural problems are
//! rejected so the sender is penalized; messages that are well-formed but
//! not ours to handle are ignored.

use crate::domain::{MsgType, WireMessage};
use sha2::{Digest, Sha256};
use shared_types::ValidatorPubKey;
use std::collections::HashSet;
use tracing::debug;

pub const SUBNETS_COUNT: u64 = 128;
pub const TOPIC_PREFIX: &str = "ssv.v2.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationResult {
    Accept,
    Reject,
    Ignore,
}

/// Subnet a validator's messages are published on: the first 8 bytes of
/// `sha256(pk)` as a big-endian integer, modulo [`SUBNETS_COUNT`].
pub fn subnet_for(pk: &ValidatorPubKey) -> u64 {
    let digest = Sha256::digest(pk.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head) % SUBNETS_COUNT
}

pub fn validator_topic(pk: &ValidatorPubKey) -> String {
    format!("{}{}", TOPIC_PREFIX, subnet_for(pk))
}

#[derive(Debug, Clone, Default)]
pub struct MessageValidator {
    /// Validators this node operates. `None` accepts any validator.
    registry: Option<HashSet<ValidatorPubKey>>,
}

impl MessageValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(validators: impl IntoIterator<Item = ValidatorPubKey>) -> Self {
        Self {
            registry: Some(validators.into_iter().collect()),
        }
    }

    pub fn validate(&self, topic: &str, data: &[u8]) -> ValidationResult {
        if data.is_empty() {
            debug!(topic, "[p2p] Rejecting empty message");
            return ValidationResult::Reject;
        }
        let wire = match WireMessage::from_bytes(data) {
            Ok(wire) => wire,
            Err(e) => {
                debug!(topic, error = %e, "[p2p] Rejecting undecodable message");
                return ValidationResult::Reject;
            }
        };
        if wire.msg_type == MsgType::Event {
            debug!(topic, "[p2p] Rejecting event message from the network");
            return ValidationResult::Reject;
        }
        let pk = wire.msg_id.validator_pk;
        let expected = validator_topic(&pk);
        if topic != expected {
            debug!(topic, %expected, "[p2p] Rejecting message on wrong topic");
            return ValidationResult::Reject;
        }
        if let Some(registry) = &self.registry {
            if !registry.contains(&pk) {
                return ValidationResult::Ignore;
            }
        }
        ValidationResult::Accept
    }
}
