//! Deterministic committee fixtures
//!
//! Operator `i` signs with an Ed25519 key seeded by `[i; 32]`.

use crate::adapters::{Ed25519Signer, Ed25519Verifier, InMemoryDecidedStore, InMemoryEventBus};
use crate::domain::{ConsensusMessage, MessageType, PreparedCertificate, SignedMessage};
use crate::instance::InstanceDependencies;
use crate::ports::MessageSigner;
use shared_types::{
    Height, MessageId, Operator, OperatorId, Round, RunnerRole, Share, ValidatorPubKey,
    VALIDATOR_PUBKEY_LEN,
};
use std::sync::Arc;

pub fn test_validator_pk() -> ValidatorPubKey {
    ValidatorPubKey([0xa5; VALIDATOR_PUBKEY_LEN])
}

pub struct TestCommittee {
    pub identifier: MessageId,
    signers: Vec<Arc<Ed25519Signer>>,
}

impl TestCommittee {
    /// Operators `1..=n` running `role` for [`test_validator_pk`].
    pub fn new(n: u64, role: RunnerRole) -> Self {
        let signers = (1..=n)
            .map(|id| Arc::new(Ed25519Signer::from_seed(id, [id as u8; 32])))
            .collect();
        Self {
            identifier: MessageId::new(test_validator_pk(), role),
            signers,
        }
    }

    pub fn operators(&self) -> Vec<Operator> {
        self.signers
            .iter()
            .map(|s| Operator {
                id: s.operator_id(),
                public_key: s.public_key(),
            })
            .collect()
    }

    /// The share as seen by `operator_id`.
    pub fn share(&self, operator_id: OperatorId) -> Share {
        Share::new(test_validator_pk(), operator_id, self.operators())
            .expect("operator is a committee member")
    }

    pub fn signer(&self, operator_id: OperatorId) -> Arc<Ed25519Signer> {
        self.signers[(operator_id - 1) as usize].clone()
    }

    /// Ports backed by in-memory adapters, signing as `operator_id`.
    pub fn dependencies(
        &self,
        operator_id: OperatorId,
    ) -> (InstanceDependencies, Arc<InMemoryEventBus>, Arc<InMemoryDecidedStore>) {
        let bus = Arc::new(InMemoryEventBus::new());
        let store = Arc::new(InMemoryDecidedStore::new());
        let deps = InstanceDependencies {
            event_bus: bus.clone(),
            signer: self.signer(operator_id),
            verifier: Arc::new(Ed25519Verifier),
            store: store.clone(),
        };
        (deps, bus, store)
    }

    pub fn sign(&self, operator_id: OperatorId, message: ConsensusMessage) -> SignedMessage {
        let signature = self
            .signer(operator_id)
            .sign_root(&message.signing_root())
            .expect("ed25519 signing is infallible");
        SignedMessage {
            message,
            signers: vec![operator_id],
            signature,
        }
    }

    fn vote(
        &self,
        msg_type: MessageType,
        operator_id: OperatorId,
        height: Height,
        round: Round,
        value: &[u8],
    ) -> SignedMessage {
        let message = ConsensusMessage::new(msg_type, self.identifier, height, round, value.to_vec());
        self.sign(operator_id, message)
    }

    pub fn pre_prepare(&self, op: OperatorId, height: Height, round: Round, value: &[u8]) -> SignedMessage {
        self.vote(MessageType::PrePrepare, op, height, round, value)
    }

    pub fn prepare(&self, op: OperatorId, height: Height, round: Round, value: &[u8]) -> SignedMessage {
        self.vote(MessageType::Prepare, op, height, round, value)
    }

    pub fn commit(&self, op: OperatorId, height: Height, round: Round, value: &[u8]) -> SignedMessage {
        self.vote(MessageType::Commit, op, height, round, value)
    }

    pub fn round_change(
        &self,
        op: OperatorId,
        height: Height,
        round: Round,
        prepared: Option<PreparedCertificate>,
    ) -> SignedMessage {
        let message = ConsensusMessage::round_change(self.identifier, height, round, prepared);
        self.sign(op, message)
    }

    /// A certificate backed by prepares from `signers`.
    pub fn prepared_certificate(
        &self,
        signers: &[OperatorId],
        height: Height,
        round: Round,
        value: &[u8],
    ) -> PreparedCertificate {
        PreparedCertificate {
            round,
            value: value.to_vec(),
            prepares: signers
                .iter()
                .map(|op| self.prepare(*op, height, round, value))
                .collect(),
        }
    }
}
