//! Consensus messages
//!
//! Every message carries `(height, round, identifier)`. Round changes may
//! additionally carry a prepared certificate: the round and value the
//! sender prepared, backed by the quorum of prepares that made it so.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shared_types::{Hash, Height, MessageId, OperatorId, Round};
use std::fmt;

/// Domain separator mixed into every signing root.
const SIGNING_DOMAIN: &[u8] = b"dv-qbft/consensus/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    PrePrepare,
    Prepare,
    Commit,
    RoundChange,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::PrePrepare => "pre_prepare",
            MessageType::Prepare => "prepare",
            MessageType::Commit => "commit",
            MessageType::RoundChange => "round_change",
        }
    }

    fn tag(&self) -> u8 {
        match self {
            MessageType::PrePrepare => 0,
            MessageType::Prepare => 1,
            MessageType::Commit => 2,
            MessageType::RoundChange => 3,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Proof that a quorum prepared `value` in `round`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedCertificate {
    pub round: Round,
    #[serde(with = "hex::serde")]
    pub value: Vec<u8>,
    /// Prepare messages of the quorum. Not covered by the signing root.
    pub prepares: Vec<SignedMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusMessage {
    pub msg_type: MessageType,
    pub height: Height,
    pub round: Round,
    pub identifier: MessageId,
    /// Proposed or voted value. Empty for round changes.
    #[serde(with = "hex::serde")]
    pub value: Vec<u8>,
    #[serde(default)]
    pub prepared: Option<PreparedCertificate>,
}

impl ConsensusMessage {
    pub fn new(
        msg_type: MessageType,
        identifier: MessageId,
        height: Height,
        round: Round,
        value: Vec<u8>,
    ) -> Self {
        Self {
            msg_type,
            height,
            round,
            identifier,
            value,
            prepared: None,
        }
    }

    pub fn round_change(
        identifier: MessageId,
        height: Height,
        round: Round,
        prepared: Option<PreparedCertificate>,
    ) -> Self {
        Self {
            prepared,
            ..Self::new(MessageType::RoundChange, identifier, height, round, Vec::new())
        }
    }

    pub fn prepared_round(&self) -> Option<Round> {
        self.prepared.as_ref().map(|cert| cert.round)
    }

    pub fn prepared_value(&self) -> Option<&[u8]> {
        self.prepared.as_ref().map(|cert| cert.value.as_slice())
    }

    /// SHA-256 root signed by operators.
    ///
    /// Length-prefixed fields so no two distinct messages share a root. The
    /// prepare quorum inside a certificate is excluded; it is checked
    /// message by message instead.
    pub fn signing_root(&self) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(SIGNING_DOMAIN);
        hasher.update([self.msg_type.tag()]);
        hasher.update(self.height.to_be_bytes());
        hasher.update(self.round.to_be_bytes());
        hasher.update(self.identifier.to_bytes());
        hasher.update((self.value.len() as u64).to_be_bytes());
        hasher.update(&self.value);
        match &self.prepared {
            Some(cert) => {
                hasher.update([1u8]);
                hasher.update(cert.round.to_be_bytes());
                hasher.update((cert.value.len() as u64).to_be_bytes());
                hasher.update(&cert.value);
            }
            None => hasher.update([0u8]),
        }
        hasher.finalize().into()
    }
}

/// A consensus message with its signers and signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMessage {
    pub message: ConsensusMessage,
    pub signers: Vec<OperatorId>,
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
}

impl SignedMessage {
    /// The signer of a single-signer message.
    pub fn signer(&self) -> Option<OperatorId> {
        match self.signers.as_slice() {
            [signer] => Some(*signer),
            _ => None,
        }
    }

    pub fn msg_type(&self) -> MessageType {
        self.message.msg_type
    }

    pub fn height(&self) -> Height {
        self.message.height
    }

    pub fn round(&self) -> Round {
        self.message.round
    }

    pub fn value(&self) -> &[u8] {
        &self.message.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{RunnerRole, ValidatorPubKey, VALIDATOR_PUBKEY_LEN};

    fn id() -> MessageId {
        MessageId::new(ValidatorPubKey([7; VALIDATOR_PUBKEY_LEN]), RunnerRole::Attester)
    }

    #[test]
    fn test_signing_root_binds_every_field() {
        let base = ConsensusMessage::new(MessageType::Prepare, id(), 0, 1, b"v".to_vec());
        let root = base.signing_root();

        let mut other_round = base.clone();
        other_round.round = 2;
        assert_ne!(other_round.signing_root(), root);

        let mut other_type = base.clone();
        other_type.msg_type = MessageType::Commit;
        assert_ne!(other_type.signing_root(), root);

        let mut other_value = base.clone();
        other_value.value = b"w".to_vec();
        assert_ne!(other_value.signing_root(), root);

        assert_eq!(base.clone().signing_root(), root);
    }

    #[test]
    fn test_certificate_changes_round_change_root() {
        let bare = ConsensusMessage::round_change(id(), 0, 2, None);
        let with_cert = ConsensusMessage::round_change(
            id(),
            0,
            2,
            Some(PreparedCertificate {
                round: 1,
                value: b"v".to_vec(),
                prepares: Vec::new(),
            }),
        );
        assert_ne!(bare.signing_root(), with_cert.signing_root());
        assert_eq!(with_cert.prepared_round(), Some(1));
        assert_eq!(with_cert.prepared_value(), Some(&b"v"[..]));
    }

    #[test]
    fn test_signer_requires_single_signer() {
        let msg = SignedMessage {
            message: ConsensusMessage::new(MessageType::Commit, id(), 0, 1, vec![1]),
            signers: vec![1, 2],
            signature: vec![],
        };
        assert_eq!(msg.signer(), None);
    }

    #[test]
    fn test_json_uses_hex_values() {
        let msg = SignedMessage {
            message: ConsensusMessage::new(MessageType::PrePrepare, id(), 3, 1, vec![0xde, 0xad]),
            signers: vec![1],
            signature: vec![0xff],
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"dead\""));
        let decoded: SignedMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, msg);
    }
}
