//! # Core Domain Entities
//!
//! ## Clusters
//!
//! - **Validator**: `ValidatorPubKey`, `RunnerRole`
//! - **Consensus addressing**: `MessageId`, `Height`, `Round`
//! - **Beacon time**: `Slot`, `Epoch`

use crate::errors::IdentifierError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_with::{serde_as, Bytes};
use std::fmt;

/// Committee member identifier.
pub type OperatorId = u64;

/// Sequence number of a duty occurrence within one identifier's stream.
pub type Height = u64;

/// Round within a height. Starts at [`FIRST_ROUND`].
pub type Round = u64;

/// Beacon-chain slot.
pub type Slot = u64;

/// Beacon-chain epoch.
pub type Epoch = u64;

/// A 32-byte SHA-256 digest.
pub type Hash = [u8; 32];

pub const FIRST_HEIGHT: Height = 0;
pub const FIRST_ROUND: Round = 1;

/// Length of a BLS12-381 validator public key.
pub const VALIDATOR_PUBKEY_LEN: usize = 48;

/// Length of an encoded [`MessageId`]: public key followed by a LE role tag.
pub const MESSAGE_ID_LEN: usize = VALIDATOR_PUBKEY_LEN + 4;

pub const SLOTS_PER_EPOCH: u64 = 32;

// =============================================================================
// VALIDATOR
// =============================================================================

/// Public key of the distributed validator the committee signs for.
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValidatorPubKey(#[serde_as(as = "Bytes")] pub [u8; VALIDATOR_PUBKEY_LEN]);

impl ValidatorPubKey {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, IdentifierError> {
        let key: [u8; VALIDATOR_PUBKEY_LEN] =
            bytes
                .try_into()
                .map_err(|_| IdentifierError::InvalidPublicKeyLength {
                    expected: VALIDATOR_PUBKEY_LEN,
                    actual: bytes.len(),
                })?;
        Ok(Self(key))
    }

    pub fn from_hex(s: &str) -> Result<Self, IdentifierError> {
        let bytes = hex::decode(s).map_err(|e| IdentifierError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; VALIDATOR_PUBKEY_LEN] {
        &self.0
    }

    /// Short hex prefix used in log fields and duty IDs.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for ValidatorPubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for ValidatorPubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValidatorPubKey({}..)", self.short())
    }
}

/// Duty role a runner executes. Passed through the core without
/// interpretation beyond routing and timer anchoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i32)]
pub enum RunnerRole {
    Attester = 0,
    Aggregator = 1,
    Proposer = 2,
    SyncCommitteeContribution = 3,
    ValidatorRegistration = 4,
    VoluntaryExit = 5,
    Committee = 6,
}

impl RunnerRole {
    pub const ALL: [RunnerRole; 7] = [
        RunnerRole::Attester,
        RunnerRole::Aggregator,
        RunnerRole::Proposer,
        RunnerRole::SyncCommitteeContribution,
        RunnerRole::ValidatorRegistration,
        RunnerRole::VoluntaryExit,
        RunnerRole::Committee,
    ];

    /// Returns `None` for unknown tags (including the `-1` "unknown" marker).
    pub fn from_i32(value: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|role| role.to_i32() == value)
    }

    pub fn to_i32(self) -> i32 {
        self as i32
    }

    /// Runner name.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunnerRole::Committee => "COMMITTEE_RUNNER",
            RunnerRole::Attester => "ATTESTER_RUNNER",
            RunnerRole::Aggregator => "AGGREGATOR_RUNNER",
            RunnerRole::Proposer => "PROPOSER_RUNNER",
            RunnerRole::SyncCommitteeContribution => "SYNC_COMMITTEE_CONTRIBUTION_RUNNER",
            RunnerRole::ValidatorRegistration => "VALIDATOR_REGISTRATION_RUNNER",
            RunnerRole::VoluntaryExit => "VOLUNTARY_EXIT_RUNNER",
        }
    }

    /// Beacon-chain role name. The committee runner has no single beacon role.
    pub fn beacon_role(&self) -> &'static str {
        match self {
            RunnerRole::Attester => "ATTESTER",
            RunnerRole::Aggregator => "AGGREGATOR",
            RunnerRole::Proposer => "PROPOSER",
            RunnerRole::SyncCommitteeContribution => "SYNC_COMMITTEE_CONTRIBUTION",
            RunnerRole::ValidatorRegistration => "VALIDATOR_REGISTRATION",
            RunnerRole::VoluntaryExit => "VOLUNTARY_EXIT",
            RunnerRole::Committee => "UNDEFINED",
        }
    }

    /// Registration and exit duties only collect partial signatures.
    pub fn requires_consensus(&self) -> bool {
        !matches!(
            self,
            RunnerRole::ValidatorRegistration | RunnerRole::VoluntaryExit
        )
    }

    /// Duties that need a partial threshold signature before agreement
    /// (selection proofs, randao reveals, registration/exit signatures).
    pub fn requires_pre_consensus(&self) -> bool {
        matches!(
            self,
            RunnerRole::Aggregator
                | RunnerRole::Proposer
                | RunnerRole::SyncCommitteeContribution
                | RunnerRole::ValidatorRegistration
                | RunnerRole::VoluntaryExit
        )
    }
}

impl fmt::Display for RunnerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// CONSENSUS ADDRESSING
// =============================================================================

/// Identifies one duty stream: a validator and the role it runs.
///
/// Together with a [`Height`] it addresses exactly one consensus instance.
/// On the wire it is the hex encoding of `pubkey || role (i32 LE)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId {
    pub validator_pk: ValidatorPubKey,
    pub role: RunnerRole,
}

impl MessageId {
    pub fn new(validator_pk: ValidatorPubKey, role: RunnerRole) -> Self {
        Self { validator_pk, role }
    }

    pub fn to_bytes(&self) -> [u8; MESSAGE_ID_LEN] {
        let mut out = [0u8; MESSAGE_ID_LEN];
        out[..VALIDATOR_PUBKEY_LEN].copy_from_slice(self.validator_pk.as_bytes());
        out[VALIDATOR_PUBKEY_LEN..].copy_from_slice(&self.role.to_i32().to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentifierError> {
        if bytes.len() != MESSAGE_ID_LEN {
            return Err(IdentifierError::InvalidLength {
                expected: MESSAGE_ID_LEN,
                actual: bytes.len(),
            });
        }
        let validator_pk = ValidatorPubKey::from_slice(&bytes[..VALIDATOR_PUBKEY_LEN])?;
        let mut tag = [0u8; 4];
        tag.copy_from_slice(&bytes[VALIDATOR_PUBKEY_LEN..]);
        let tag = i32::from_le_bytes(tag);
        let role = RunnerRole::from_i32(tag).ok_or(IdentifierError::UnknownRole(tag))?;
        Ok(Self { validator_pk, role })
    }

    pub fn from_hex(s: &str) -> Result<Self, IdentifierError> {
        let bytes = hex::decode(s).map_err(|e| IdentifierError::InvalidHex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn belongs_to(&self, validator_pk: &ValidatorPubKey) -> bool {
        self.validator_pk == *validator_pk
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.to_bytes()))
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({}/{})", self.validator_pk.short(), self.role)
    }
}

impl Serialize for MessageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        MessageId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Epoch containing `slot`.
pub fn epoch_at_slot(slot: Slot) -> Epoch {
    slot / SLOTS_PER_EPOCH
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pk(byte: u8) -> ValidatorPubKey {
        ValidatorPubKey([byte; VALIDATOR_PUBKEY_LEN])
    }

    #[test]
    fn test_role_names() {
        assert_eq!(RunnerRole::Attester.as_str(), "ATTESTER_RUNNER");
        assert_eq!(RunnerRole::Committee.as_str(), "COMMITTEE_RUNNER");
        assert_eq!(RunnerRole::Committee.beacon_role(), "UNDEFINED");
        assert_eq!(
            RunnerRole::SyncCommitteeContribution.beacon_role(),
            "SYNC_COMMITTEE_CONTRIBUTION"
        );
    }

    #[test]
    fn test_role_from_unknown_tag() {
        assert_eq!(RunnerRole::from_i32(-1), None);
        assert_eq!(RunnerRole::from_i32(7), None);
        assert_eq!(RunnerRole::from_i32(2), Some(RunnerRole::Proposer));
    }

    #[test]
    fn test_consensus_requirements() {
        assert!(RunnerRole::Attester.requires_consensus());
        assert!(!RunnerRole::Attester.requires_pre_consensus());
        assert!(!RunnerRole::VoluntaryExit.requires_consensus());
        assert!(RunnerRole::Proposer.requires_pre_consensus());
    }

    #[test]
    fn test_message_id_hex_encoding() {
        let id = MessageId::new(pk(0xab), RunnerRole::Aggregator);
        let parsed = MessageId::from_hex(&id.to_string()).unwrap();
        assert_eq!(parsed, id);

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
    }

    #[test]
    fn test_message_id_rejects_short_key() {
        let err = MessageId::from_hex("10101011").unwrap_err();
        assert!(matches!(err, IdentifierError::InvalidLength { .. }));
    }

    #[test]
    fn test_message_id_rejects_unknown_role() {
        let mut bytes = MessageId::new(pk(1), RunnerRole::Attester).to_bytes();
        bytes[VALIDATOR_PUBKEY_LEN..].copy_from_slice(&(-1i32).to_le_bytes());
        assert!(matches!(
            MessageId::from_bytes(&bytes),
            Err(IdentifierError::UnknownRole(-1))
        ));
    }

    #[test]
    fn test_belongs_to() {
        let id = MessageId::new(pk(1), RunnerRole::Attester);
        assert!(id.belongs_to(&pk(1)));
        assert!(!id.belongs_to(&pk(2)));
    }
}
