//! Error types for the QBFT instance

use shared_types::{Height, MessageId, OperatorId, Round, StorageError};

/// QBFT error types.
///
/// Variants for which [`QbftError::is_protocol_rejection`] returns `true`
/// describe a message that was validly received but does not advance the
/// protocol. They are logged and the message is consumed; they never
/// surface as hard failures of `process_message`.
#[derive(Debug, thiserror::Error)]
pub enum QbftError {
    #[error("Message for identifier {actual:?}, instance runs {expected:?}")]
    WrongIdentifier {
        expected: MessageId,
        actual: MessageId,
    },

    #[error("Message for height {actual}, instance runs height {expected}")]
    WrongHeight { expected: Height, actual: Height },

    #[error("Consensus messages need exactly one signer, got {0}")]
    InvalidSigners(usize),

    #[error("Signer {0} is not a committee member")]
    UnknownSigner(OperatorId),

    #[error("Signature verification failed for operator {0}")]
    InvalidSignature(OperatorId),

    #[error("Operator {signer} is not the leader of round {round} (leader is {leader})")]
    NotLeader {
        signer: OperatorId,
        leader: OperatorId,
        round: Round,
    },

    #[error("Duplicate {kind} from operator {signer} in round {round}")]
    DuplicateSigner {
        kind: &'static str,
        signer: OperatorId,
        round: Round,
    },

    #[error("Proposal for round {0} already accepted")]
    DuplicateProposal(Round),

    #[error("Pre-prepare for round {0} has no justified round change")]
    UnjustifiedPrePrepare(Round),

    #[error("Pre-prepare value in round {0} does not match the justified value")]
    PrePrepareValueMismatch(Round),

    #[error("Round change reports conflicting prepared values at round {round}")]
    ConflictingPreparedValues { round: Round },

    #[error("Invalid prepared certificate: {0}")]
    InvalidPreparedCertificate(String),

    #[error("Instance already started")]
    AlreadyStarted,

    #[error("Instance not started")]
    NotStarted,

    #[error("Message queue full ({capacity} messages)")]
    QueueFull { capacity: usize },

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Event bus error: {0}")]
    EventBus(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl QbftError {
    /// `true` when a received message is simply not acceptable under the
    /// protocol rules, as opposed to a local failure.
    pub fn is_protocol_rejection(&self) -> bool {
        matches!(
            self,
            QbftError::WrongIdentifier { .. }
                | QbftError::WrongHeight { .. }
                | QbftError::InvalidSigners(_)
                | QbftError::UnknownSigner(_)
                | QbftError::InvalidSignature(_)
                | QbftError::NotLeader { .. }
                | QbftError::DuplicateSigner { .. }
                | QbftError::DuplicateProposal(_)
                | QbftError::UnjustifiedPrePrepare(_)
                | QbftError::PrePrepareValueMismatch(_)
                | QbftError::ConflictingPreparedValues { .. }
                | QbftError::InvalidPreparedCertificate(_)
        )
    }

    /// Short label used for rejection metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            QbftError::WrongIdentifier { .. } => "wrong_identifier",
            QbftError::WrongHeight { .. } => "wrong_height",
            QbftError::InvalidSigners(_) => "invalid_signers",
            QbftError::UnknownSigner(_) => "unknown_signer",
            QbftError::InvalidSignature(_) => "invalid_signature",
            QbftError::NotLeader { .. } => "not_leader",
            QbftError::DuplicateSigner { .. } => "duplicate_signer",
            QbftError::DuplicateProposal(_) => "duplicate_proposal",
            QbftError::UnjustifiedPrePrepare(_) => "unjustified_pre_prepare",
            QbftError::PrePrepareValueMismatch(_) => "value_mismatch",
            QbftError::ConflictingPreparedValues { .. } => "conflicting_prepared",
            QbftError::InvalidPreparedCertificate(_) => "invalid_certificate",
            QbftError::AlreadyStarted => "already_started",
            QbftError::NotStarted => "not_started",
            QbftError::QueueFull { .. } => "queue_full",
            QbftError::Signing(_) => "signing",
            QbftError::EventBus(_) => "event_bus",
            QbftError::Storage(_) => "storage",
        }
    }
}

/// Result type for QBFT operations
pub type QbftResult<T> = Result<T, QbftError>;
