//! Dispatch-layer errors
//!
//! Each variant names the stage that failed: runner lookup, decoding,
//! boundary validation or the consensus call underneath.

use dv_01_qbft::QbftError;
use shared_types::{Height, MessageId, OperatorId, RunnerRole, StorageError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("no runner for duty type {0}")]
    NoRunner(RunnerRole),

    #[error("could not get duty runner for msg ID {0}")]
    NoRunnerForMessage(MessageId),

    #[error("message invalid for msg ID {msg_id}: {reason}")]
    InvalidMessage { msg_id: MessageId, reason: &'static str },

    #[error("could not decode message: {0}")]
    Decode(String),

    #[error("{0} does not run pre-consensus")]
    NoPreConsensus(RunnerRole),

    #[error("no decided value for post-consensus message")]
    NotDecided,

    #[error("no duty running for {0}")]
    NoRunningDuty(RunnerRole),

    #[error("signer {0} is not in the committee")]
    UnknownSigner(OperatorId),

    #[error("consensus message from {0:?} has no valid committee signature")]
    InvalidSignature(Vec<OperatorId>),

    #[error("consensus message for height {height} is past the horizon {horizon}")]
    HeightOutOfWindow { height: Height, horizon: Height },

    #[error(transparent)]
    Qbft(#[from] QbftError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type ValidatorResult<T> = Result<T, ValidatorError>;
