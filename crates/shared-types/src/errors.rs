//! # Error Types
//!
//! Error types used across subsystems.

use crate::entities::OperatorId;
use thiserror::Error;

/// Errors raised by key-value storage backends.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// Key not present under the prefix.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backend operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Stored value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors parsing validator keys and message identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("Invalid identifier length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid validator public key length: expected {expected} bytes, got {actual}")]
    InvalidPublicKeyLength { expected: usize, actual: usize },

    #[error("Unknown runner role tag: {0}")]
    UnknownRole(i32),

    #[error("Invalid hex: {0}")]
    InvalidHex(String),
}

/// Errors building a committee share.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitteeError {
    #[error("Committee is empty")]
    Empty,

    #[error("Operator {0} appears twice in the committee")]
    DuplicateOperator(OperatorId),

    #[error("Operator {0} is not a committee member")]
    NotAMember(OperatorId),
}
