//! # Validator Dispatch
//!
//! Everything between the transport and the consensus instances of one
//! distributed validator.
//!
//! ```text
//! topic, bytes ──→ MessageValidator ──Accept──→ DecodedMessage
//!                                                   │
//!                                   Validator::process_message
//!                                                   │ by role
//!                                              DutyRunner
//!                             ┌─────────────────────┼──────────────────────┐
//!                       pre-consensus          consensus queue       post-consensus
//!                      PartialSigContainer   → Instance (dv-01)    PartialSigContainer
//! ```
//!
//! Each runner owns one instance at a time, its queue and its round timer.
//! Starting a duty stops the previous instance of that role and starts the
//! next height.

pub mod domain;
pub mod error;
pub mod msg_validator;
pub mod runner;
pub mod validator;

pub use domain::*;
pub use error::{ValidatorError, ValidatorResult};
pub use msg_validator::{subnet_for, validator_topic, MessageValidator, ValidationResult};
pub use runner::{DutyRunner, RunnerConfig, FUTURE_HEIGHT_WINDOW};
pub use validator::Validator;
