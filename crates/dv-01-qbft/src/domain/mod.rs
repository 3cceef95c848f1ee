//! Domain layer for the QBFT instance
//!
//! Pure types and rules. Nothing here talks to the network, the clock or
//! storage.

pub mod container;
pub mod decided;
pub mod error;
pub mod justification;
pub mod message;
pub mod state;

pub use container::MessageContainer;
pub use decided::DecidedInstance;
pub use error::{QbftError, QbftResult};
pub use justification::{
    justify_pre_prepare, justify_round_change, validate_prepared_certificate,
    RoundChangeJustification,
};
pub use message::{ConsensusMessage, MessageType, PreparedCertificate, SignedMessage};
pub use state::{AcceptedProposal, InstanceSnapshot, InstanceState, JustifiedRound, Stage};
