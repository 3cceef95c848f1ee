//! Driven ports (Outbound dependencies)

use crate::domain::{DecidedInstance, SignedMessage};
use crate::events::DecidedEvent;
use shared_types::{Hash, Height, MessageId, OperatorId, Share, Slot, StorageError};
use std::time::Duration;
use tokio::time::Instant;

/// Outgoing side of the instance: consensus messages to the committee and
/// decided values to whoever runs the duty.
///
/// Called with the instance lock held. Implementations must not call back
/// into the instance synchronously.
pub trait EventBus: Send + Sync {
    /// Broadcast a signed consensus message to all committee members,
    /// including ourselves.
    fn broadcast(&self, msg: &SignedMessage) -> Result<(), String>;

    /// Publish the decided value of an instance.
    fn publish_decided(&self, event: &DecidedEvent) -> Result<(), String>;
}

/// Signs consensus messages as this operator.
pub trait MessageSigner: Send + Sync {
    fn operator_id(&self) -> OperatorId;

    /// Sign a message signing root.
    fn sign_root(&self, root: &Hash) -> Result<Vec<u8>, String>;
}

/// Verifies consensus message signatures against the committee.
pub trait SignatureVerifier: Send + Sync {
    /// `true` iff every signer is in `share`'s committee and the signature
    /// covers the message signing root.
    fn verify(&self, msg: &SignedMessage, share: &Share) -> bool;
}

/// Persistence of decided instances.
pub trait DecidedStore: Send + Sync {
    fn save_decided(&self, decided: &DecidedInstance) -> Result<(), StorageError>;

    fn get_decided(
        &self,
        identifier: &MessageId,
        height: Height,
    ) -> Result<Option<DecidedInstance>, StorageError>;

    fn get_highest_decided(
        &self,
        identifier: &MessageId,
    ) -> Result<Option<DecidedInstance>, StorageError>;
}

/// Beacon-chain slot timing, expressed on the tokio clock so timers can be
/// tested with paused time.
pub trait SlotClock: Send + Sync {
    fn slot_start_time(&self, slot: Slot) -> Instant;

    fn slot_duration(&self) -> Duration;
}
