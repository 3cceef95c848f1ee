//! # dv-01-qbft
//!
//! QBFT consensus core of a distributed-validator operator node.
//!
//! A committee of `n` operators agrees on one value per duty occurrence,
//! tolerating `f = ⌊(n-1)/3⌋` Byzantine members. Each duty stream is
//! addressed by a [`shared_types::MessageId`]; each occurrence by a height.
//!
//! ## Architecture
//!
//! ```text
//!   network ──→ MessageQueue ──pop──→ Instance ──broadcast──→ EventBus
//!                                       ↑   │
//!                RoundTimer ──timeout───┘   └──decided──→ DecidedStore, EventBus
//! ```
//!
//! - [`instance::Instance`]: the state machine for one `(identifier, height)`
//! - [`roundtimer::RoundTimer`]: slot-anchored round deadlines
//! - [`queue::MessageQueue`]: bounded buffer with lazy stale dropping
//! - [`domain::justification`]: round-change and proposal justification
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dv_01_qbft::{Instance, InstanceDependencies, MessageQueue, RoundTimer, TimeoutOptions};
//!
//! let (timer, mut timeouts) = RoundTimer::new(role, clock, TimeoutOptions::default());
//! let instance = Instance::new(share, identifier, height, deps, queue.clone(), Arc::new(timer));
//! instance.start(input)?;
//!
//! while instance.process_message()? {}
//! ```

pub mod adapters;
pub mod domain;
pub mod events;
pub mod instance;
pub mod metrics;
pub mod ports;
pub mod queue;
pub mod roundtimer;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use domain::{
    ConsensusMessage, DecidedInstance, InstanceSnapshot, MessageType, PreparedCertificate,
    QbftError, QbftResult, SignedMessage, Stage,
};
pub use events::{DecidedEvent, RoundTimeout};
pub use instance::{Instance, InstanceDependencies};
pub use ports::{DecidedStore, EventBus, MessageSigner, SignatureVerifier, SlotClock};
pub use queue::{Admission, MessageQueue, DEFAULT_QUEUE_CAPACITY};
pub use roundtimer::{RoundTimer, TimeoutOptions};
