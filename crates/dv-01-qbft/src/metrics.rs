//! # QBFT Metrics
//!
//! Prometheus metrics for consensus instances.
//!
//! Enable with the `metrics` feature:
//! ```toml
//! dv-01-qbft = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `qbft_decided_total` - Counter of decided instances
//! - `qbft_decided_round` - Histogram of the round instances decide in
//! - `qbft_round_changes_total` - Round advances, by trigger
//! - `qbft_messages_rejected_total` - Protocol rejections, by reason
//! - `qbft_queue_refused_total` - Messages refused by a full queue
//! - `qbft_queue_stale_dropped_total` - Stale messages dropped on pop

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};

#[cfg(feature = "metrics")]
lazy_static! {
    pub static ref DECIDED: IntCounter = register_int_counter!(
        "qbft_decided_total",
        "Total number of decided consensus instances"
    )
    .expect("Failed to create DECIDED metric");

    pub static ref DECIDED_ROUND: Histogram = register_histogram!(
        "qbft_decided_round",
        "Round in which consensus instances decided",
        vec![1.0, 2.0, 3.0, 4.0, 6.0, 8.0, 12.0, 16.0]
    )
    .expect("Failed to create DECIDED_ROUND metric");

    /// Labeled by trigger: timeout, partial_quorum, justified
    pub static ref ROUND_CHANGES: IntCounterVec = register_int_counter_vec!(
        "qbft_round_changes_total",
        "Total number of round advances",
        &["trigger"]
    )
    .expect("Failed to create ROUND_CHANGES metric");

    pub static ref MESSAGES_REJECTED: IntCounterVec = register_int_counter_vec!(
        "qbft_messages_rejected_total",
        "Total number of consensus messages rejected by protocol rules",
        &["reason"]
    )
    .expect("Failed to create MESSAGES_REJECTED metric");

    pub static ref QUEUE_REFUSED: IntCounter = register_int_counter!(
        "qbft_queue_refused_total",
        "Total number of messages refused by a full queue"
    )
    .expect("Failed to create QUEUE_REFUSED metric");

    pub static ref QUEUE_STALE_DROPPED: IntCounter = register_int_counter!(
        "qbft_queue_stale_dropped_total",
        "Total number of stale messages dropped from queues"
    )
    .expect("Failed to create QUEUE_STALE_DROPPED metric");
}

#[cfg(feature = "metrics")]
pub fn record_decided(round: u64) {
    DECIDED.inc();
    DECIDED_ROUND.observe(round as f64);
}

#[cfg(feature = "metrics")]
pub fn record_round_change(trigger: &str) {
    ROUND_CHANGES.with_label_values(&[trigger]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_message_rejected(reason: &str) {
    MESSAGES_REJECTED.with_label_values(&[reason]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_queue_refused() {
    QUEUE_REFUSED.inc();
}

#[cfg(feature = "metrics")]
pub fn record_stale_dropped(count: usize) {
    QUEUE_STALE_DROPPED.inc_by(count as u64);
}

// No-op implementations when metrics feature is disabled
#[cfg(not(feature = "metrics"))]
pub fn record_decided(_round: u64) {}

#[cfg(not(feature = "metrics"))]
pub fn record_round_change(_trigger: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_message_rejected(_reason: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_queue_refused() {}

#[cfg(not(feature = "metrics"))]
pub fn record_stale_dropped(_count: usize) {}
