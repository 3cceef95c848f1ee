//! # Round Timer
//!
//! One timer per duty runner, armed for exactly one `(height, round)` at a
//! time. Re-arming aborts the previous task, so a timer never fires for a
//! round the instance has left.
//!
//! ## Deadlines
//!
//! Round `r` expires at `anchor + timeout(r)` where `timeout` is cumulative:
//!
//! ```text
//! timeout(r) = quick * r                                   r <= threshold
//!            = quick * threshold + slow * (r - threshold)  r >  threshold
//! ```
//!
//! The anchor depends on the role so that all operators of a committee
//! expire the same round at the same wall-clock moment:
//!
//! | Role                                   | Anchor                      |
//! |----------------------------------------|-----------------------------|
//! | Attester, Committee                    | slot start + 1/3 slot       |
//! | Aggregator, SyncCommitteeContribution  | slot start + 2/3 slot       |
//! | Proposer, registration, exit           | when round 1 was armed      |

use crate::events::RoundTimeout;
use crate::ports::SlotClock;
use parking_lot::Mutex;
use shared_types::{Height, Round, RunnerRole, Slot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Rounds up to this many use the quick timeout.
pub const DEFAULT_QUICK_THRESHOLD: Round = 8;
pub const DEFAULT_QUICK_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_SLOW_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutOptions {
    pub quick_threshold: Round,
    pub quick: Duration,
    pub slow: Duration,
}

impl Default for TimeoutOptions {
    fn default() -> Self {
        Self {
            quick_threshold: DEFAULT_QUICK_THRESHOLD,
            quick: DEFAULT_QUICK_TIMEOUT,
            slow: DEFAULT_SLOW_TIMEOUT,
        }
    }
}

impl TimeoutOptions {
    /// Time from the anchor until `round` expires.
    pub fn round_timeout(&self, round: Round) -> Duration {
        let times = |d: Duration, n: Round| d.saturating_mul(n.min(u32::MAX as Round) as u32);
        if round <= self.quick_threshold {
            times(self.quick, round)
        } else {
            times(self.quick, self.quick_threshold)
                .saturating_add(times(self.slow, round - self.quick_threshold))
        }
    }
}

#[derive(Debug, Default)]
struct TimerState {
    slot: Slot,
    height: Height,
    round: Round,
    /// Anchor for roles without a fixed point in the slot.
    first_armed_at: Option<Instant>,
    deadline: Option<Instant>,
    task: Option<JoinHandle<()>>,
}

pub struct RoundTimer {
    role: RunnerRole,
    clock: Arc<dyn SlotClock>,
    options: TimeoutOptions,
    events: mpsc::UnboundedSender<RoundTimeout>,
    state: Mutex<TimerState>,
}

impl RoundTimer {
    /// Create a timer and the receiver its timeouts are delivered on.
    pub fn new(
        role: RunnerRole,
        clock: Arc<dyn SlotClock>,
        options: TimeoutOptions,
    ) -> (Self, mpsc::UnboundedReceiver<RoundTimeout>) {
        let (events, rx) = mpsc::unbounded_channel();
        let timer = Self {
            role,
            clock,
            options,
            events,
            state: Mutex::new(TimerState::default()),
        };
        (timer, rx)
    }

    pub fn role(&self) -> RunnerRole {
        self.role
    }

    pub fn options(&self) -> TimeoutOptions {
        self.options
    }

    /// Bind the timer to the slot of a new duty. Cancels any armed round.
    pub fn set_slot(&self, slot: Slot) {
        let mut state = self.state.lock();
        if let Some(task) = state.task.take() {
            task.abort();
        }
        state.slot = slot;
        state.first_armed_at = None;
        state.deadline = None;
    }

    /// Arm the timer for `round`, cancelling whatever was armed before.
    pub fn timeout_for_round(&self, height: Height, round: Round) {
        let mut state = self.state.lock();
        if let Some(task) = state.task.take() {
            task.abort();
        }

        state.first_armed_at.get_or_insert_with(Instant::now);
        let deadline = self.anchor(&state) + self.options.round_timeout(round);
        state.height = height;
        state.round = round;
        state.deadline = Some(deadline);

        let events = self.events.clone();
        state.task = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            trace!(height, round, "Round timer fired");
            // Receiver gone means the runner shut down.
            let _ = events.send(RoundTimeout { height, round });
        }));

        debug!(
            role = %self.role,
            height,
            round,
            in_ms = deadline.saturating_duration_since(Instant::now()).as_millis() as u64,
            "Round timer armed"
        );
    }

    /// Cancel the armed round, if any.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if let Some(task) = state.task.take() {
            task.abort();
            debug!(role = %self.role, round = state.round, "Round timer stopped");
        }
        state.deadline = None;
    }

    /// Round currently armed (0 if never armed).
    pub fn round(&self) -> Round {
        self.state.lock().round
    }

    /// Deadline of the armed round.
    pub fn deadline(&self) -> Option<Instant> {
        self.state.lock().deadline
    }

    /// Deadline `round` would get if armed now.
    pub fn deadline_for_round(&self, round: Round) -> Instant {
        let state = self.state.lock();
        self.anchor(&state) + self.options.round_timeout(round)
    }

    fn anchor(&self, state: &TimerState) -> Instant {
        let slot_start = || self.clock.slot_start_time(state.slot);
        let slot_duration = self.clock.slot_duration();
        match self.role {
            RunnerRole::Attester | RunnerRole::Committee => slot_start() + slot_duration / 3,
            RunnerRole::Aggregator | RunnerRole::SyncCommitteeContribution => {
                slot_start() + slot_duration * 2 / 3
            }
            RunnerRole::Proposer
            | RunnerRole::ValidatorRegistration
            | RunnerRole::VoluntaryExit => state.first_armed_at.unwrap_or_else(Instant::now),
        }
    }
}

impl Drop for RoundTimer {
    fn drop(&mut self) {
        if let Some(task) = self.state.get_mut().task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for RoundTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RoundTimer")
            .field("role", &self.role)
            .field("slot", &state.slot)
            .field("height", &state.height)
            .field("round", &state.round)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Slot `s` starts at `origin + s * duration`.
    struct FixedClock {
        origin: Instant,
        slot_duration: Duration,
    }

    impl SlotClock for FixedClock {
        fn slot_start_time(&self, slot: Slot) -> Instant {
            self.origin + self.slot_duration * slot as u32
        }

        fn slot_duration(&self) -> Duration {
            self.slot_duration
        }
    }

    fn clock(origin: Instant) -> Arc<dyn SlotClock> {
        Arc::new(FixedClock {
            origin,
            slot_duration: Duration::from_millis(120),
        })
    }

    fn options() -> TimeoutOptions {
        TimeoutOptions {
            quick_threshold: 3,
            quick: Duration::from_millis(100),
            slow: Duration::from_millis(200),
        }
    }

    #[test]
    fn test_cumulative_round_timeout() {
        let opts = options();
        assert_eq!(opts.round_timeout(1), Duration::from_millis(100));
        assert_eq!(opts.round_timeout(3), Duration::from_millis(300));
        assert_eq!(opts.round_timeout(4), Duration::from_millis(500));
        assert_eq!(opts.round_timeout(6), Duration::from_millis(900));
    }

    #[test]
    fn test_default_options() {
        let opts = TimeoutOptions::default();
        assert_eq!(opts.round_timeout(8), Duration::from_secs(16));
        assert_eq!(opts.round_timeout(9), Duration::from_secs(136));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_round_fires_at_anchored_deadline() {
        let origin = Instant::now();
        let (timer, mut rx) = RoundTimer::new(RunnerRole::Attester, clock(origin), options());
        timer.set_slot(0);
        timer.timeout_for_round(0, 1);

        // Anchor is 1/3 of a 120ms slot.
        tokio::time::advance(Duration::from_millis(139)).await;
        assert!(rx.try_recv().is_err());

        let event = rx.recv().await.unwrap();
        assert_eq!(event, RoundTimeout { height: 0, round: 1 });
        assert_eq!(Instant::now() - origin, Duration::from_millis(140));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_round_after_threshold() {
        let origin = Instant::now();
        let (timer, mut rx) = RoundTimer::new(RunnerRole::Attester, clock(origin), options());
        timer.timeout_for_round(0, 4);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.round, 4);
        assert_eq!(Instant::now() - origin, Duration::from_millis(40 + 500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_cancels_previous_round() {
        let origin = Instant::now();
        let (timer, mut rx) = RoundTimer::new(RunnerRole::Aggregator, clock(origin), options());
        timer.timeout_for_round(0, 1);
        tokio::time::advance(Duration::from_millis(50)).await;
        timer.timeout_for_round(0, 2);

        let event = rx.recv().await.unwrap();
        assert_eq!(event, RoundTimeout { height: 0, round: 2 });
        assert_eq!(Instant::now() - origin, Duration::from_millis(80 + 200));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels() {
        let origin = Instant::now();
        let (timer, mut rx) = RoundTimer::new(RunnerRole::Attester, clock(origin), options());
        timer.timeout_for_round(0, 1);
        timer.stop();
        tokio::time::advance(Duration::from_secs(5)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
        assert_eq!(timer.deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_committee_timers_expire_together() {
        let origin = Instant::now();
        let mut receivers = Vec::new();
        let mut timers = Vec::new();
        for _ in 0..4 {
            let (timer, rx) = RoundTimer::new(RunnerRole::Attester, clock(origin), options());
            timer.timeout_for_round(0, 1);
            timers.push(timer);
            receivers.push(rx);
            tokio::time::advance(Duration::from_millis(10)).await;
        }

        let mut fired_at = Vec::new();
        for rx in receivers.iter_mut() {
            rx.recv().await.unwrap();
            fired_at.push(Instant::now());
        }
        assert!(fired_at.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(fired_at[0] - origin, Duration::from_millis(140));
    }

    #[tokio::test(start_paused = true)]
    async fn test_proposer_anchors_on_first_round() {
        let origin = Instant::now();
        let (first, mut first_rx) = RoundTimer::new(RunnerRole::Proposer, clock(origin), options());
        first.timeout_for_round(0, 1);
        tokio::time::advance(Duration::from_millis(10)).await;
        let (second, mut second_rx) =
            RoundTimer::new(RunnerRole::Proposer, clock(origin), options());
        second.timeout_for_round(0, 1);

        first_rx.recv().await.unwrap();
        assert_eq!(Instant::now() - origin, Duration::from_millis(100));
        second_rx.recv().await.unwrap();
        assert_eq!(Instant::now() - origin, Duration::from_millis(110));

        // Round 2 keeps the round 1 anchor.
        first.timeout_for_round(0, 2);
        first_rx.recv().await.unwrap();
        assert_eq!(Instant::now() - origin, Duration::from_millis(200));
    }
}
