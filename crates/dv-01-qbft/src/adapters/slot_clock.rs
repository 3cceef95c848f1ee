//! Genesis-based slot clock

use crate::ports::SlotClock;
use shared_types::Slot;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// Mainnet slot length.
pub const DEFAULT_SLOT_DURATION: Duration = Duration::from_secs(12);

/// Maps slots to instants from a genesis wall-clock time.
#[derive(Debug, Clone, Copy)]
pub struct GenesisSlotClock {
    genesis: SystemTime,
    slot_duration: Duration,
}

impl GenesisSlotClock {
    pub fn new(genesis: SystemTime, slot_duration: Duration) -> Self {
        Self {
            genesis,
            slot_duration,
        }
    }

    pub fn from_unix_secs(genesis_secs: u64, slot_duration: Duration) -> Self {
        Self::new(UNIX_EPOCH + Duration::from_secs(genesis_secs), slot_duration)
    }

    /// Slot in progress now; 0 before genesis.
    pub fn current_slot(&self) -> Slot {
        match SystemTime::now().duration_since(self.genesis) {
            Ok(elapsed) if !self.slot_duration.is_zero() => {
                (elapsed.as_nanos() / self.slot_duration.as_nanos()) as Slot
            }
            _ => 0,
        }
    }
}

impl SlotClock for GenesisSlotClock {
    fn slot_start_time(&self, slot: Slot) -> Instant {
        let offset = self
            .slot_duration
            .saturating_mul(slot.min(u32::MAX as Slot) as u32);
        let target = self.genesis + offset;
        let (now_wall, now) = (SystemTime::now(), Instant::now());
        match target.duration_since(now_wall) {
            Ok(ahead) => now + ahead,
            Err(behind) => now.checked_sub(behind.duration()).unwrap_or(now),
        }
    }

    fn slot_duration(&self) -> Duration {
        self.slot_duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_slot() {
        let clock = GenesisSlotClock::new(
            SystemTime::now() - Duration::from_secs(25),
            DEFAULT_SLOT_DURATION,
        );
        assert_eq!(clock.current_slot(), 2);
    }

    #[tokio::test]
    async fn test_future_slot_is_ahead() {
        let clock = GenesisSlotClock::new(SystemTime::now(), DEFAULT_SLOT_DURATION);
        let start = clock.slot_start_time(10);
        let ahead = start.saturating_duration_since(Instant::now());
        assert!(ahead > Duration::from_secs(119) && ahead <= Duration::from_secs(120));
    }
}
