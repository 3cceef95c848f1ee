//! Duties
//!
//! A duty is one beacon-chain task of one validator at one slot. The
//! [`Duties`] store indexes fetched duties by epoch, slot and validator
//! index so the scheduler can look up what to start when a slot ticks.

use parking_lot::RwLock;
use shared_types::{epoch_at_slot, Epoch, RunnerRole, Slot, ValidatorPubKey};
use std::collections::{BTreeMap, HashMap};

pub type ValidatorIndex = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Duty {
    pub role: RunnerRole,
    pub slot: Slot,
    pub validator_index: ValidatorIndex,
    pub validator_pk: ValidatorPubKey,
}

impl Duty {
    pub fn epoch(&self) -> Epoch {
        epoch_at_slot(self.slot)
    }

    /// Unique ID attached to every log line of this duty.
    pub fn id(&self) -> String {
        format!(
            "{}-e{}-s{}-v{}",
            self.role.as_str(),
            self.epoch(),
            self.slot,
            self.validator_pk.short()
        )
    }
}

type SlotDuties = HashMap<Slot, BTreeMap<ValidatorIndex, Duty>>;

#[derive(Debug, Default)]
pub struct Duties {
    by_epoch: RwLock<HashMap<Epoch, SlotDuties>>,
}

impl Duties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Duties at `slot`, ordered by validator index.
    pub fn slot_duties(&self, epoch: Epoch, slot: Slot) -> Vec<Duty> {
        self.by_epoch
            .read()
            .get(&epoch)
            .and_then(|slots| slots.get(&slot))
            .map(|duties| duties.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn validator_duty(&self, epoch: Epoch, slot: Slot, index: ValidatorIndex) -> Option<Duty> {
        self.by_epoch
            .read()
            .get(&epoch)
            .and_then(|slots| slots.get(&slot))
            .and_then(|duties| duties.get(&index))
            .cloned()
    }

    pub fn add(&self, epoch: Epoch, slot: Slot, index: ValidatorIndex, duty: Duty) {
        self.by_epoch
            .write()
            .entry(epoch)
            .or_default()
            .entry(slot)
            .or_default()
            .insert(index, duty);
    }

    pub fn reset_epoch(&self, epoch: Epoch) {
        self.by_epoch.write().remove(&epoch);
    }
}
