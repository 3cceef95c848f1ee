//! In-memory decided store
//!
//! Keeps every decided instance per identifier. Durable storage lives in
//! `dv-02-storage`.

use crate::domain::DecidedInstance;
use crate::ports::DecidedStore;
use parking_lot::RwLock;
use shared_types::{Height, MessageId, StorageError};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
pub struct InMemoryDecidedStore {
    decided: RwLock<HashMap<MessageId, BTreeMap<Height, DecidedInstance>>>,
}

impl InMemoryDecidedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.decided.read().values().map(BTreeMap::len).sum()
    }
}

impl DecidedStore for InMemoryDecidedStore {
    fn save_decided(&self, decided: &DecidedInstance) -> Result<(), StorageError> {
        self.decided
            .write()
            .entry(decided.identifier)
            .or_default()
            .insert(decided.height, decided.clone());
        Ok(())
    }

    fn get_decided(
        &self,
        identifier: &MessageId,
        height: Height,
    ) -> Result<Option<DecidedInstance>, StorageError> {
        Ok(self
            .decided
            .read()
            .get(identifier)
            .and_then(|heights| heights.get(&height))
            .cloned())
    }

    fn get_highest_decided(
        &self,
        identifier: &MessageId,
    ) -> Result<Option<DecidedInstance>, StorageError> {
        Ok(self
            .decided
            .read()
            .get(identifier)
            .and_then(|heights| heights.values().next_back())
            .cloned())
    }
}
