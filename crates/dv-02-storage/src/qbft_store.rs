//! Decided-instance store
//!
//! Records are bincode-encoded [`DecidedInstance`]s. The highest decided
//! record is written in the same batch as the instance it points at.

use crate::ports::{BatchOperation, KeyValueStore};
use dv_01_qbft::{DecidedInstance, DecidedStore};
use parking_lot::Mutex;
use shared_types::{Height, MessageId, RunnerRole, StorageError};
use std::sync::Arc;
use tracing::debug;

const DECIDED_PREFIX: &str = "decided/";
const HIGHEST_PREFIX: &str = "highest/";

fn decided_prefix(identifier: &MessageId) -> Vec<u8> {
    let mut prefix = role_prefix(identifier.role, DECIDED_PREFIX);
    prefix.extend_from_slice(&identifier.to_bytes());
    prefix
}

fn highest_prefix(role: RunnerRole) -> Vec<u8> {
    role_prefix(role, HIGHEST_PREFIX)
}

fn role_prefix(role: RunnerRole, kind: &str) -> Vec<u8> {
    format!("{}/{}", role.as_str(), kind).into_bytes()
}

fn encode(decided: &DecidedInstance) -> Result<Vec<u8>, StorageError> {
    bincode::serialize(decided).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<DecidedInstance, StorageError> {
    bincode::deserialize(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Decided instances and the highest decided per identifier.
pub struct QbftStore {
    kv: Arc<dyn KeyValueStore>,
    /// Serializes read-modify-write of the highest record.
    write_lock: Mutex<()>,
}

impl QbftStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
        }
    }

    /// Store `decided` and advance the highest record if its height is
    /// not below the current one.
    pub fn save_decided(&self, decided: &DecidedInstance) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock();
        let encoded = encode(decided)?;
        let id_bytes = decided.identifier.to_bytes();

        let mut batch = vec![BatchOperation::put(
            &decided_prefix(&decided.identifier),
            &decided.height.to_be_bytes(),
            encoded.clone(),
        )];
        let advances = match self.get_highest_decided(&decided.identifier)? {
            Some(highest) => decided.height >= highest.height,
            None => true,
        };
        if advances {
            batch.push(BatchOperation::put(
                &highest_prefix(decided.identifier.role),
                &id_bytes,
                encoded,
            ));
        }
        self.kv.atomic_batch_write(batch)?;

        debug!(
            identifier = %decided.identifier,
            height = decided.height,
            highest = advances,
            "[storage] decided instance saved"
        );
        Ok(())
    }

    pub fn get_decided(
        &self,
        identifier: &MessageId,
        height: Height,
    ) -> Result<Option<DecidedInstance>, StorageError> {
        self.kv
            .get(&decided_prefix(identifier), &height.to_be_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Every decided instance of `identifier`, ordered by height.
    pub fn get_all_decided(&self, identifier: &MessageId) -> Result<Vec<DecidedInstance>, StorageError> {
        self.kv
            .get_all_by_prefix(&decided_prefix(identifier))?
            .iter()
            .map(|(_, bytes)| decode(bytes))
            .collect()
    }

    /// Overwrite the highest decided record unconditionally.
    pub fn save_highest_decided(&self, decided: &DecidedInstance) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock();
        self.kv.put(
            &highest_prefix(decided.identifier.role),
            &decided.identifier.to_bytes(),
            &encode(decided)?,
        )
    }

    pub fn get_highest_decided(&self, identifier: &MessageId) -> Result<Option<DecidedInstance>, StorageError> {
        self.kv
            .get(&highest_prefix(identifier.role), &identifier.to_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Remove every decided instance and the highest record of `identifier`.
    pub fn clean_all_decided(&self, identifier: &MessageId) -> Result<usize, StorageError> {
        let _guard = self.write_lock.lock();
        let prefix = decided_prefix(identifier);
        let mut batch: Vec<BatchOperation> = self
            .kv
            .get_all_by_prefix(&prefix)?
            .into_iter()
            .map(|(key, _)| BatchOperation::delete(&prefix, &key))
            .collect();
        let removed = batch.len();
        batch.push(BatchOperation::delete(
            &highest_prefix(identifier.role),
            &identifier.to_bytes(),
        ));
        self.kv.atomic_batch_write(batch)?;
        Ok(removed)
    }
}

impl DecidedStore for QbftStore {
    fn save_decided(&self, decided: &DecidedInstance) -> Result<(), StorageError> {
        QbftStore::save_decided(self, decided)
    }

    fn get_decided(
        &self,
        identifier: &MessageId,
        height: Height,
    ) -> Result<Option<DecidedInstance>, StorageError> {
        QbftStore::get_decided(self, identifier, height)
    }

    fn get_highest_decided(
        &self,
        identifier: &MessageId,
    ) -> Result<Option<DecidedInstance>, StorageError> {
        QbftStore::get_highest_decided(self, identifier)
    }
}
