//! Partial signatures
//!
//! Operators exchange beacon-signature shares before consensus (randao,
//! selection proofs) and after it (the duty object itself). The container
//! collects shares per signing root until `quorum` distinct operators
//! contributed, at which point the external aggregator can reconstruct the
//! validator signature.

use serde::{Deserialize, Serialize};
use shared_types::{Hash, OperatorId, Slot};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialSigKind {
    PreConsensus,
    PostConsensus,
}

/// One signature share over one signing root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialSignature {
    #[serde(with = "hex::serde")]
    pub signing_root: Hash,
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
}

/// Shares an operator sends for one duty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialSignatureMessages {
    pub kind: PartialSigKind,
    pub slot: Slot,
    pub signer: OperatorId,
    pub messages: Vec<PartialSignature>,
}

#[derive(Debug, Clone)]
pub struct PartialSigContainer {
    quorum: usize,
    roots: HashMap<Hash, BTreeMap<OperatorId, Vec<u8>>>,
}

impl PartialSigContainer {
    pub fn new(quorum: usize) -> Self {
        Self {
            quorum,
            roots: HashMap::new(),
        }
    }

    /// Record `signer`'s share. Returns `true` exactly once per root: when
    /// this share brings it to quorum. Repeated shares from the same signer
    /// are ignored.
    pub fn add(&mut self, signer: OperatorId, sig: &PartialSignature) -> bool {
        let shares = self.roots.entry(sig.signing_root).or_default();
        if shares.contains_key(&signer) {
            return false;
        }
        shares.insert(signer, sig.signature.clone());
        shares.len() == self.quorum
    }

    pub fn has_quorum(&self, root: &Hash) -> bool {
        self.signer_count(root) >= self.quorum
    }

    pub fn signer_count(&self, root: &Hash) -> usize {
        self.roots.get(root).map_or(0, BTreeMap::len)
    }

    /// Shares collected for `root`, ordered by signer.
    pub fn signatures(&self, root: &Hash) -> Vec<(OperatorId, Vec<u8>)> {
        self.roots
            .get(root)
            .map(|shares| shares.iter().map(|(k, v)| (*k, v.clone())).collect())
            .unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.roots.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}
