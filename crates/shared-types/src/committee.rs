//! # Committee and Quorum Arithmetic
//!
//! A distributed validator is operated by a fixed committee of `n` operators
//! tolerating `f = ⌊(n-1)/3⌋` faulty members.
//!
//! | n | f | Q = 2f+1 | P = f+1 |
//! |---|---|----------|---------|
//! | 4 | 1 | 3        | 2       |
//! | 7 | 2 | 5        | 3       |

use crate::entities::{Height, OperatorId, Round, ValidatorPubKey, FIRST_ROUND};
use crate::errors::CommitteeError;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use std::collections::HashSet;

/// Quorum parameters derived once per committee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumParams {
    /// Committee size.
    pub n: usize,
    /// Tolerated faulty members.
    pub f: usize,
    /// Matching messages needed to advance a stage or justify a round change.
    pub quorum: usize,
    /// Matching messages needed to accelerate a round change.
    pub partial_quorum: usize,
}

impl QuorumParams {
    pub fn for_committee_size(n: usize) -> Self {
        let f = n.saturating_sub(1) / 3;
        Self {
            n,
            f,
            quorum: 2 * f + 1,
            partial_quorum: f + 1,
        }
    }

    pub fn has_quorum(&self, count: usize) -> bool {
        count >= self.quorum
    }

    pub fn has_partial_quorum(&self, count: usize) -> bool {
        count >= self.partial_quorum
    }
}

/// One committee member and the key its consensus messages are signed with.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub id: OperatorId,
    #[serde_as(as = "Bytes")]
    pub public_key: [u8; 32],
}

/// This node's view of a distributed validator: the validator key, the
/// committee, and which member we are.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Share {
    pub validator_pk: ValidatorPubKey,
    pub operator_id: OperatorId,
    /// Sorted by operator ID; leader selection depends on this order.
    committee: Vec<Operator>,
    quorum: QuorumParams,
}

impl Share {
    pub fn new(
        validator_pk: ValidatorPubKey,
        operator_id: OperatorId,
        mut committee: Vec<Operator>,
    ) -> Result<Self, CommitteeError> {
        if committee.is_empty() {
            return Err(CommitteeError::Empty);
        }

        let mut seen = HashSet::new();
        for operator in &committee {
            if !seen.insert(operator.id) {
                return Err(CommitteeError::DuplicateOperator(operator.id));
            }
        }
        if !seen.contains(&operator_id) {
            return Err(CommitteeError::NotAMember(operator_id));
        }

        committee.sort_by_key(|op| op.id);
        let quorum = QuorumParams::for_committee_size(committee.len());

        Ok(Self {
            validator_pk,
            operator_id,
            committee,
            quorum,
        })
    }

    pub fn committee(&self) -> &[Operator] {
        &self.committee
    }

    pub fn committee_size(&self) -> usize {
        self.committee.len()
    }

    pub fn quorum(&self) -> QuorumParams {
        self.quorum
    }

    pub fn is_member(&self, id: OperatorId) -> bool {
        self.operator(id).is_some()
    }

    pub fn operator(&self, id: OperatorId) -> Option<&Operator> {
        self.committee
            .binary_search_by_key(&id, |op| op.id)
            .ok()
            .map(|idx| &self.committee[idx])
    }

    pub fn operator_ids(&self) -> impl Iterator<Item = OperatorId> + '_ {
        self.committee.iter().map(|op| op.id)
    }

    /// Round-robin proposer: the first round of each height starts one slot
    /// further along the committee.
    pub fn leader(&self, height: Height, round: Round) -> OperatorId {
        let n = self.committee.len() as u64;
        let first = height % n;
        let offset = round.saturating_sub(FIRST_ROUND) % n;
        self.committee[((first + offset) % n) as usize].id
    }

    pub fn is_leader(&self, height: Height, round: Round) -> bool {
        self.leader(height, round) == self.operator_id
    }
}
