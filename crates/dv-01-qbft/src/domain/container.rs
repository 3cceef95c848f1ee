//! Per-round message containers

use super::message::SignedMessage;
use shared_types::{OperatorId, Round};
use std::collections::{BTreeMap, BTreeSet};

/// Messages of one type, indexed by round, at most one per signer per round.
#[derive(Debug, Clone, Default)]
pub struct MessageContainer {
    rounds: BTreeMap<Round, Vec<SignedMessage>>,
}

impl MessageContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `msg`. Returns `false` if its signer already has a message in
    /// that round; the first one wins.
    pub fn add(&mut self, msg: SignedMessage) -> bool {
        let Some(signer) = msg.signer() else {
            return false;
        };
        let round = self.rounds.entry(msg.round()).or_default();
        if round.iter().any(|m| m.signer() == Some(signer)) {
            return false;
        }
        round.push(msg);
        true
    }

    pub fn round(&self, round: Round) -> &[SignedMessage] {
        self.rounds.get(&round).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Messages in `round` carrying exactly `value`.
    pub fn matching_value(&self, round: Round, value: &[u8]) -> Vec<SignedMessage> {
        self.round(round)
            .iter()
            .filter(|m| m.value() == value)
            .cloned()
            .collect()
    }

    /// All messages with round >= `round`, lowest round first.
    pub fn at_or_above(&self, round: Round) -> impl Iterator<Item = &SignedMessage> + '_ {
        self.rounds.range(round..).flat_map(|(_, msgs)| msgs.iter())
    }

    /// Distinct signers across all rounds >= `round`.
    pub fn signers_at_or_above(&self, round: Round) -> BTreeSet<OperatorId> {
        self.at_or_above(round).filter_map(SignedMessage::signer).collect()
    }

    pub fn len(&self) -> usize {
        self.rounds.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
