//! Instance state

use super::container::MessageContainer;
use super::message::{PreparedCertificate, SignedMessage};
use serde::{Deserialize, Serialize};
use shared_types::{Height, MessageId, Round};
use std::fmt;

/// Consensus stage within the current round.
///
/// Ordered: within one round the stage only moves forward. A justified
/// round change resets it to `PrePrepare` for the new round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Round entered by start or timeout; no proposal seen yet.
    NotStarted,
    /// Waiting for the leader's proposal in a round reached by a justified
    /// round change.
    PrePrepare,
    /// Proposal accepted, collecting prepares.
    Prepare,
    /// Prepared, collecting commits.
    Commit,
    Decided,
    Stopped,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Decided | Stage::Stopped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::NotStarted => "not_started",
            Stage::PrePrepare => "pre_prepare",
            Stage::Prepare => "prepare",
            Stage::Commit => "commit",
            Stage::Decided => "decided",
            Stage::Stopped => "stopped",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The round a quorum of round changes justified, and the value its leader
/// must propose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JustifiedRound {
    pub round: Round,
    pub value: Vec<u8>,
}

/// A proposal accepted in a given round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedProposal {
    pub round: Round,
    pub value: Vec<u8>,
}

/// Mutable state of one consensus instance.
#[derive(Debug, Clone)]
pub struct InstanceState {
    pub identifier: MessageId,
    pub height: Height,
    /// Zero until started.
    pub round: Round,
    pub stage: Stage,
    pub input_value: Vec<u8>,
    pub proposal: Option<AcceptedProposal>,
    pub prepared: Option<PreparedCertificate>,
    pub justified: Option<JustifiedRound>,
    pub decided_value: Option<Vec<u8>>,
    pub pre_prepares: MessageContainer,
    pub prepares: MessageContainer,
    pub commits: MessageContainer,
    pub round_changes: MessageContainer,
}

impl InstanceState {
    pub fn new(identifier: MessageId, height: Height) -> Self {
        Self {
            identifier,
            height,
            round: 0,
            stage: Stage::NotStarted,
            input_value: Vec::new(),
            proposal: None,
            prepared: None,
            justified: None,
            decided_value: None,
            pre_prepares: MessageContainer::new(),
            prepares: MessageContainer::new(),
            commits: MessageContainer::new(),
            round_changes: MessageContainer::new(),
        }
    }

    pub fn started(&self) -> bool {
        self.round > 0
    }

    /// Value of the proposal accepted in the current round.
    pub fn current_proposal(&self) -> Option<&[u8]> {
        self.proposal
            .as_ref()
            .filter(|p| p.round == self.round)
            .map(|p| p.value.as_slice())
    }

    pub fn prepared_round(&self) -> Option<Round> {
        self.prepared.as_ref().map(|cert| cert.round)
    }

    pub fn prepared_value(&self) -> Option<&[u8]> {
        self.prepared.as_ref().map(|cert| cert.value.as_slice())
    }

    pub fn justified_round(&self) -> Option<Round> {
        self.justified.as_ref().map(|j| j.round)
    }

    /// True once this node prepared in the current round.
    pub fn prepared_in_current_round(&self) -> bool {
        self.prepared_round() == Some(self.round)
    }

    pub fn record_prepared(&mut self, value: Vec<u8>, prepares: Vec<SignedMessage>) {
        self.prepared = Some(PreparedCertificate {
            round: self.round,
            value,
            prepares,
        });
    }
}

/// Read-only view of an instance handed out to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSnapshot {
    pub identifier: MessageId,
    pub height: Height,
    pub round: Round,
    pub stage: Stage,
    pub prepared_round: Option<Round>,
    pub prepared_value: Option<Vec<u8>>,
    pub decided_value: Option<Vec<u8>>,
}

impl From<&InstanceState> for InstanceSnapshot {
    fn from(state: &InstanceState) -> Self {
        Self {
            identifier: state.identifier,
            height: state.height,
            round: state.round,
            stage: state.stage,
            prepared_round: state.prepared_round(),
            prepared_value: state.prepared_value().map(<[u8]>::to_vec),
            decided_value: state.decided_value.clone(),
        }
    }
}
