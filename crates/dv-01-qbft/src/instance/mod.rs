//! # Consensus Instance
//!
//! The state machine for one `(identifier, height)`. Everything that mutates
//! an instance (popping a message, a timeout, a partial-quorum bump) takes
//! the instance lock for the whole step, because quorum and justification
//! rules must see a consistent view of round, stage and message sets.
//!
//! ## Stage flow
//!
//! ```text
//! NotStarted ──valid PrePrepare──→ Prepare ──Q prepares──→ Commit ──Q commits──→ Decided
//!      ↑                              ↑
//!      └── start / timeout        PrePrepare ←── justified round change (any stage)
//! ```
//!
//! Messages are only processed for the current height and round. Future
//! rounds stay queued, past rounds are dropped. Round changes are the
//! exception: every round change for the current height is absorbed.

use crate::domain::justification;
use crate::domain::{
    AcceptedProposal, ConsensusMessage, DecidedInstance, InstanceSnapshot, InstanceState,
    JustifiedRound, MessageType, QbftError, QbftResult, RoundChangeJustification, SignedMessage,
    Stage,
};
use crate::events::RoundTimeout;
use crate::metrics;
use crate::ports::{DecidedStore, EventBus, MessageSigner, SignatureVerifier};
use crate::queue::{Admission, MessageQueue};
use crate::roundtimer::RoundTimer;
use parking_lot::Mutex;
use shared_types::{Height, MessageId, OperatorId, Round, Share, FIRST_ROUND};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Outbound ports of an instance.
#[derive(Clone)]
pub struct InstanceDependencies {
    pub event_bus: Arc<dyn EventBus>,
    pub signer: Arc<dyn MessageSigner>,
    pub verifier: Arc<dyn SignatureVerifier>,
    pub store: Arc<dyn DecidedStore>,
}

pub struct Instance {
    share: Arc<Share>,
    deps: InstanceDependencies,
    queue: Arc<MessageQueue<SignedMessage>>,
    timer: Arc<RoundTimer>,
    state: Mutex<InstanceState>,
}

impl Instance {
    pub fn new(
        share: Arc<Share>,
        identifier: MessageId,
        height: Height,
        deps: InstanceDependencies,
        queue: Arc<MessageQueue<SignedMessage>>,
        timer: Arc<RoundTimer>,
    ) -> Self {
        Self {
            share,
            deps,
            queue,
            timer,
            state: Mutex::new(InstanceState::new(identifier, height)),
        }
    }

    /// Enter round 1 with `input` as this node's proposal value.
    pub fn start(&self, input: Vec<u8>) -> QbftResult<()> {
        let mut state = self.state.lock();
        if state.started() || state.stage.is_terminal() {
            return Err(QbftError::AlreadyStarted);
        }
        state.input_value = input;
        state.round = FIRST_ROUND;
        self.timer.timeout_for_round(state.height, FIRST_ROUND);

        info!(
            identifier = ?state.identifier,
            height = state.height,
            leader = self.share.leader(state.height, FIRST_ROUND),
            "[qbft] Instance started"
        );

        if self.share.is_leader(state.height, FIRST_ROUND) {
            let value = state.input_value.clone();
            self.broadcast_vote(&state, MessageType::PrePrepare, value)?;
        }
        Ok(())
    }

    /// Stop a running instance. Decided instances stay decided.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if !state.stage.is_terminal() {
            state.stage = Stage::Stopped;
            self.timer.stop();
            debug!(height = state.height, round = state.round, "[qbft] Instance stopped");
        }
    }

    /// Pop and apply the next eligible queued message.
    ///
    /// Returns `Ok(true)` when a message was consumed, `Ok(false)` when there
    /// is nothing to do (queue drained of eligible messages, instance not
    /// started, decided or stopped). Messages rejected by protocol rules are
    /// consumed and logged, not returned as errors.
    pub fn process_message(&self) -> QbftResult<bool> {
        let mut state = self.state.lock();
        if !state.started() || state.stage.is_terminal() {
            return Ok(false);
        }

        let Some(msg) = self.queue.pop_message(|m| admission(&state, m)) else {
            return Ok(false);
        };
        let (msg_type, round) = (msg.msg_type(), msg.round());

        match self.apply(&mut state, msg) {
            Ok(()) => Ok(true),
            Err(e) if e.is_protocol_rejection() => {
                debug!(
                    height = state.height,
                    %msg_type,
                    round,
                    error = %e,
                    "[qbft] Message rejected"
                );
                metrics::record_message_rejected(e.reason());
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    /// React to the round timer. Stale events are ignored and return
    /// `Ok(false)`.
    pub fn on_timeout(&self, event: RoundTimeout) -> QbftResult<bool> {
        let mut state = self.state.lock();
        if !state.started()
            || state.stage.is_terminal()
            || event.height != state.height
            || event.round != state.round
        {
            debug!(?event, current_round = state.round, "[qbft] Ignoring stale timeout");
            return Ok(false);
        }

        let next = state.round + 1;
        info!(
            height = state.height,
            round = state.round,
            next,
            "[qbft] Round timed out"
        );
        state.round = next;
        state.stage = Stage::NotStarted;
        self.timer.timeout_for_round(state.height, next);
        metrics::record_round_change("timeout");

        self.broadcast_round_change(&state)?;
        self.try_round_change_quorum(&mut state, next)?;
        Ok(true)
    }

    /// Jump ahead when at least `f+1` distinct operators already ask for a
    /// higher round.
    ///
    /// Looks at stored round changes and, without consuming them, at those
    /// still queued. Each signer counts once, at the lowest round above ours
    /// it asked for, and the instance moves to the lowest of those rounds.
    /// Every signer counted asked for at least that round, so the bump never
    /// overshoots what `f+1` operators support; repeated calls climb further
    /// while a higher partial quorum remains. Keeps the stage, re-arms the
    /// timer and broadcasts our own round change. Returns whether the round
    /// moved.
    pub fn process_change_round_partial_quorum(&self) -> QbftResult<bool> {
        let mut state = self.state.lock();
        if !state.started() || state.stage.is_terminal() {
            return Ok(false);
        }
        let current = state.round;

        let mut lowest: BTreeMap<OperatorId, Round> = BTreeMap::new();
        for msg in state.round_changes.at_or_above(current + 1) {
            if let Some(signer) = msg.signer() {
                note_lowest(&mut lowest, signer, msg.round());
            }
        }
        let queued = self.queue.scan(|m| {
            m.msg_type() == MessageType::RoundChange
                && m.message.identifier == state.identifier
                && m.height() == state.height
                && m.round() > current
        });
        for msg in &queued {
            if let Ok(signer) = self.verify_sender(&state, msg) {
                note_lowest(&mut lowest, signer, msg.round());
            }
        }

        if !self.share.quorum().has_partial_quorum(lowest.len()) {
            return Ok(false);
        }
        let Some(target) = lowest.values().copied().min() else {
            return Ok(false);
        };

        info!(
            height = state.height,
            from = current,
            to = target,
            signers = lowest.len(),
            "[qbft] Partial round-change quorum, bumping round"
        );
        state.round = target;
        self.timer.timeout_for_round(state.height, target);
        metrics::record_round_change("partial_quorum");
        self.broadcast_round_change(&state)?;
        Ok(true)
    }

    /// Whether the stored round changes justify moving to `round`.
    pub fn justify_round_change(&self, round: Round) -> QbftResult<bool> {
        let state = self.state.lock();
        Ok(
            justification::justify_round_change(&state.round_changes, self.share.quorum(), round)?
                .is_some(),
        )
    }

    /// Whether a proposal of `value` in `round` would be accepted.
    pub fn justify_pre_prepare(&self, round: Round, value: &[u8]) -> QbftResult<()> {
        justification::justify_pre_prepare(&self.state.lock(), round, value)
    }

    pub fn snapshot(&self) -> InstanceSnapshot {
        InstanceSnapshot::from(&*self.state.lock())
    }

    pub fn round(&self) -> Round {
        self.state.lock().round
    }

    pub fn stage(&self) -> Stage {
        self.state.lock().stage
    }

    pub fn height(&self) -> Height {
        self.state.lock().height
    }

    pub fn identifier(&self) -> MessageId {
        self.state.lock().identifier
    }

    pub fn decided_value(&self) -> Option<Vec<u8>> {
        self.state.lock().decided_value.clone()
    }

    pub fn is_decided(&self) -> bool {
        self.stage() == Stage::Decided
    }

    pub fn share(&self) -> &Share {
        &self.share
    }

    // === MESSAGE HANDLING ===

    fn apply(&self, state: &mut InstanceState, msg: SignedMessage) -> QbftResult<()> {
        let signer = self.verify_sender(state, &msg)?;
        match msg.msg_type() {
            MessageType::PrePrepare => self.upon_pre_prepare(state, signer, msg),
            MessageType::Prepare => self.upon_prepare(state, signer, msg),
            MessageType::Commit => self.upon_commit(state, signer, msg),
            MessageType::RoundChange => self.upon_round_change(state, signer, msg),
        }
    }

    /// Identifier, height, committee membership and signature.
    fn verify_sender(&self, state: &InstanceState, msg: &SignedMessage) -> QbftResult<OperatorId> {
        let message = &msg.message;
        if message.identifier != state.identifier {
            return Err(QbftError::WrongIdentifier {
                expected: state.identifier,
                actual: message.identifier,
            });
        }
        if message.height != state.height {
            return Err(QbftError::WrongHeight {
                expected: state.height,
                actual: message.height,
            });
        }
        let signer = msg
            .signer()
            .ok_or(QbftError::InvalidSigners(msg.signers.len()))?;
        if !self.share.is_member(signer) {
            return Err(QbftError::UnknownSigner(signer));
        }
        if !self.deps.verifier.verify(msg, &self.share) {
            return Err(QbftError::InvalidSignature(signer));
        }
        Ok(signer)
    }

    fn upon_pre_prepare(
        &self,
        state: &mut InstanceState,
        signer: OperatorId,
        msg: SignedMessage,
    ) -> QbftResult<()> {
        let round = msg.round();
        let leader = self.share.leader(state.height, round);
        if signer != leader {
            return Err(QbftError::NotLeader {
                signer,
                leader,
                round,
            });
        }
        if state.current_proposal().is_some() {
            return Err(QbftError::DuplicateProposal(round));
        }
        justification::justify_pre_prepare(state, round, msg.value())?;

        let value = msg.value().to_vec();
        state.pre_prepares.add(msg);
        state.proposal = Some(AcceptedProposal {
            round,
            value: value.clone(),
        });
        state.stage = Stage::Prepare;
        debug!(height = state.height, round, leader, "[qbft] Proposal accepted");

        self.broadcast_vote(state, MessageType::Prepare, value)?;
        self.try_prepare_quorum(state)
    }

    fn upon_prepare(
        &self,
        state: &mut InstanceState,
        signer: OperatorId,
        msg: SignedMessage,
    ) -> QbftResult<()> {
        let round = msg.round();
        if !state.prepares.add(msg) {
            return Err(QbftError::DuplicateSigner {
                kind: "prepare",
                signer,
                round,
            });
        }
        self.try_prepare_quorum(state)
    }

    fn upon_commit(
        &self,
        state: &mut InstanceState,
        signer: OperatorId,
        msg: SignedMessage,
    ) -> QbftResult<()> {
        let round = msg.round();
        if !state.commits.add(msg) {
            return Err(QbftError::DuplicateSigner {
                kind: "commit",
                signer,
                round,
            });
        }
        self.try_commit_quorum(state)
    }

    fn upon_round_change(
        &self,
        state: &mut InstanceState,
        signer: OperatorId,
        msg: SignedMessage,
    ) -> QbftResult<()> {
        let round = msg.round();
        if let Some(cert) = &msg.message.prepared {
            justification::validate_prepared_certificate(
                cert,
                round,
                &state.identifier,
                state.height,
                &self.share,
                self.deps.verifier.as_ref(),
            )?;
        }
        if !state.round_changes.add(msg) {
            return Err(QbftError::DuplicateSigner {
                kind: "round change",
                signer,
                round,
            });
        }
        self.try_round_change_quorum(state, round)
    }

    // === QUORUM TRANSITIONS ===

    fn try_prepare_quorum(&self, state: &mut InstanceState) -> QbftResult<()> {
        if state.prepared_in_current_round() {
            return Ok(());
        }
        let Some(value) = state.current_proposal().map(<[u8]>::to_vec) else {
            return Ok(());
        };
        let prepares = state.prepares.matching_value(state.round, &value);
        if !self.share.quorum().has_quorum(prepares.len()) {
            return Ok(());
        }

        state.record_prepared(value.clone(), prepares);
        state.stage = Stage::Commit;
        debug!(height = state.height, round = state.round, "[qbft] Prepared");

        self.broadcast_vote(state, MessageType::Commit, value)?;
        self.try_commit_quorum(state)
    }

    fn try_commit_quorum(&self, state: &mut InstanceState) -> QbftResult<()> {
        if state.stage != Stage::Commit || !state.prepared_in_current_round() {
            return Ok(());
        }
        let Some(value) = state.current_proposal().map(<[u8]>::to_vec) else {
            return Ok(());
        };
        let commits = state.commits.matching_value(state.round, &value);
        if !self.share.quorum().has_quorum(commits.len()) {
            return Ok(());
        }
        self.decide(state, value, commits)
    }

    /// Move to the highest round a stored round-change quorum justifies,
    /// trying `hint` and the current round.
    fn try_round_change_quorum(&self, state: &mut InstanceState, hint: Round) -> QbftResult<()> {
        let mut candidates = vec![hint, state.round];
        candidates.sort_unstable_by(|a, b| b.cmp(a));
        candidates.dedup();

        for round in candidates {
            let fresh = state.justified_round().map_or(true, |j| round > j);
            if round <= FIRST_ROUND || round < state.round || !fresh {
                continue;
            }
            if let Some(found) = justification::justify_round_change(
                &state.round_changes,
                self.share.quorum(),
                round,
            )? {
                return self.enter_justified_round(state, found);
            }
        }
        Ok(())
    }

    fn enter_justified_round(
        &self,
        state: &mut InstanceState,
        found: RoundChangeJustification,
    ) -> QbftResult<()> {
        let round = found.round;
        let value = found.value_or(&state.input_value);

        info!(
            height = state.height,
            from = state.round,
            to = round,
            signers = ?found.signers,
            carried_prepared = ?found.prepared.as_ref().map(|(r, _)| *r),
            "[qbft] Round change justified"
        );
        state.round = round;
        state.stage = Stage::PrePrepare;
        state.justified = Some(JustifiedRound {
            round,
            value: value.clone(),
        });
        self.timer.timeout_for_round(state.height, round);
        metrics::record_round_change("justified");

        if self.share.is_leader(state.height, round) {
            self.broadcast_vote(state, MessageType::PrePrepare, value)?;
        }
        Ok(())
    }

    fn decide(
        &self,
        state: &mut InstanceState,
        value: Vec<u8>,
        commits: Vec<SignedMessage>,
    ) -> QbftResult<()> {
        state.stage = Stage::Decided;
        state.decided_value = Some(value.clone());
        self.timer.stop();

        let decided = DecidedInstance {
            identifier: state.identifier,
            height: state.height,
            round: state.round,
            value,
            commits,
        };
        metrics::record_decided(decided.round);
        info!(
            identifier = ?decided.identifier,
            height = decided.height,
            round = decided.round,
            signers = ?decided.signers(),
            "[qbft] Decided"
        );

        let stored = self.deps.store.save_decided(&decided);
        if let Err(e) = &stored {
            error!(height = decided.height, error = %e, "[qbft] Failed to persist decided value");
        }
        self.deps
            .event_bus
            .publish_decided(&decided.to_event())
            .map_err(QbftError::EventBus)?;
        stored.map_err(QbftError::from)
    }

    // === EMISSION ===

    fn broadcast_vote(
        &self,
        state: &InstanceState,
        msg_type: MessageType,
        value: Vec<u8>,
    ) -> QbftResult<()> {
        let message =
            ConsensusMessage::new(msg_type, state.identifier, state.height, state.round, value);
        self.sign_and_broadcast(message)
    }

    fn broadcast_round_change(&self, state: &InstanceState) -> QbftResult<()> {
        let message = ConsensusMessage::round_change(
            state.identifier,
            state.height,
            state.round,
            state.prepared.clone(),
        );
        self.sign_and_broadcast(message)
    }

    fn sign_and_broadcast(&self, message: ConsensusMessage) -> QbftResult<()> {
        let signature = self
            .deps
            .signer
            .sign_root(&message.signing_root())
            .map_err(QbftError::Signing)?;
        let signed = SignedMessage {
            message,
            signers: vec![self.deps.signer.operator_id()],
            signature,
        };
        debug!(
            msg_type = %signed.msg_type(),
            height = signed.height(),
            round = signed.round(),
            "[qbft] Broadcasting"
        );
        self.deps
            .event_bus
            .broadcast(&signed)
            .map_err(QbftError::EventBus)
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("operator_id", &self.share.operator_id)
            .field("state", &self.snapshot())
            .finish()
    }
}

/// Queue filter for the current height and round.
fn admission(state: &InstanceState, msg: &SignedMessage) -> Admission {
    let message = &msg.message;
    if message.identifier != state.identifier {
        return Admission::Drop;
    }
    match message.height.cmp(&state.height) {
        Ordering::Less => return Admission::Drop,
        Ordering::Greater => return Admission::Defer,
        Ordering::Equal => {}
    }
    if message.msg_type == MessageType::RoundChange {
        return Admission::Eligible;
    }
    match message.round.cmp(&state.round) {
        Ordering::Less => Admission::Drop,
        Ordering::Greater => Admission::Defer,
        // A later-round proposal waits until we saw the round change that
        // justifies it.
        Ordering::Equal
            if message.msg_type == MessageType::PrePrepare
                && message.round > FIRST_ROUND
                && state.justified_round() != Some(message.round) =>
        {
            Admission::Defer
        }
        Ordering::Equal => Admission::Eligible,
    }
}

fn note_lowest(lowest: &mut BTreeMap<OperatorId, Round>, signer: OperatorId, round: Round) {
    lowest
        .entry(signer)
        .and_modify(|r| *r = (*r).min(round))
        .or_insert(round);
}

#[cfg(test)]
mod tests;
