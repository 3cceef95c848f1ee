//! # Duty Runner
//!
//! One runner per role. It owns the consensus queue, the round timer and
//! the instance of the duty currently running, plus the partial-signature
//! containers around it.
//!
//! Consensus messages are checked for a committee signature and a height
//! inside the window, then enqueued and drained right away. The queue is
//! bounded, so nothing a non-member sends and nothing beyond
//! [`FUTURE_HEIGHT_WINDOW`] may occupy it. Timeouts arrive on the timer
//! channel and are handled by the driver started with [`DutyRunner::run`].

use crate::domain::{Duty, PartialSigContainer, PartialSigKind, PartialSignatureMessages};
use crate::error::{ValidatorError, ValidatorResult};
use dv_01_qbft::{
    Instance, InstanceDependencies, MessageQueue, RoundTimeout, RoundTimer, SignedMessage,
    SlotClock, TimeoutOptions, DEFAULT_QUEUE_CAPACITY,
};
use parking_lot::{Mutex, RwLock};
use shared_types::{Hash, Height, MessageId, RunnerRole, Share, FIRST_HEIGHT};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// How many heights past the next one a peer may run ahead of us.
pub const FUTURE_HEIGHT_WINDOW: Height = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerConfig {
    pub timeouts: TimeoutOptions,
    pub queue_capacity: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            timeouts: TimeoutOptions::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Default)]
struct RunnerState {
    duty: Option<Duty>,
    instance: Option<Arc<Instance>>,
    next_height: Height,
}

pub struct DutyRunner {
    role: RunnerRole,
    identifier: MessageId,
    share: Arc<Share>,
    deps: InstanceDependencies,
    queue: Arc<MessageQueue<SignedMessage>>,
    timer: Arc<RoundTimer>,
    timeouts: Mutex<Option<mpsc::UnboundedReceiver<RoundTimeout>>>,
    state: RwLock<RunnerState>,
    pre_consensus: Mutex<PartialSigContainer>,
    post_consensus: Mutex<PartialSigContainer>,
}

impl DutyRunner {
    /// Heights continue after the highest instance already decided for
    /// this validator and role.
    pub fn new(
        role: RunnerRole,
        share: Arc<Share>,
        deps: InstanceDependencies,
        clock: Arc<dyn SlotClock>,
        config: RunnerConfig,
    ) -> ValidatorResult<Self> {
        let identifier = MessageId::new(share.validator_pk, role);
        let next_height = deps
            .store
            .get_highest_decided(&identifier)?
            .map_or(FIRST_HEIGHT, |decided| decided.height + 1);
        let (timer, timeouts) = RoundTimer::new(role, clock, config.timeouts);
        let quorum = share.quorum().quorum;

        Ok(Self {
            role,
            identifier,
            share,
            deps,
            queue: Arc::new(MessageQueue::new(config.queue_capacity)),
            timer: Arc::new(timer),
            timeouts: Mutex::new(Some(timeouts)),
            state: RwLock::new(RunnerState {
                next_height,
                ..Default::default()
            }),
            pre_consensus: Mutex::new(PartialSigContainer::new(quorum)),
            post_consensus: Mutex::new(PartialSigContainer::new(quorum)),
        })
    }

    pub fn role(&self) -> RunnerRole {
        self.role
    }

    pub fn identifier(&self) -> MessageId {
        self.identifier
    }

    pub fn current_instance(&self) -> Option<Arc<Instance>> {
        self.state.read().instance.clone()
    }

    pub fn current_duty(&self) -> Option<Duty> {
        self.state.read().duty.clone()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Start `duty` with `input` as this operator's proposal.
    ///
    /// Stops the previous instance, drops queued messages of older heights
    /// and starts the next height. Roles without consensus only reset the
    /// partial-signature containers and return `None`.
    pub fn start_new_duty(&self, duty: Duty, input: Vec<u8>) -> ValidatorResult<Option<Height>> {
        self.pre_consensus.lock().clear();
        self.post_consensus.lock().clear();

        let mut state = self.state.write();
        if let Some(previous) = state.instance.take() {
            previous.stop();
        }
        let duty_id = duty.id();
        let slot = duty.slot;
        state.duty = Some(duty);

        if !self.role.requires_consensus() {
            info!(duty_id = %duty_id, "[validator] Duty started without consensus");
            return Ok(None);
        }

        let height = state.next_height;
        state.next_height += 1;
        let horizon = height_horizon(state.next_height);
        let purged = self
            .queue
            .purge(|msg| msg.height() < height || msg.height() > horizon);
        if purged > 0 {
            debug!(duty_id = %duty_id, purged, "[validator] Dropped messages outside the height window");
        }

        self.timer.set_slot(slot);
        let instance = Arc::new(Instance::new(
            self.share.clone(),
            self.identifier,
            height,
            self.deps.clone(),
            self.queue.clone(),
            self.timer.clone(),
        ));
        state.instance = Some(instance.clone());
        drop(state);

        info!(duty_id = %duty_id, height, "[validator] Starting consensus");
        instance.start(input)?;
        self.drain(&instance)?;
        Ok(Some(height))
    }

    /// Enqueue a consensus message and process everything that became
    /// eligible. Messages for heights not started yet stay queued.
    ///
    /// Messages without a valid committee signature and messages past the
    /// height window are refused. Messages for heights already left behind
    /// are dropped silently.
    pub fn process_consensus(&self, msg: SignedMessage) -> ValidatorResult<()> {
        self.check_sender(&msg)?;

        let (floor, horizon) = {
            let state = self.state.read();
            let floor = state
                .instance
                .as_ref()
                .map_or(state.next_height, |instance| instance.height());
            (floor, height_horizon(state.next_height))
        };
        let height = msg.height();
        if height < floor {
            debug!(role = %self.role, height, floor, "[validator] Dropping message of an earlier height");
            return Ok(());
        }
        if height > horizon {
            return Err(ValidatorError::HeightOutOfWindow { height, horizon });
        }

        self.queue.add_message(msg)?;
        self.process_queue()?;
        Ok(())
    }

    /// Drain the queue into the current instance. Returns how many
    /// messages were consumed.
    pub fn process_queue(&self) -> ValidatorResult<usize> {
        match self.current_instance() {
            Some(instance) => self.drain(&instance),
            None => Ok(0),
        }
    }

    pub fn on_timeout(&self, event: RoundTimeout) -> ValidatorResult<()> {
        let Some(instance) = self.current_instance() else {
            return Ok(());
        };
        if instance.on_timeout(event)? {
            self.drain(&instance)?;
        }
        Ok(())
    }

    /// Collect pre- or post-consensus signature shares. Returns the signing
    /// roots that reached quorum with this message.
    pub fn process_partial_signatures(
        &self,
        msg: &PartialSignatureMessages,
    ) -> ValidatorResult<Vec<Hash>> {
        if !self.share.is_member(msg.signer) {
            return Err(ValidatorError::UnknownSigner(msg.signer));
        }

        let container = match msg.kind {
            PartialSigKind::PreConsensus => {
                if !self.role.requires_pre_consensus() {
                    return Err(ValidatorError::NoPreConsensus(self.role));
                }
                if self.state.read().duty.is_none() {
                    return Err(ValidatorError::NoRunningDuty(self.role));
                }
                &self.pre_consensus
            }
            PartialSigKind::PostConsensus => {
                if self.role.requires_consensus() {
                    let decided = self
                        .current_instance()
                        .is_some_and(|instance| instance.is_decided());
                    if !decided {
                        return Err(ValidatorError::NotDecided);
                    }
                } else if self.state.read().duty.is_none() {
                    return Err(ValidatorError::NoRunningDuty(self.role));
                }
                &self.post_consensus
            }
        };

        let mut container = container.lock();
        let reached: Vec<Hash> = msg
            .messages
            .iter()
            .filter(|sig| container.add(msg.signer, sig))
            .map(|sig| sig.signing_root)
            .collect();

        for root in &reached {
            info!(
                role = %self.role,
                kind = ?msg.kind,
                root = %hex::encode(root),
                "[validator] Partial signature quorum reached"
            );
        }
        Ok(reached)
    }

    /// Signature shares collected for `root`.
    pub fn partial_signatures(&self, kind: PartialSigKind, root: &Hash) -> Vec<(u64, Vec<u8>)> {
        match kind {
            PartialSigKind::PreConsensus => self.pre_consensus.lock().signatures(root),
            PartialSigKind::PostConsensus => self.post_consensus.lock().signatures(root),
        }
    }

    /// Run until `shutdown` flips or its sender is dropped, handling round
    /// timeouts and queue arrivals.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let Some(mut timeouts) = self.timeouts.lock().take() else {
            warn!(role = %self.role, "[validator] Runner driver already started");
            return;
        };
        debug!(role = %self.role, "[validator] Runner driver started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                Some(event) = timeouts.recv() => {
                    if let Err(e) = self.on_timeout(event) {
                        error!(role = %self.role, ?event, error = %e, "[validator] Timeout handling failed");
                    }
                }
                _ = self.queue.wait_for_message() => {
                    if let Err(e) = self.process_queue() {
                        error!(role = %self.role, error = %e, "[validator] Queue processing failed");
                    }
                }
            }
        }
        debug!(role = %self.role, "[validator] Runner driver stopped");
    }

    fn check_sender(&self, msg: &SignedMessage) -> ValidatorResult<()> {
        let signer = msg
            .signer()
            .ok_or_else(|| ValidatorError::InvalidSignature(msg.signers.clone()))?;
        if !self.share.is_member(signer) {
            return Err(ValidatorError::UnknownSigner(signer));
        }
        if !self.deps.verifier.verify(msg, &self.share) {
            warn!(role = %self.role, signer, "[validator] Invalid consensus signature");
            return Err(ValidatorError::InvalidSignature(msg.signers.clone()));
        }
        Ok(())
    }

    fn drain(&self, instance: &Instance) -> ValidatorResult<usize> {
        let mut processed = 0;
        loop {
            while instance.process_message()? {
                processed += 1;
            }
            // A partial-quorum bump makes deferred messages eligible.
            if !instance.process_change_round_partial_quorum()? {
                break;
            }
        }
        Ok(processed)
    }
}

fn height_horizon(next_height: Height) -> Height {
    next_height.saturating_add(FUTURE_HEIGHT_WINDOW)
}
