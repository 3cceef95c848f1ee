//! # Validator
//!
//! One distributed validator as seen by this operator: its share and a
//! duty runner per role. The runner map is owned here and fixed at
//! construction.

use crate::domain::{DecodedMessage, Duty, MessageBody};
use crate::error::{ValidatorError, ValidatorResult};
use crate::runner::{DutyRunner, RunnerConfig};
use dv_01_qbft::{InstanceDependencies, SlotClock};
use parking_lot::RwLock;
use shared_types::{Height, RunnerRole, Share};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub struct Validator {
    share: Arc<Share>,
    runners: HashMap<RunnerRole, Arc<DutyRunner>>,
    /// Latest duty ID per role, attached to log lines.
    duty_ids: RwLock<HashMap<RunnerRole, String>>,
}

impl Validator {
    pub fn new(share: Arc<Share>, runners: impl IntoIterator<Item = Arc<DutyRunner>>) -> Self {
        Self {
            share,
            runners: runners.into_iter().map(|r| (r.role(), r)).collect(),
            duty_ids: RwLock::new(HashMap::new()),
        }
    }

    /// A validator with one runner per role in `roles`, all sharing `deps`.
    pub fn with_roles(
        share: Arc<Share>,
        roles: &[RunnerRole],
        deps: InstanceDependencies,
        clock: Arc<dyn SlotClock>,
        config: RunnerConfig,
    ) -> ValidatorResult<Self> {
        let runners = roles
            .iter()
            .map(|role| {
                DutyRunner::new(*role, share.clone(), deps.clone(), clock.clone(), config).map(Arc::new)
            })
            .collect::<ValidatorResult<Vec<_>>>()?;
        Ok(Self::new(share, runners))
    }

    pub fn share(&self) -> &Share {
        &self.share
    }

    pub fn runner(&self, role: RunnerRole) -> Option<&Arc<DutyRunner>> {
        self.runners.get(&role)
    }

    pub fn duty_id(&self, role: RunnerRole) -> Option<String> {
        self.duty_ids.read().get(&role).cloned()
    }

    /// Start `duty` on the runner of its role.
    pub fn start_duty(&self, duty: Duty, input: Vec<u8>) -> ValidatorResult<Option<Height>> {
        let runner = self
            .runners
            .get(&duty.role)
            .ok_or(ValidatorError::NoRunner(duty.role))?;

        let duty_id = duty.id();
        self.duty_ids.write().insert(duty.role, duty_id.clone());
        info!(duty_id = %duty_id, slot = duty.slot, "[validator] Starting duty processing");

        runner.start_new_duty(duty, input)
    }

    /// Route a decoded message to its runner: consensus messages to the
    /// queue, partial signatures to the containers, timeout events to the
    /// current instance.
    pub fn process_message(&self, msg: DecodedMessage) -> ValidatorResult<()> {
        let msg_id = msg.msg_id;
        let runner = self
            .runners
            .get(&msg_id.role)
            .ok_or(ValidatorError::NoRunnerForMessage(msg_id))?;

        validate_message(&self.share, &msg)
            .map_err(|reason| ValidatorError::InvalidMessage { msg_id, reason })?;

        let duty_id = self.duty_id(msg_id.role).unwrap_or_default();
        match msg.body {
            MessageBody::Consensus(signed) => {
                debug!(
                    duty_id = %duty_id,
                    height = signed.height(),
                    round = signed.round(),
                    msg_type = %signed.msg_type(),
                    "[validator] Consensus message"
                );
                runner.process_consensus(signed)
            }
            MessageBody::PartialSignature(partial) => {
                debug!(
                    duty_id = %duty_id,
                    kind = ?partial.kind,
                    signer = partial.signer,
                    "[validator] Partial signature message"
                );
                runner.process_partial_signatures(&partial).map(|_| ())
            }
            MessageBody::Event(event) => {
                debug!(
                    duty_id = %duty_id,
                    height = event.height,
                    round = event.round,
                    "[validator] Timeout event"
                );
                runner.on_timeout(event)
            }
        }
    }

    /// Spawn the driver of every runner.
    pub fn spawn_drivers(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        self.runners
            .values()
            .map(|runner| tokio::spawn(runner.clone().run(shutdown.clone())))
            .collect()
    }
}

fn validate_message(share: &Share, msg: &DecodedMessage) -> Result<(), &'static str> {
    if !msg.msg_id.belongs_to(&share.validator_pk) {
        return Err("msg ID doesn't match validator ID");
    }
    if msg.data.is_empty() {
        return Err("msg data is invalid");
    }
    Ok(())
}
