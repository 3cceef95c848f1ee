//! # Local Network
//!
//! In-process stand-in for the pubsub transport. Every broadcast is
//! encoded to the wire format, published on the validator's topic, passed
//! through the transport validator and delivered to every connected
//! operator, the sender included.
//!
//! The event bus only enqueues. Delivery happens on the router task, so an
//! instance broadcasting under its lock is never re-entered.

use dv_01_qbft::{DecidedEvent, EventBus, SignedMessage};
use dv_03_validator::{validator_topic, DecodedMessage, MessageValidator, ValidationResult, Validator};
use parking_lot::{Mutex, RwLock};
use shared_types::OperatorId;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// A decided value as published by one operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorDecision {
    pub operator_id: OperatorId,
    pub event: DecidedEvent,
}

#[derive(Debug)]
struct Envelope {
    from: OperatorId,
    topic: String,
    data: Vec<u8>,
}

pub struct LocalNetwork {
    transport: MessageValidator,
    outbound_tx: mpsc::UnboundedSender<Envelope>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Envelope>>>,
    decided_tx: mpsc::UnboundedSender<OperatorDecision>,
    disconnected: RwLock<HashSet<OperatorId>>,
}

impl LocalNetwork {
    /// Create the network and the receiver decisions are reported on.
    pub fn new(transport: MessageValidator) -> (Arc<Self>, mpsc::UnboundedReceiver<OperatorDecision>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (decided_tx, decided_rx) = mpsc::unbounded_channel();
        let network = Self {
            transport,
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            decided_tx,
            disconnected: RwLock::new(HashSet::new()),
        };
        (Arc::new(network), decided_rx)
    }

    /// Event bus for `operator_id`'s consensus instances.
    pub fn event_bus(&self, operator_id: OperatorId) -> Arc<NetworkEventBus> {
        Arc::new(NetworkEventBus {
            operator_id,
            outbound: self.outbound_tx.clone(),
            decided: self.decided_tx.clone(),
        })
    }

    /// Cut `operator_id` off: nothing it sends is delivered and it receives
    /// nothing.
    pub fn disconnect(&self, operator_id: OperatorId) {
        self.disconnected.write().insert(operator_id);
        info!(operator_id, "[network] Operator disconnected");
    }

    pub fn reconnect(&self, operator_id: OperatorId) {
        self.disconnected.write().remove(&operator_id);
        info!(operator_id, "[network] Operator reconnected");
    }

    pub fn is_connected(&self, operator_id: OperatorId) -> bool {
        !self.disconnected.read().contains(&operator_id)
    }

    /// Route messages to `nodes` until `shutdown` flips.
    pub async fn run(
        self: Arc<Self>,
        nodes: Vec<(OperatorId, Arc<Validator>)>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let Some(mut outbound) = self.outbound_rx.lock().take() else {
            warn!("[network] Router already running");
            return;
        };
        debug!(nodes = nodes.len(), "[network] Router started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                envelope = outbound.recv() => match envelope {
                    Some(envelope) => self.deliver(&nodes, envelope),
                    None => break,
                },
            }
        }
        debug!("[network] Router stopped");
    }

    fn deliver(&self, nodes: &[(OperatorId, Arc<Validator>)], envelope: Envelope) {
        if !self.is_connected(envelope.from) {
            return;
        }
        match self.transport.validate(&envelope.topic, &envelope.data) {
            ValidationResult::Accept => {}
            ValidationResult::Ignore => return,
            ValidationResult::Reject => {
                warn!(from = envelope.from, topic = %envelope.topic, "[network] Message rejected");
                return;
            }
        }
        let decoded = match DecodedMessage::decode(&envelope.data) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(from = envelope.from, error = %e, "[network] Undecodable message");
                return;
            }
        };

        for (operator_id, validator) in nodes {
            if !self.is_connected(*operator_id) {
                continue;
            }
            if let Err(e) = validator.process_message(decoded.clone()) {
                warn!(operator_id, from = envelope.from, error = %e, "[network] Delivery failed");
            }
        }
    }
}

/// [`EventBus`] of one operator on the local network.
pub struct NetworkEventBus {
    operator_id: OperatorId,
    outbound: mpsc::UnboundedSender<Envelope>,
    decided: mpsc::UnboundedSender<OperatorDecision>,
}

impl EventBus for NetworkEventBus {
    fn broadcast(&self, msg: &SignedMessage) -> Result<(), String> {
        let data = DecodedMessage::consensus(msg.clone())
            .and_then(|decoded| decoded.to_wire().to_bytes())
            .map_err(|e| e.to_string())?;
        let envelope = Envelope {
            from: self.operator_id,
            topic: validator_topic(&msg.message.identifier.validator_pk),
            data,
        };
        self.outbound
            .send(envelope)
            .map_err(|_| "local network closed".to_string())
    }

    fn publish_decided(&self, event: &DecidedEvent) -> Result<(), String> {
        self.decided
            .send(OperatorDecision {
                operator_id: self.operator_id,
                event: event.clone(),
            })
            .map_err(|_| "decision receiver closed".to_string())
    }
}
