//! Network messages
//!
//! On the wire a message is a JSON envelope naming its type and identifier,
//! with the body carried as hex-encoded JSON in `data`. Decoding parses the
//! body once so the dispatch layer can match on it.
//!
//! Event messages are produced locally (round timeouts) and travel the same
//! dispatch path as network messages. They never arrive from peers.

use super::partial_sig::{PartialSigKind, PartialSignatureMessages};
use crate::error::{ValidatorError, ValidatorResult};
use dv_01_qbft::{RoundTimeout, SignedMessage};
use serde::{Deserialize, Serialize};
use shared_types::MessageId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MsgType {
    Consensus,
    PartialSignature,
    Event,
}

/// Transport envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub msg_type: MsgType,
    pub msg_id: MessageId,
    #[serde(with = "hex::serde")]
    pub data: Vec<u8>,
}

impl WireMessage {
    pub fn from_bytes(raw: &[u8]) -> ValidatorResult<Self> {
        serde_json::from_slice(raw).map_err(|e| ValidatorError::Decode(e.to_string()))
    }

    pub fn to_bytes(&self) -> ValidatorResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ValidatorError::Decode(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Consensus(SignedMessage),
    PartialSignature(PartialSignatureMessages),
    Event(RoundTimeout),
}

/// A wire message with its body parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    pub msg_type: MsgType,
    pub msg_id: MessageId,
    /// Raw body as received.
    pub data: Vec<u8>,
    pub body: MessageBody,
}

impl DecodedMessage {
    pub fn decode(raw: &[u8]) -> ValidatorResult<Self> {
        Self::from_wire(WireMessage::from_bytes(raw)?)
    }

    pub fn from_wire(wire: WireMessage) -> ValidatorResult<Self> {
        let body = match wire.msg_type {
            MsgType::Consensus => {
                let msg: SignedMessage = parse(&wire.data)?;
                if msg.message.identifier != wire.msg_id {
                    return Err(ValidatorError::Decode(
                        "consensus identifier does not match msg ID".to_string(),
                    ));
                }
                MessageBody::Consensus(msg)
            }
            MsgType::PartialSignature => MessageBody::PartialSignature(parse(&wire.data)?),
            MsgType::Event => MessageBody::Event(parse(&wire.data)?),
        };
        Ok(Self {
            msg_type: wire.msg_type,
            msg_id: wire.msg_id,
            data: wire.data,
            body,
        })
    }

    pub fn consensus(msg: SignedMessage) -> ValidatorResult<Self> {
        let data = serde_json::to_vec(&msg).map_err(|e| ValidatorError::Decode(e.to_string()))?;
        Ok(Self {
            msg_type: MsgType::Consensus,
            msg_id: msg.message.identifier,
            data,
            body: MessageBody::Consensus(msg),
        })
    }

    pub fn partial_signatures(msg_id: MessageId, msg: PartialSignatureMessages) -> ValidatorResult<Self> {
        let data = serde_json::to_vec(&msg).map_err(|e| ValidatorError::Decode(e.to_string()))?;
        Ok(Self {
            msg_type: MsgType::PartialSignature,
            msg_id,
            data,
            body: MessageBody::PartialSignature(msg),
        })
    }

    /// A round timeout for the instance stream `msg_id`.
    pub fn timeout_event(msg_id: MessageId, event: RoundTimeout) -> ValidatorResult<Self> {
        let data = serde_json::to_vec(&event).map_err(|e| ValidatorError::Decode(e.to_string()))?;
        Ok(Self {
            msg_type: MsgType::Event,
            msg_id,
            data,
            body: MessageBody::Event(event),
        })
    }

    pub fn partial_sig_kind(&self) -> Option<PartialSigKind> {
        match &self.body {
            MessageBody::PartialSignature(msg) => Some(msg.kind),
            MessageBody::Consensus(_) | MessageBody::Event(_) => None,
        }
    }

    pub fn to_wire(&self) -> WireMessage {
        WireMessage {
            msg_type: self.msg_type,
            msg_id: self.msg_id,
            data: self.data.clone(),
        }
    }
}

fn parse<'a, T: Deserialize<'a>>(data: &'a [u8]) -> ValidatorResult<T> {
    serde_json::from_slice(data).map_err(|e| ValidatorError::Decode(e.to_string()))
}
