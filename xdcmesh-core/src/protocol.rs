//! Message shapes exchanged with instances at the transport boundary.
//!
//! Inbound text is validated and converted into [`InboundMessage`] here, so
//! the processor only ever sees well-typed calls. Outbound messages are what
//! a listener hands back to its instance.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::update::{Serial, SubmittedUpdate, UpdateEntry};

/// Wire names accepted in the `type` field of inbound messages.
const INBOUND_TYPES: &[&str] = &[
    "sendUpdate",
    "setUpdateListener",
    "sendRealtime",
    "joinRealtime",
    "leaveRealtime",
];

/// Rejections of inbound messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Malformed JSON: {reason}")]
    MalformedJson { reason: String },

    #[error("Message is not an object with a string \"type\" field")]
    MissingType,

    #[error("Unknown message type: {kind}")]
    UnknownMessageType { kind: String },

    #[error("Invalid {kind} message: {reason}")]
    InvalidMessage { kind: String, reason: String },

    #[error("Failed to encode message: {reason}")]
    Encoding { reason: String },
}

/// Message sent by an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InboundMessage {
    SendUpdate {
        update: SubmittedUpdate,
        #[serde(default)]
        descr: String,
    },
    SetUpdateListener {
        serial: Serial,
    },
    SendRealtime {
        data: Vec<u8>,
    },
    JoinRealtime,
    LeaveRealtime,
}

impl InboundMessage {
    /// Parses and validates one inbound message.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::MalformedJson` - If `text` is not JSON
    /// - `ProtocolError::MissingType` - If there is no string `type` field
    /// - `ProtocolError::UnknownMessageType` - If the type is not recognised
    /// - `ProtocolError::InvalidMessage` - If fields have the wrong shape
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text).map_err(|e| ProtocolError::MalformedJson {
            reason: e.to_string(),
        })?;

        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?
            .to_string();

        if !INBOUND_TYPES.contains(&kind.as_str()) {
            return Err(ProtocolError::UnknownMessageType { kind });
        }

        serde_json::from_value(value).map_err(|e| ProtocolError::InvalidMessage {
            kind,
            reason: e.to_string(),
        })
    }

    /// Returns the wire name of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::SendUpdate { .. } => "sendUpdate",
            InboundMessage::SetUpdateListener { .. } => "setUpdateListener",
            InboundMessage::SendRealtime { .. } => "sendRealtime",
            InboundMessage::JoinRealtime => "joinRealtime",
            InboundMessage::LeaveRealtime => "leaveRealtime",
        }
    }
}

/// Message delivered to an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundMessage {
    Updates { updates: Vec<UpdateEntry> },
    Clear,
    Delete,
    Realtime { data: Vec<u8> },
}

impl OutboundMessage {
    /// Encodes the message as JSON text.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Encoding` - If a payload cannot be represented as JSON
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encoding {
            reason: e.to_string(),
        })
    }
}
