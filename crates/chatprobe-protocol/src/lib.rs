pub mod endpoint;

pub use endpoint::{ChatEndpoint, DEFAULT_SERVER_URL, EndpointError};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Client-to-server frame. The server reads nothing but `message`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OutboundEnvelope {
    pub message: String,
}

impl OutboundEnvelope {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// A chat line as broadcast by the server, either replayed from history or
/// relayed live. `order_id` and `sender_id` are only present on newer servers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender_type: String,
    pub message: String,
    pub created_at: DateTime<FixedOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<i64>,
}

/// Server-to-client frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Chat(ChatMessage),
    /// `{"error": "..."}`, sent by the server before it drops the socket
    /// (bad order id, unauthorized, not a member of the order).
    Error(String),
}

/// Why an inbound frame could not be understood. Never fatal for the
/// connection; the frame is dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedMessage {
    #[error("invalid json: {0}")]
    InvalidJson(String),

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid created_at {value:?}: {reason}")]
    InvalidTimestamp { value: String, reason: String },

    #[error("binary frame is not valid utf-8")]
    InvalidUtf8,
}

#[derive(Deserialize)]
struct RawInbound {
    error: Option<String>,
    sender_type: Option<String>,
    message: Option<String>,
    created_at: Option<String>,
    order_id: Option<i64>,
    sender_id: Option<i64>,
}

impl Inbound {
    /// Parse one text frame. An `error` field wins over every other field.
    pub fn parse(text: &str) -> Result<Self, MalformedMessage> {
        let raw: RawInbound = serde_json::from_str(text)
            .map_err(|e| MalformedMessage::InvalidJson(e.to_string()))?;

        if let Some(error) = raw.error {
            return Ok(Inbound::Error(error));
        }

        let sender_type = raw
            .sender_type
            .ok_or(MalformedMessage::MissingField("sender_type"))?;
        let message = raw
            .message
            .ok_or(MalformedMessage::MissingField("message"))?;
        let created_at = raw
            .created_at
            .ok_or(MalformedMessage::MissingField("created_at"))?;
        let created_at = DateTime::parse_from_rfc3339(&created_at).map_err(|e| {
            MalformedMessage::InvalidTimestamp {
                value: created_at.clone(),
                reason: e.to_string(),
            }
        })?;

        Ok(Inbound::Chat(ChatMessage {
            sender_type,
            message,
            created_at,
            order_id: raw.order_id,
            sender_id: raw.sender_id,
        }))
    }

    /// Binary frames carry the same JSON as text frames.
    pub fn parse_bytes(bytes: &[u8]) -> Result<Self, MalformedMessage> {
        let text = std::str::from_utf8(bytes).map_err(|_| MalformedMessage::InvalidUtf8)?;
        Self::parse(text)
    }
}
