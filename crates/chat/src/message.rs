// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chat wire format.
//!
//! Outbound events are flat JSON objects keyed by `type`. Inbound frames are
//! decoded leniently: anything that is not a `{"message": "..."}` object is
//! forwarded verbatim as the message text.

use axum::extract::ws::Utf8Bytes;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::client::ClientIdentity;

/// Pre-serialized outbound event. Cheap to clone across room members.
pub type Payload = Utf8Bytes;

/// Kind of chat event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Message,
    Join,
    Leave,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Join => "join",
            Self::Leave => "leave",
        }
    }
}

/// A chat event as sent to room members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(rename = "customer_request_id")]
    pub room_id: String,
    pub sender_id: String,
    pub sender_type: String,
    pub message: String,
    pub timestamp: String,
}

impl ChatMessage {
    /// Build an event stamped with `sender`'s identity and the current time.
    pub fn new(kind: MessageKind, sender: &ClientIdentity, text: impl Into<String>) -> Self {
        Self {
            kind,
            room_id: sender.room_id.clone(),
            sender_id: sender.user_id.clone(),
            sender_type: sender.user_type.clone(),
            message: text.into(),
            timestamp: now_rfc3339(),
        }
    }

    pub fn join(sender: &ClientIdentity) -> Self {
        Self::new(MessageKind::Join, sender, String::new())
    }

    pub fn leave(sender: &ClientIdentity) -> Self {
        Self::new(MessageKind::Leave, sender, String::new())
    }

    pub fn text(sender: &ClientIdentity, text: impl Into<String>) -> Self {
        Self::new(MessageKind::Message, sender, text)
    }

    /// Serialize for fan-out. Failure drops the event; no partial payload is
    /// ever produced.
    pub fn encode(&self) -> Result<Payload, serde_json::Error> {
        serde_json::to_string(self).map(Payload::from)
    }
}

/// Inbound request body from a chat client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatMessageRequest {
    #[serde(default)]
    pub message: String,
}

/// Extract the message text from an inbound frame.
///
/// Frames that fail to parse as [`ChatMessageRequest`] are used as-is.
pub fn decode_inbound(frame: &str) -> String {
    match serde_json::from_str::<ChatMessageRequest>(frame) {
        Ok(req) => req.message,
        Err(_) => frame.to_owned(),
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
