//! Frame struct with typed accessors.
//!
//! A frame is one JSON object per transport message:
//!
//! ```text
//! {"type": "command", "id": "…", "timestamp": 1700000000000, "priority": 1, "payload": {…}}
//! ```
//!
//! The payload is kept as raw JSON so the envelope never has to know the
//! shape of what it carries.
//!
//! # Example
//!
//! ```
//! use agentlink_client::protocol::{Frame, FrameType, Priority};
//!
//! let frame = Frame::pong(Some("abc".to_string()));
//! assert_eq!(frame.frame_type, FrameType::Pong);
//! assert_eq!(frame.priority, Priority::Low);
//! assert_eq!(frame.id(), Some("abc"));
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::{AgentLinkError, Result};

/// Frame type discriminator (`type` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    Auth,
    AuthResponse,
    Ping,
    Pong,
    Command,
    CommandResponse,
    Request,
    RequestResponse,
    UpdateProgress,
    Error,
    /// Any type string this client does not know. Forwarded as-is.
    #[serde(other)]
    Other,
}

impl FrameType {
    /// Whether frames of this type must carry a non-empty correlation id.
    #[inline]
    pub fn requires_id(self) -> bool {
        matches!(self, FrameType::Command | FrameType::CommandResponse)
    }
}

/// Delivery priority hint, `0..=2` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Priority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> u8 {
        p as u8
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Priority::Low),
            1 => Ok(Priority::Normal),
            2 => Ok(Priority::High),
            other => Err(format!("invalid priority {}", other)),
        }
    }
}

/// A complete protocol frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    /// Frame type.
    #[serde(rename = "type")]
    pub frame_type: FrameType,
    /// Correlation id (required for `command` / `command_response`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Milliseconds since the Unix epoch at creation.
    #[serde(default)]
    pub timestamp: i64,
    /// Delivery priority.
    #[serde(default)]
    pub priority: Priority,
    /// Opaque JSON payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Box<RawValue>>,
}

impl Frame {
    /// Create a frame of the given type with no id and no payload.
    pub fn new(frame_type: FrameType) -> Self {
        Self {
            frame_type,
            id: None,
            timestamp: now_millis(),
            priority: Priority::Normal,
            payload: None,
        }
    }

    /// Set the correlation id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Serialize `value` as the payload.
    pub fn with_payload<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        self.payload = Some(serde_json::value::to_raw_value(value)?);
        Ok(self)
    }

    /// Heartbeat ping.
    pub fn ping() -> Self {
        Self::new(FrameType::Ping).with_priority(Priority::Low)
    }

    /// Heartbeat reply. Echoes the ping's id when it had one.
    pub fn pong(id: Option<String>) -> Self {
        let mut frame = Self::new(FrameType::Pong).with_priority(Priority::Low);
        frame.id = id;
        frame
    }

    /// Get the correlation id, if any.
    #[inline]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Get the raw payload text, if any.
    #[inline]
    pub fn raw_payload(&self) -> Option<&str> {
        self.payload.as_deref().map(RawValue::get)
    }

    /// Deserialize the payload into `T`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        match &self.payload {
            Some(raw) => Ok(serde_json::from_str(raw.get())?),
            None => Err(AgentLinkError::Protocol(format!(
                "{:?} frame has no payload",
                self.frame_type
            ))),
        }
    }

    /// Check the correlation id invariant.
    pub fn validate(&self) -> Result<()> {
        if self.frame_type.requires_id() && self.id().map_or(true, str::is_empty) {
            return Err(AgentLinkError::Protocol(format!(
                "{:?} frame without correlation id",
                self.frame_type
            )));
        }
        Ok(())
    }
}

/// Current time in milliseconds since the Unix epoch.
fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
