//! Typed payloads carried inside frames.
//!
//! - [`AuthPayload`] / [`AuthResult`] - handshake only
//! - [`CommandRequest`] - body of a `command` frame
//! - [`CommandResult`] - body of a `command_response` frame

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use super::wire_format::PROTOCOL_VERSION;
use crate::error::{AgentLinkError, Result};

/// Status string the peer sends on a successful handshake.
pub const AUTH_STATUS_SUCCESS: &str = "success";

/// Credentials and declarations sent in the `auth` frame.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthPayload {
    pub client_id: String,
    pub client_secret: String,
    pub agent_version: String,
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<u64>,
}

impl AuthPayload {
    /// Build an auth payload for the current protocol version.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        agent_version: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            agent_version: agent_version.into(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: Vec::new(),
            organization_id: None,
        }
    }
}

impl fmt::Debug for AuthPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthPayload")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("agent_version", &self.agent_version)
            .field("protocol_version", &self.protocol_version)
            .field("capabilities", &self.capabilities)
            .field("organization_id", &self.organization_id)
            .finish()
    }
}

/// Body of the `auth_response` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResult {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Suggested heartbeat interval in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuthResult {
    #[inline]
    pub fn is_success(&self) -> bool {
        self.status == AUTH_STATUS_SUCCESS
    }
}

/// Body of a `command` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Box<RawValue>>,
}

/// Outcome of a command, as reported by the peer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Box<RawValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl CommandResult {
    /// A successful result carrying `data`.
    pub fn ok(data: Option<Box<RawValue>>) -> Self {
        Self {
            success: true,
            data,
            ..Self::default()
        }
    }

    /// A failed result with an error message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Deserialize `data` into `T`.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T> {
        match &self.data {
            Some(raw) => Ok(serde_json::from_str(raw.get())?),
            None => Err(AgentLinkError::Protocol("result has no data".into())),
        }
    }
}
