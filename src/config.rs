//! Client configuration.
//!
//! [`ClientConfig`] is normally filled through
//! [`ClientBuilder`](crate::ClientBuilder); every field has a default except
//! the control plane base URL and the credentials.

use std::fmt;
use std::time::Duration;

use url::Url;

use crate::error::{AgentLinkError, Result};
use crate::protocol::{AuthPayload, DEFAULT_MAX_FRAME_SIZE};
use crate::transport::endpoint_url;
use crate::writer::WriterConfig;

/// Default per-command response timeout.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Default heartbeat ping interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default deadline for the auth response.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Default reconnect attempt limit.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Default event channel capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Capabilities declared when none are configured.
pub const DEFAULT_CAPABILITIES: &[&str] = &["commands", "heartbeat"];

/// Identity presented in the handshake.
#[derive(Clone, Default)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Automatic reconnection after transport loss.
///
/// Disabled by default: a lost link is only reported through
/// [`ClientEvent::Disconnected`](crate::ClientEvent::Disconnected).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    /// Wait before each attempt.
    pub delay: Duration,
    /// Give up after this many failed attempts. `0` retries forever.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            delay: DEFAULT_RECONNECT_DELAY,
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

/// Everything the client needs to open and run a link.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Control plane base URL (`http`, `https`, `ws` or `wss`).
    pub base_url: String,
    pub credentials: Credentials,
    pub agent_version: String,
    pub capabilities: Vec<String>,
    /// Optional organization scope hint sent in the handshake.
    pub organization_id: Option<u64>,
    pub command_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub handshake_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    pub event_capacity: usize,
    pub max_frame_size: usize,
    pub writer: WriterConfig,
}

impl ClientConfig {
    /// Configuration with defaults for everything but the base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            credentials: Credentials::default(),
            agent_version: env!("CARGO_PKG_VERSION").to_string(),
            capabilities: DEFAULT_CAPABILITIES.iter().map(|c| c.to_string()).collect(),
            organization_id: None,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            writer: WriterConfig::default(),
        }
    }

    /// Link endpoint derived from `base_url`.
    pub fn endpoint(&self) -> Result<Url> {
        endpoint_url(&self.base_url)
    }

    /// Body of the `auth` frame.
    pub fn auth_payload(&self) -> AuthPayload {
        let mut auth = AuthPayload::new(
            &self.credentials.client_id,
            &self.credentials.client_secret,
            &self.agent_version,
        );
        auth.capabilities = self.capabilities.clone();
        auth.organization_id = self.organization_id;
        auth
    }

    /// Reject values the link cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.endpoint()?;

        let durations = [
            ("command_timeout", self.command_timeout),
            ("heartbeat_interval", self.heartbeat_interval),
            ("handshake_timeout", self.handshake_timeout),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(AgentLinkError::Protocol(format!("{} must be non-zero", name)));
            }
        }
        if self.event_capacity == 0 || self.writer.channel_capacity == 0 {
            return Err(AgentLinkError::Protocol(
                "channel capacities must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
