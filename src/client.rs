//! Client builder and public facade.
//!
//! The [`ClientBuilder`] provides a fluent API for configuring the link and
//! building the client. The [`AgentClient`] manages the lifecycle:
//! 1. Dial the control plane endpoint
//! 2. Authenticate with the `auth` handshake
//! 3. Run the writer, inbound router and heartbeat
//! 4. Correlate command responses back to their callers
//!
//! # Example
//!
//! ```ignore
//! use agentlink_client::{AgentClient, CancellationToken};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = AgentClient::builder("https://cp.example.com")
//!         .credentials("agent-42", "s3cret")
//!         .build()?;
//!
//!     client.connect().await?;
//!     let result = client
//!         .send_json(&CancellationToken::new(), "get_status", &serde_json::json!({}))
//!         .await?;
//!     println!("success: {}", result.success);
//!
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::value::RawValue;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::{ClientConfig, Credentials, ReconnectPolicy};
use crate::connection::{ConnectionManager, ConnectionState, SessionInfo};
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::event::ClientEvent;
use crate::protocol::CommandResult;
use crate::transport::{Dialer, WebSocketDialer};

/// Builder for configuring and creating an [`AgentClient`].
///
/// Only the base URL is required; everything else has a default.
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    /// Create a builder for the control plane at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            config: ClientConfig::new(base_url),
        }
    }

    /// Set the client id and secret presented in the handshake.
    pub fn credentials(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.config.credentials = Credentials::new(client_id, client_secret);
        self
    }

    /// Set the agent version reported in the handshake.
    ///
    /// Default: this crate's version
    pub fn agent_version(mut self, version: impl Into<String>) -> Self {
        self.config.agent_version = version.into();
        self
    }

    /// Replace the declared capabilities.
    ///
    /// Default: `commands`, `heartbeat`
    pub fn capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    /// Scope the agent to an organization.
    pub fn organization_id(mut self, id: u64) -> Self {
        self.config.organization_id = Some(id);
        self
    }

    /// Set the default per-command response timeout.
    ///
    /// Default: 30 seconds
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    /// Set the heartbeat ping interval.
    ///
    /// Default: 30 seconds
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    /// Set the deadline for the auth response.
    ///
    /// Default: 10 seconds
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Set the automatic reconnection policy.
    ///
    /// Default: disabled
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.config.reconnect = policy;
        self
    }

    /// Set the event channel capacity.
    ///
    /// Default: 256
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.writer.channel_capacity = capacity;
        self
    }

    /// Set the largest inbound frame accepted.
    ///
    /// Default: 16 MiB
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// The configuration built so far.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Build a client that connects over WebSocket.
    pub fn build(self) -> Result<AgentClient> {
        let dialer = WebSocketDialer::new(self.config.max_frame_size);
        AgentClient::new(self.config, Arc::new(dialer))
    }

    /// Build a client that connects through `dialer`.
    pub fn build_with_dialer<D: Dialer>(self, dialer: D) -> Result<AgentClient> {
        AgentClient::new(self.config, Arc::new(dialer))
    }
}

/// Client for the agent command channel.
///
/// Cheap to clone; clones share one link and one correlation table, so any
/// number of tasks can send commands concurrently.
#[derive(Clone)]
pub struct AgentClient {
    manager: Arc<ConnectionManager>,
    dispatcher: Dispatcher,
}

impl AgentClient {
    /// Create a builder for the control plane at `base_url`.
    pub fn builder(base_url: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(base_url)
    }

    /// Create a client from a full configuration.
    pub fn new(config: ClientConfig, dialer: Arc<dyn Dialer>) -> Result<Self> {
        let manager = Arc::new(ConnectionManager::new(config, dialer)?);
        let dispatcher = Dispatcher::new(manager.clone());
        Ok(Self {
            manager,
            dispatcher,
        })
    }

    /// Open the link and authenticate. No-op when already connected.
    pub async fn connect(&self) -> Result<()> {
        self.manager.connect().await
    }

    /// Close the link. Pending calls fail with `connection closed`.
    pub async fn disconnect(&self) -> Result<()> {
        self.manager.disconnect().await
    }

    pub fn is_connected(&self) -> bool {
        self.manager.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Session of the current link, if connected.
    pub fn session(&self) -> Option<SessionInfo> {
        self.manager.session()
    }

    /// Send a command and wait for its response.
    ///
    /// Uses the configured command timeout. `cancel` only aborts this call.
    pub async fn send(
        &self,
        cancel: &CancellationToken,
        command: &str,
        payload: Option<Box<RawValue>>,
    ) -> Result<CommandResult> {
        self.dispatcher.send(cancel, command, payload).await
    }

    /// Like [`send`](Self::send) with a JSON-serializable payload.
    pub async fn send_json<T: Serialize + ?Sized>(
        &self,
        cancel: &CancellationToken,
        command: &str,
        payload: &T,
    ) -> Result<CommandResult> {
        self.dispatcher.send_json(cancel, command, payload).await
    }

    /// Like [`send`](Self::send) with an explicit timeout.
    pub async fn send_with_timeout(
        &self,
        cancel: &CancellationToken,
        command: &str,
        payload: Option<Box<RawValue>>,
        timeout: Duration,
    ) -> Result<CommandResult> {
        self.dispatcher
            .send_with_timeout(cancel, command, payload, timeout)
            .await
    }

    /// Receive lifecycle events and unsolicited frames.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.manager.subscribe()
    }

    /// Number of commands awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.manager.table().len()
    }

    pub fn config(&self) -> &ClientConfig {
        self.manager.config()
    }
}
