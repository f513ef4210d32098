//! Connection manager - owns the link lifecycle.
//!
//! State, the active link and the tokens that can abort it live together in
//! one lock-guarded slot, so a reader never sees a `Connected` state without
//! a link or the other way around.
//!
//! # Lifecycle
//!
//! ```text
//!                 connect()
//! Disconnected ───────────────► Connecting
//!      ▲                            │ dial + handshake
//!      │ failure / disconnect()     ▼
//!      ├─────────────────────── Connected
//!      │  transport loss /          │
//!      └── disconnect() ◄───────────┘
//! ```
//!
//! A running link is a writer task, an inbound router and a heartbeat, all
//! sharing one cancellation token. Links are numbered by a generation so a
//! late report from an old router cannot tear down a newer link.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::{ClientConfig, ReconnectPolicy};
use crate::correlation::CorrelationTable;
use crate::error::{AgentLinkError, Result};
use crate::event::ClientEvent;
use crate::heartbeat::spawn_heartbeat;
use crate::protocol::{AuthResult, CommandResult, Frame, FrameType, Priority};
use crate::router::{run_router, RouterContext, RouterExit};
use crate::transport::{Dialer, TransportHalves};
use crate::writer::{spawn_writer_task, WriterHandle};

/// Error text given to calls still pending when the client disconnects.
pub(crate) const CONNECTION_CLOSED_MESSAGE: &str = "connection closed";

/// Link state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    /// Whether moving from `self` to `to` is allowed.
    pub fn can_transition_to(self, to: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, to),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Disconnected)
        )
    }
}

/// What the control plane told us in the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: String,
    /// Informational only; the configured interval drives the heartbeat.
    pub suggested_heartbeat_interval: Option<Duration>,
}

struct ActiveLink {
    writer: WriterHandle,
    writer_task: JoinHandle<Result<()>>,
    cancel: CancellationToken,
    session: SessionInfo,
}

struct LinkSlot {
    state: ConnectionState,
    generation: u64,
    link: Option<ActiveLink>,
    /// Fires to abort a connect in flight.
    connect_abort: Option<CancellationToken>,
    /// Fires to stop the reconnect loop.
    reconnect: Option<CancellationToken>,
}

impl LinkSlot {
    fn transition(&mut self, to: ConnectionState) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(AgentLinkError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        tracing::debug!(from = ?self.state, to = ?to, "connection state change");
        self.state = to;
        Ok(())
    }
}

/// One in-flight `connect()`.
///
/// Dropping it moves a slot still `Connecting` for the same generation back
/// to `Disconnected`. After a successful activation the slot is `Connected`
/// and the drop does nothing.
struct ConnectAttempt<'a> {
    manager: &'a ConnectionManager,
    generation: u64,
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        let mut slot = self.manager.slot.write();
        if slot.generation != self.generation || slot.state != ConnectionState::Connecting {
            return;
        }
        slot.connect_abort = None;
        if let Err(e) = slot.transition(ConnectionState::Disconnected) {
            tracing::error!(error = %e, "failed to revert abandoned connect");
        }
    }
}

/// Opens, runs and tears down the link.
pub struct ConnectionManager {
    config: ClientConfig,
    endpoint: Url,
    dialer: Arc<dyn Dialer>,
    table: Arc<CorrelationTable>,
    events: broadcast::Sender<ClientEvent>,
    slot: RwLock<LinkSlot>,
}

impl ConnectionManager {
    /// Validate `config` and create a manager that dials through `dialer`.
    pub fn new(config: ClientConfig, dialer: Arc<dyn Dialer>) -> Result<Self> {
        config.validate()?;
        let endpoint = config.endpoint()?;
        let (events, _) = broadcast::channel(config.event_capacity);

        Ok(Self {
            config,
            endpoint,
            dialer,
            table: Arc::new(CorrelationTable::new()),
            events,
            slot: RwLock::new(LinkSlot {
                state: ConnectionState::Disconnected,
                generation: 0,
                link: None,
                connect_abort: None,
                reconnect: None,
            }),
        })
    }

    /// Open the link and authenticate.
    ///
    /// A no-op when already connected. Fails with `AlreadyConnecting` while
    /// another connect is in flight.
    pub async fn connect(self: &Arc<Self>) -> Result<()> {
        let (generation, abort) = {
            let mut slot = self.slot.write();
            match slot.state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Connecting => return Err(AgentLinkError::AlreadyConnecting),
                ConnectionState::Disconnected => {}
            }
            slot.transition(ConnectionState::Connecting)?;
            slot.generation += 1;
            let abort = CancellationToken::new();
            slot.connect_abort = Some(abort.clone());
            (slot.generation, abort)
        };

        // Reverts to Disconnected on every exit that does not activate the
        // link, including the caller dropping this future.
        let _attempt = ConnectAttempt {
            manager: self,
            generation,
        };
        tracing::debug!(endpoint = %self.endpoint, generation, "connecting");

        let opened = tokio::select! {
            biased;
            _ = abort.cancelled() => Err(AgentLinkError::Cancelled),
            opened = self.open_link() => opened,
        };

        let result = opened.and_then(|(halves, session)| self.activate(generation, halves, session));
        if let Err(e) = &result {
            tracing::warn!(endpoint = %self.endpoint, error = %e, "connect failed");
        }
        result
    }

    /// Dial and authenticate. The transport is closed again on failure.
    async fn open_link(&self) -> Result<(TransportHalves, SessionInfo)> {
        let mut halves = self.dialer.dial(&self.endpoint).await?;

        match self.handshake(&mut halves).await {
            Ok(session) => Ok((halves, session)),
            Err(e) => {
                let close = halves.writer.close();
                if tokio::time::timeout(self.config.writer.close_timeout, close)
                    .await
                    .is_err()
                {
                    tracing::debug!("transport close timed out after failed handshake");
                }
                Err(e)
            }
        }
    }

    async fn handshake(&self, halves: &mut TransportHalves) -> Result<SessionInfo> {
        let auth = Frame::new(FrameType::Auth)
            .with_priority(Priority::High)
            .with_payload(&self.config.auth_payload())?;
        halves.writer.send_frame(&auth).await?;

        let deadline = self.config.handshake_timeout;
        let reply = match tokio::time::timeout(deadline, halves.reader.read_frame()).await {
            Err(_) => return Err(AgentLinkError::HandshakeTimeout(deadline)),
            Ok(Err(e)) => {
                return Err(AgentLinkError::AuthenticationFailed(format!(
                    "invalid auth response: {}",
                    e
                )))
            }
            Ok(Ok(frame)) => frame,
        };

        if reply.frame_type != FrameType::AuthResponse {
            return Err(AgentLinkError::AuthenticationFailed(format!(
                "expected auth_response, got {:?}",
                reply.frame_type
            )));
        }

        let result: AuthResult = reply.payload_as().map_err(|e| {
            AgentLinkError::AuthenticationFailed(format!("invalid auth response: {}", e))
        })?;
        if !result.is_success() {
            let reason = result.error.unwrap_or(result.status);
            return Err(AgentLinkError::AuthenticationFailed(reason));
        }

        Ok(SessionInfo {
            session_id: result.session_id.unwrap_or_default(),
            suggested_heartbeat_interval: result.heartbeat_interval.map(Duration::from_secs),
        })
    }

    /// Start the link tasks and flip to `Connected`.
    fn activate(
        self: &Arc<Self>,
        generation: u64,
        halves: TransportHalves,
        session: SessionInfo,
    ) -> Result<()> {
        let mut slot = self.slot.write();
        if slot.generation != generation || slot.state != ConnectionState::Connecting {
            // disconnect() won the race
            return Err(AgentLinkError::Cancelled);
        }
        slot.transition(ConnectionState::Connected)?;
        slot.connect_abort = None;

        let cancel = CancellationToken::new();
        let TransportHalves { writer, reader } = halves;
        let (writer, writer_task) =
            spawn_writer_task(writer, self.config.writer.clone(), cancel.clone());

        let ctx = RouterContext {
            writer: writer.clone(),
            table: self.table.clone(),
            events: self.events.clone(),
        };
        let manager = Arc::downgrade(self);
        let router_cancel = cancel.clone();
        tokio::spawn(async move {
            if let RouterExit::TransportLost(reason) = run_router(reader, ctx, router_cancel).await {
                if let Some(manager) = manager.upgrade() {
                    manager.handle_transport_loss(generation, reason);
                }
            }
        });
        spawn_heartbeat(writer.clone(), self.config.heartbeat_interval, cancel.clone());

        tracing::info!(
            session_id = %session.session_id,
            generation,
            "link established"
        );
        let _ = self.events.send(ClientEvent::Connected {
            session_id: session.session_id.clone(),
        });

        slot.link = Some(ActiveLink {
            writer,
            writer_task,
            cancel,
            session,
        });
        Ok(())
    }

    /// Called by the router when reading from the transport fails.
    ///
    /// Pending calls are not touched; they run into their own timeouts.
    fn handle_transport_loss(self: &Arc<Self>, generation: u64, reason: String) {
        let (link, reconnect) = {
            let mut slot = self.slot.write();
            if slot.generation != generation || slot.state != ConnectionState::Connected {
                return;
            }
            if let Err(e) = slot.transition(ConnectionState::Disconnected) {
                tracing::error!(error = %e, "unexpected state on transport loss");
                return;
            }
            // Registered before the event goes out so disconnect() can stop it.
            let reconnect = self.config.reconnect.enabled.then(|| {
                let token = CancellationToken::new();
                if let Some(previous) = slot.reconnect.replace(token.clone()) {
                    previous.cancel();
                }
                token
            });
            (slot.link.take(), reconnect)
        };

        if let Some(link) = link {
            link.cancel.cancel();
        }
        tracing::warn!(reason = %reason, in_flight = self.table.len(), "link lost");
        let _ = self.events.send(ClientEvent::Disconnected { reason });

        if let Some(token) = reconnect {
            let policy = self.config.reconnect.clone();
            tokio::spawn(reconnect_loop(Arc::downgrade(self), policy, token));
        }
    }

    /// Tear the link down.
    ///
    /// Idempotent. Aborts a connect in flight, stops automatic reconnection
    /// and resolves every pending call with a `connection closed` failure.
    pub async fn disconnect(&self) -> Result<()> {
        let (link, abort, reconnect) = {
            let mut slot = self.slot.write();
            if slot.state != ConnectionState::Disconnected {
                slot.transition(ConnectionState::Disconnected)?;
            }
            (
                slot.link.take(),
                slot.connect_abort.take(),
                slot.reconnect.take(),
            )
        };

        if let Some(token) = reconnect {
            token.cancel();
        }
        if let Some(token) = abort {
            token.cancel();
        }

        let had_link = link.is_some();
        if let Some(link) = link {
            link.cancel.cancel();
            // The writer task closes the transport on its way out.
            if let Ok(Err(e)) = link.writer_task.await {
                tracing::debug!(error = %e, "writer task ended with error");
            }
        }

        let failed = self
            .table
            .drain(CommandResult::failure(CONNECTION_CLOSED_MESSAGE));
        if had_link {
            tracing::info!(failed_calls = failed, "link closed");
            let _ = self.events.send(ClientEvent::Closed);
        }
        Ok(())
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.slot.read().state
    }

    /// Whether the link is up.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Session of the current link.
    pub fn session(&self) -> Option<SessionInfo> {
        self.slot.read().link.as_ref().map(|link| link.session.clone())
    }

    /// Writer of the current link, or `NotConnected`.
    pub(crate) fn writer(&self) -> Result<WriterHandle> {
        let slot = self.slot.read();
        match (&slot.state, &slot.link) {
            (ConnectionState::Connected, Some(link)) => Ok(link.writer.clone()),
            _ => Err(AgentLinkError::NotConnected),
        }
    }

    pub(crate) fn table(&self) -> &CorrelationTable {
        &self.table
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Receive lifecycle events and unsolicited frames.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let slot = self.slot.get_mut();
        for token in [slot.connect_abort.take(), slot.reconnect.take()]
            .into_iter()
            .flatten()
        {
            token.cancel();
        }
        if let Some(link) = slot.link.take() {
            link.cancel.cancel();
        }
    }
}

async fn reconnect_loop(
    manager: Weak<ConnectionManager>,
    policy: ReconnectPolicy,
    token: CancellationToken,
) {
    let mut attempt = 0u32;
    loop {
        if policy.max_attempts != 0 && attempt >= policy.max_attempts {
            if let Some(manager) = manager.upgrade() {
                tracing::warn!(attempts = attempt, "giving up on reconnect");
                let _ = manager
                    .events
                    .send(ClientEvent::ReconnectFailed { attempts: attempt });
            }
            return;
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(policy.delay) => {}
        }

        let Some(strong) = manager.upgrade() else {
            return;
        };
        attempt += 1;
        let _ = strong.events.send(ClientEvent::Reconnecting { attempt });

        match strong.connect().await {
            Ok(()) => {
                tracing::info!(attempt, "reconnected");
                return;
            }
            Err(e) => tracing::warn!(attempt, error = %e, "reconnect attempt failed"),
        }
    }
}
