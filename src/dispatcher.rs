//! Command dispatcher - request/response over the shared link.
//!
//! Each call gets a fresh correlation id, registers a [`PendingCall`], writes
//! one `command` frame and then races three outcomes:
//!
//! 1. the matching `command_response` arrives
//! 2. the caller's [`CancellationToken`] fires
//! 3. the per-call timeout elapses
//!
//! The timeout and the token also cover the write itself, so a stalled
//! transport cannot hold a caller past its deadline.
//!
//! The pending entry is dropped on every path, so a cancelled or timed-out
//! call leaves nothing behind in the table.
//!
//! [`PendingCall`]: crate::correlation::PendingCall

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::value::RawValue;
use tokio_util::sync::CancellationToken;

use crate::codec::JsonCodec;
use crate::connection::ConnectionManager;
use crate::error::{AgentLinkError, Result};
use crate::protocol::{CommandRequest, CommandResult, Frame, FrameType};

/// Sends commands and waits for their correlated responses.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    manager: Arc<ConnectionManager>,
    default_timeout: Duration,
}

impl Dispatcher {
    pub(crate) fn new(manager: Arc<ConnectionManager>) -> Self {
        let default_timeout = manager.config().command_timeout;
        Self {
            manager,
            default_timeout,
        }
    }

    /// Send with the configured command timeout.
    pub(crate) async fn send(
        &self,
        cancel: &CancellationToken,
        command: &str,
        payload: Option<Box<RawValue>>,
    ) -> Result<CommandResult> {
        self.send_with_timeout(cancel, command, payload, self.default_timeout)
            .await
    }

    /// Serialize `payload` as JSON and send it.
    pub(crate) async fn send_json<T: Serialize + ?Sized>(
        &self,
        cancel: &CancellationToken,
        command: &str,
        payload: &T,
    ) -> Result<CommandResult> {
        let raw = JsonCodec::encode_raw(payload)?;
        self.send(cancel, command, Some(raw)).await
    }

    pub(crate) async fn send_with_timeout(
        &self,
        cancel: &CancellationToken,
        command: &str,
        payload: Option<Box<RawValue>>,
        timeout: Duration,
    ) -> Result<CommandResult> {
        let writer = self.manager.writer()?;
        let table = self.manager.table();

        let id = table.next_id();
        let mut pending = table.register(id.clone())?;

        let request = CommandRequest {
            command: command.to_string(),
            payload,
        };
        let frame = Frame::new(FrameType::Command)
            .with_id(id)
            .with_payload(&request)?;

        // One deadline covers both the write and the wait for the response.
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        tracing::debug!(id = %pending.id(), command, "sending command");
        tokio::select! {
            biased;
            sent = writer.send(frame) => {
                sent.map_err(|e| AgentLinkError::SendFailed(e.to_string()))?;
            }
            _ = cancel.cancelled() => {
                tracing::debug!(id = %pending.id(), command, "command cancelled before write completed");
                return Err(AgentLinkError::Cancelled);
            }
            _ = &mut deadline => {
                tracing::warn!(id = %pending.id(), command, ?timeout, "command write timed out");
                return Err(AgentLinkError::Timeout(timeout));
            }
        }

        tokio::select! {
            biased;
            result = pending.response() => {
                let result = result?;
                tracing::debug!(id = %pending.id(), command, success = result.success, "command completed");
                Ok(result)
            }
            _ = cancel.cancelled() => {
                tracing::debug!(id = %pending.id(), command, "command cancelled");
                Err(AgentLinkError::Cancelled)
            }
            _ = &mut deadline => {
                tracing::warn!(id = %pending.id(), command, ?timeout, "command timed out");
                Err(AgentLinkError::Timeout(timeout))
            }
        }
    }
}
