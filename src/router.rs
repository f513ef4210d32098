//! Inbound router - the single reader loop of a link.
//!
//! Reads one frame at a time and dispatches by type:
//!
//! | type               | action                                   |
//! |--------------------|------------------------------------------|
//! | `command_response` | resolve the matching pending call        |
//! | `ping`             | answer with exactly one `pong`           |
//! | `pong`             | nothing, liveness evidence only          |
//! | anything else      | publish as [`ClientEvent::Message`]      |
//!
//! A message that fails to decode is skipped. A transport read failure ends
//! the loop with [`RouterExit::TransportLost`]; pending calls are left to
//! their own timeouts.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::correlation::CorrelationTable;
use crate::event::ClientEvent;
use crate::protocol::{CommandResult, Frame, FrameType};
use crate::transport::{is_message_error, FrameReader};
use crate::writer::WriterHandle;

/// Why the router stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RouterExit {
    /// The link token was cancelled.
    Cancelled,
    /// Reading from the transport failed.
    TransportLost(String),
}

/// What the router needs to act on frames.
pub(crate) struct RouterContext {
    pub writer: WriterHandle,
    pub table: Arc<CorrelationTable>,
    pub events: broadcast::Sender<ClientEvent>,
}

/// Run the read loop until cancellation or transport failure.
pub(crate) async fn run_router(
    mut reader: Box<dyn FrameReader>,
    ctx: RouterContext,
    cancel: CancellationToken,
) -> RouterExit {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return RouterExit::Cancelled,
            next = reader.read_frame() => next,
        };

        match next {
            Ok(frame) => ctx.dispatch(frame),
            Err(e) if is_message_error(&e) => {
                tracing::warn!(error = %e, "skipping undecodable frame");
            }
            Err(e) => return RouterExit::TransportLost(e.to_string()),
        }
    }
}

impl RouterContext {
    fn dispatch(&self, frame: Frame) {
        match frame.frame_type {
            FrameType::CommandResponse => self.resolve_response(frame),
            FrameType::Ping => {
                // Queued only; reading never waits on the transport write.
                if let Err(e) = self.writer.try_send(Frame::pong(frame.id)) {
                    tracing::debug!(error = %e, "failed to answer ping");
                }
            }
            FrameType::Pong => tracing::trace!("pong received"),
            other => {
                tracing::trace!(frame_type = ?other, "forwarding unsolicited frame");
                // No subscribers is fine.
                let _ = self.events.send(ClientEvent::Message(frame));
            }
        }
    }

    fn resolve_response(&self, frame: Frame) {
        // Decoding guarantees the id is present.
        let Some(id) = frame.id() else { return };

        let result = match frame.payload_as::<CommandResult>() {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "undecodable command response");
                CommandResult::failure(format!("invalid command response: {}", e))
            }
        };
        self.table.resolve(id, result);
    }
}
