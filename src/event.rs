//! Link lifecycle and unsolicited-message events.
//!
//! Events are published on a broadcast channel instead of calling user
//! callbacks from the reader loop; a slow subscriber lags and loses old
//! events but never stalls the link.

use crate::protocol::Frame;

/// Something that happened on the link.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Handshake completed.
    Connected { session_id: String },
    /// The transport failed. Emitted once per link.
    Disconnected { reason: String },
    /// `disconnect()` tore the link down.
    Closed,
    /// Automatic reconnection is about to try again.
    Reconnecting { attempt: u32 },
    /// Automatic reconnection stopped without a link.
    ReconnectFailed { attempts: u32 },
    /// A frame that is neither a command response nor a heartbeat.
    Message(Frame),
}
