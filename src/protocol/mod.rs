//! Protocol module - wire format, frame types and typed payloads.
//!
//! This module implements the JSON protocol spoken over the link:
//! - Frame envelope with type, correlation id, timestamp and priority
//! - Frame encode/decode with the correlation id invariant
//! - Handshake and command payloads

mod frame;
mod messages;
mod wire_format;

pub use frame::{Frame, FrameType, Priority};
pub use messages::{AuthPayload, AuthResult, CommandRequest, CommandResult, AUTH_STATUS_SUCCESS};
pub use wire_format::{
    decode_frame, encode_frame, DEFAULT_MAX_FRAME_SIZE, LINK_PATH, PROTOCOL_VERSION,
};
