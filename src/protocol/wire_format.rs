//! Wire format encoding and decoding.
//!
//! Every transport message is exactly one JSON object:
//! ```text
//! {"type": string, "id"?: string, "timestamp"?: int, "priority"?: 0|1|2, "payload"?: <json>}
//! ```
//!
//! Encoding and decoding both enforce the correlation id invariant, so a
//! `command` or `command_response` without an id never leaves or enters the
//! client.

use super::frame::Frame;
use crate::codec::JsonCodec;
use crate::error::{AgentLinkError, Result};

/// Protocol version declared in the `auth` frame.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Path appended to the control plane base URL to reach the link endpoint.
pub const LINK_PATH: &str = "/api/v1/agent/ws";

/// Default maximum encoded frame size (16 MB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Encode a frame to its JSON text form.
///
/// # Example
///
/// ```
/// use agentlink_client::protocol::{encode_frame, Frame};
///
/// let text = encode_frame(&Frame::ping()).unwrap();
/// assert!(text.contains(r#""type":"ping""#));
/// ```
pub fn encode_frame(frame: &Frame) -> Result<String> {
    frame.validate()?;
    JsonCodec::encode(frame)
}

/// Decode a frame from one transport message.
///
/// Rejects messages larger than `max_size`.
pub fn decode_frame(bytes: &[u8], max_size: usize) -> Result<Frame> {
    if bytes.len() > max_size {
        return Err(AgentLinkError::Protocol(format!(
            "frame of {} bytes exceeds limit of {}",
            bytes.len(),
            max_size
        )));
    }
    let frame: Frame = JsonCodec::decode(bytes)?;
    frame.validate()?;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{FrameType, Priority};

    #[test]
    fn test_encode_omits_empty_fields() {
        let frame = Frame::new(FrameType::Ping);
        let text = encode_frame(&frame).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["type"], "ping");
        assert_eq!(value["priority"], 1);
        assert!(value.get("id").is_none());
        assert!(value.get("payload").is_none());
    }

    #[test]
    fn test_encode_rejects_command_without_id() {
        let frame = Frame::new(FrameType::Command);
        assert!(matches!(
            encode_frame(&frame),
            Err(AgentLinkError::Protocol(_))
        ));
    }

    #[test]
    fn test_decode_minimal_frame() {
        let frame = decode_frame(br#"{"type":"pong"}"#, DEFAULT_MAX_FRAME_SIZE).unwrap();
        assert_eq!(frame.frame_type, FrameType::Pong);
        assert_eq!(frame.timestamp, 0);
        assert_eq!(frame.priority, Priority::Normal);
    }

    #[test]
    fn test_decode_embedded_payload() {
        let text = br#"{"type":"command_response","id":"c-1","timestamp":5,"priority":2,"payload":{"success":true,"data":[1,2]}}"#;
        let frame = decode_frame(text, DEFAULT_MAX_FRAME_SIZE).unwrap();

        assert_eq!(frame.id(), Some("c-1"));
        assert_eq!(frame.priority, Priority::High);
        assert_eq!(
            frame.raw_payload(),
            Some(r#"{"success":true,"data":[1,2]}"#)
        );
    }

    #[test]
    fn test_decode_rejects_response_without_id() {
        let result = decode_frame(br#"{"type":"command_response"}"#, DEFAULT_MAX_FRAME_SIZE);
        assert!(matches!(result, Err(AgentLinkError::Protocol(_))));
    }

    #[test]
    fn test_decode_rejects_oversized() {
        let result = decode_frame(br#"{"type":"ping"}"#, 4);
        assert!(matches!(result, Err(AgentLinkError::Protocol(_))));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let result = decode_frame(b"{not json", DEFAULT_MAX_FRAME_SIZE);
        assert!(matches!(result, Err(AgentLinkError::Json(_))));
    }
}
