//! Codec module - serialization/deserialization for payloads and frames.
//!
//! - [`JsonCodec`] - JSON via `serde_json`, one object per message
//!
//! # Design
//!
//! Codecs are marker structs with static methods rather than trait objects,
//! so call sites pick the codec at compile time.
//!
//! # Example
//!
//! ```
//! use agentlink_client::codec::JsonCodec;
//!
//! let encoded = JsonCodec::encode(&"hello").unwrap();
//! let decoded: String = JsonCodec::decode(encoded.as_bytes()).unwrap();
//! assert_eq!(decoded, "hello");
//! ```

mod json;

pub use json::JsonCodec;
