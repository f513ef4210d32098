//! JSON codec using `serde_json`.
//!
//! Encoding produces a `String` because frames travel as WebSocket text
//! messages. Decoding accepts bytes so binary messages carrying JSON are
//! handled the same way.

use serde_json::value::RawValue;

use crate::error::Result;

/// JSON codec for structured data.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
        Ok(serde_json::to_string(value)?)
    }

    /// Encode a value into an opaque raw JSON payload.
    #[inline]
    pub fn encode_raw<T: serde::Serialize + ?Sized>(value: &T) -> Result<Box<RawValue>> {
        Ok(serde_json::value::to_raw_value(value)?)
    }

    /// Decode JSON bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Collect {
        collectors: Vec<String>,
        force: bool,
    }

    #[test]
    fn test_encode_uses_field_names() {
        let value = Collect {
            collectors: vec!["cpu".into()],
            force: true,
        };

        let encoded = JsonCodec::encode(&value).unwrap();
        assert_eq!(encoded, r#"{"collectors":["cpu"],"force":true}"#);
    }

    #[test]
    fn test_decode_struct() {
        let decoded: Collect =
            JsonCodec::decode(br#"{"collectors":["disk","mem"],"force":false}"#).unwrap();
        assert_eq!(decoded.collectors, vec!["disk", "mem"]);
        assert!(!decoded.force);
    }

    #[test]
    fn test_encode_raw_preserves_text() {
        let raw = JsonCodec::encode_raw(&serde_json::json!({"a": [1, 2]})).unwrap();
        assert_eq!(raw.get(), r#"{"a":[1,2]}"#);
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        let result: Result<Collect> = JsonCodec::decode(b"not json");
        assert!(result.is_err());
    }
}
