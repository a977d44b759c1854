//! Codec trait and the JSON implementation.
//!
//! Browsers speak JSON text frames, the bus carries JSON bytes, and the
//! persisted lobby document is JSON too. Everything goes through the
//! [`Codec`] trait so the three places agree on one implementation.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because a single codec value is shared by
/// every connection task and lobby actor in the process.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;

    /// Serializes a value into a UTF-8 string, for text frames.
    fn encode_text<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ```rust
/// use scrawl_protocol::{Codec, GameEvent, JsonCodec};
///
/// let codec = JsonCodec;
/// let event = GameEvent::new("start", serde_json::Value::Null);
///
/// let bytes = codec.encode(&event).unwrap();
/// let decoded: GameEvent = codec.decode(&bytes).unwrap();
/// assert_eq!(event, decoded);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }

    fn encode_text<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(value).map_err(ProtocolError::Encode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GameEvent;

    #[test]
    fn test_decode_garbage_returns_decode_error() {
        let result: Result<GameEvent, _> = JsonCodec.decode(b"not json at all");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_encode_text_matches_encode_bytes() {
        let event = GameEvent::new("message", serde_json::json!("hello"));
        let text = JsonCodec.encode_text(&event).unwrap();
        let bytes = JsonCodec.encode(&event).unwrap();
        assert_eq!(text.as_bytes(), bytes.as_slice());
    }
}
