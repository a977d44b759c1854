//! Error types for the protocol layer.

/// Errors that can occur in the protocol layer.
///
/// Decoding failures are the common case: a browser sent something that
/// is not JSON, or JSON of the wrong shape. They are always recoverable:
/// the router answers with a `system-message` and keeps the socket open.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, missing required fields,
    /// wrong data types, or truncated messages.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The envelope parsed, but its `type` tag is not one we know.
    #[error("unknown event type: {0}")]
    UnknownType(String),

    /// The message is invalid at the protocol level even though it
    /// deserialized, e.g. an envelope whose body is not an object.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
