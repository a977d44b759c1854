use scrawl_protocol::ProtocolError;

/// Errors that can occur on the replication bus.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The Redis connection or command failed.
    #[error("bus error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] ProtocolError),

    /// The publisher task has stopped.
    #[error("bus publisher is closed")]
    Closed,

    /// Nobody answered on the channel in time.
    #[error("no reply on {0}")]
    Timeout(String),
}
