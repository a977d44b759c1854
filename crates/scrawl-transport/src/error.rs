/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed: a clean close frame, an abnormal close
    /// (reset without a closing handshake), or a read on a socket that is
    /// already closed. Fatal for the connection.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed for a reason that does not look like a
    /// close. The reader logs these and keeps reading.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting TCP connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The upgrade gate refused the request; the client got a plain HTTP
    /// error response with this status.
    #[error("upgrade rejected with status {status}: {reason}")]
    Rejected { status: u16, reason: String },

    /// The WebSocket handshake itself failed.
    #[error("handshake failed: {0}")]
    Handshake(String),
}

impl TransportError {
    /// Returns `true` if the connection cannot be read from any more.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConnectionClosed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_fatal_only_for_closed() {
        assert!(TransportError::ConnectionClosed("bye".into()).is_fatal());
        let io = std::io::Error::other("hiccup");
        assert!(!TransportError::ReceiveFailed(io).is_fatal());
    }
}
