//! Transport layer for Scrawl.
//!
//! Accepts TCP connections, runs the WebSocket upgrade through an
//! [`UpgradeGate`] that may refuse it with a plain HTTP status, and hands
//! back a connection split into two halves:
//!
//! - [`WebSocketReader`]: owned by exactly one reader task, no locking.
//! - [`WebSocketWriter`]: cheap to clone, every send acquires the
//!   connection's own write guard because the socket forbids concurrent
//!   writers.

mod error;
mod websocket;

pub use error::TransportError;
pub use websocket::{
    IncomingConnection, WebSocketReader, WebSocketTransport, WebSocketWriter,
};

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// The parts of an HTTP upgrade request a gate needs to decide on it.
#[derive(Debug, Clone)]
pub struct UpgradeRequest {
    /// Request path, e.g. `/v1/lobby/abc/ws`.
    pub path: String,
    /// Cookies from the `Cookie` header.
    pub cookies: HashMap<String, String>,
    /// The client address: the first `X-Forwarded-For` hop if present,
    /// otherwise the TCP peer.
    pub remote_addr: String,
}

impl UpgradeRequest {
    /// Looks up a cookie by name.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }
}

/// Why an upgrade was refused. Sent to the client as a plain HTTP
/// response, not as a protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub status: u16,
    pub reason: String,
}

impl Rejection {
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self { status: 401, reason: reason.into() }
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self { status: 404, reason: reason.into() }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self { status: 500, reason: reason.into() }
    }
}

/// Decides whether an upgrade request may proceed.
///
/// [`prepare`](Self::prepare) runs first, asynchronously, once the
/// request head has been read. [`admit`](Self::admit) then runs
/// synchronously inside the handshake, before the `101 Switching
/// Protocols` response is written. On success it returns whatever the
/// caller needs to bind the new socket (for Scrawl: which lobby, which
/// player).
pub trait UpgradeGate: Send + Sync + 'static {
    /// What an admitted request resolves to.
    type Admission: Send + 'static;

    /// Loads whatever `admit` will need to look at. Does nothing unless
    /// overridden.
    fn prepare(&self, _request: &UpgradeRequest) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Admits or rejects the request.
    fn admit(&self, request: &UpgradeRequest) -> Result<Self::Admission, Rejection>;
}

/// Reads the path and the headers the gate cares about from a raw
/// request head. Returns `None` if the request line is malformed; the
/// handshake reports the details.
pub(crate) fn preview_request(head: &[u8], peer: SocketAddr) -> Option<UpgradeRequest> {
    let head = String::from_utf8_lossy(head);
    let mut lines = head.split("\r\n");
    let target = lines.next()?.split_whitespace().nth(1)?;
    let path = target.split('?').next().unwrap_or(target);

    let mut cookies = HashMap::new();
    let mut forwarded_for = None;
    for line in lines.take_while(|line| !line.is_empty()) {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        if name.eq_ignore_ascii_case("cookie") {
            cookies.extend(parse_cookies(value));
        } else if name.eq_ignore_ascii_case("x-forwarded-for") && forwarded_for.is_none() {
            forwarded_for = Some(value.trim().to_string());
        }
    }
    Some(UpgradeRequest {
        path: path.to_string(),
        cookies,
        remote_addr: client_address(forwarded_for.as_deref(), peer),
    })
}

/// Parses a `Cookie` header value (`a=1; b=2`) into a map.
pub(crate) fn parse_cookies(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Picks the client address from `X-Forwarded-For`, falling back to the
/// TCP peer.
pub(crate) fn client_address(forwarded_for: Option<&str>, peer: SocketAddr) -> String {
    forwarded_for
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| peer.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
        assert_eq!(id.into_inner(), 7);
    }

    #[test]
    fn test_parse_cookies_splits_pairs() {
        let cookies = parse_cookies("usersession=abc; theme=dark;broken");
        assert_eq!(cookies.get("usersession").map(String::as_str), Some("abc"));
        assert_eq!(cookies.get("theme").map(String::as_str), Some("dark"));
        assert_eq!(cookies.len(), 2);
    }

    #[test]
    fn test_client_address_prefers_forwarded_for() {
        let peer: SocketAddr = "10.0.0.1:5000".parse().unwrap();
        assert_eq!(client_address(Some("1.2.3.4, 10.0.0.9"), peer), "1.2.3.4");
        assert_eq!(client_address(None, peer), "10.0.0.1");
        assert_eq!(client_address(Some(" "), peer), "10.0.0.1");
    }

    #[test]
    fn test_preview_request_reads_path_cookies_and_forwarded_for() {
        let peer: SocketAddr = "10.0.0.1:5000".parse().unwrap();
        let head = b"GET /v1/lobby/abc/ws?v=2 HTTP/1.1\r\n\
Host: example\r\n\
COOKIE: usersession=s1; theme=dark\r\n\
X-Forwarded-For: 1.2.3.4\r\n\
\r\n";
        let request = preview_request(head, peer).unwrap();
        assert_eq!(request.path, "/v1/lobby/abc/ws");
        assert_eq!(request.cookie("usersession"), Some("s1"));
        assert_eq!(request.remote_addr, "1.2.3.4");
    }

    #[test]
    fn test_preview_request_rejects_garbage() {
        let peer: SocketAddr = "10.0.0.1:5000".parse().unwrap();
        assert!(preview_request(b"\r\n\r\n", peer).is_none());
    }
}
