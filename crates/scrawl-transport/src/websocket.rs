//! WebSocket transport implementation using `tokio-tungstenite`.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::{
    ConnectionId, Rejection, TransportError, UpgradeGate, UpgradeRequest, client_address,
    parse_cookies, preview_request,
};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Largest request head accepted before the handshake gives up.
const MAX_REQUEST_HEAD: usize = 16 * 1024;

type WsStream = WebSocketStream<Replay<TcpStream>>;

/// A TCP listener that produces not-yet-upgraded connections.
pub struct WebSocketTransport {
    listener: TcpListener,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self { listener })
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for the next TCP connection.
    ///
    /// The upgrade is NOT performed here, so a slow client cannot stall
    /// the accept loop; call [`IncomingConnection::upgrade`] from a
    /// spawned task.
    pub async fn accept(&self) -> Result<IncomingConnection, TransportError> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        Ok(IncomingConnection { stream, peer })
    }
}

/// A TCP connection waiting for its WebSocket upgrade.
pub struct IncomingConnection {
    stream: TcpStream,
    peer: SocketAddr,
}

impl IncomingConnection {
    /// The TCP peer address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Runs the WebSocket handshake, asking `gate` whether to admit it.
    ///
    /// The request head is read up front so the gate can
    /// [`prepare`](UpgradeGate::prepare) asynchronously, then replayed
    /// into the handshake. A rejection is answered with a plain HTTP response carrying the
    /// gate's status code and reason, and surfaces here as
    /// [`TransportError::Rejected`].
    pub async fn upgrade<G: UpgradeGate>(
        self,
        gate: &G,
    ) -> Result<(WebSocketReader, WebSocketWriter, G::Admission), TransportError> {
        let peer = self.peer;
        let mut stream = self.stream;
        let head = read_head(&mut stream).await?;
        if let Some(request) = preview_request(&head, peer) {
            gate.prepare(&request).await;
        }

        let mut verdict: Option<Result<G::Admission, Rejection>> = None;

        let callback = |request: &Request, response: Response| {
            let upgrade = describe(request, peer);
            match gate.admit(&upgrade) {
                Ok(admission) => {
                    verdict = Some(Ok(admission));
                    Ok(response)
                }
                Err(rejection) => {
                    let error = error_response(&rejection);
                    verdict = Some(Err(rejection));
                    Err(error)
                }
            }
        };

        let handshake = tokio_tungstenite::accept_hdr_async(Replay::new(head, stream), callback).await;

        let admission = match verdict {
            Some(Ok(admission)) => admission,
            Some(Err(rejection)) => {
                tracing::debug!(%peer, status = rejection.status, reason = %rejection.reason, "upgrade rejected");
                return Err(TransportError::Rejected {
                    status: rejection.status,
                    reason: rejection.reason,
                });
            }
            None => {
                let reason = match handshake {
                    Err(e) => e.to_string(),
                    Ok(_) => "handshake finished without consulting the gate".to_string(),
                };
                return Err(TransportError::Handshake(reason));
            }
        };

        let ws = handshake.map_err(|e| TransportError::Handshake(e.to_string()))?;

        let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%id, %peer, "accepted WebSocket connection");

        let (sink, stream) = ws.split();
        Ok((
            WebSocketReader { id, stream },
            WebSocketWriter {
                id,
                sink: Arc::new(Mutex::new(sink)),
            },
            admission,
        ))
    }
}

/// Reads from `stream` until the end of the HTTP request head.
async fn read_head(stream: &mut TcpStream) -> Result<Vec<u8>, TransportError> {
    let mut head = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| TransportError::Handshake(e.to_string()))?;
        if n == 0 {
            return Err(TransportError::Handshake(
                "connection closed before the request head was complete".into(),
            ));
        }
        head.extend_from_slice(&chunk[..n]);
        if head.windows(4).any(|window| window == b"\r\n\r\n") {
            return Ok(head);
        }
        if head.len() > MAX_REQUEST_HEAD {
            return Err(TransportError::Handshake("request head too large".into()));
        }
    }
}

/// A stream that yields already-read bytes before reading on.
struct Replay<S> {
    buffered: Vec<u8>,
    pos: usize,
    inner: S,
}

impl<S> Replay<S> {
    fn new(buffered: Vec<u8>, inner: S) -> Self {
        Self {
            buffered,
            pos: 0,
            inner,
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for Replay<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.pos < this.buffered.len() {
            let n = (this.buffered.len() - this.pos).min(buf.remaining());
            buf.put_slice(&this.buffered[this.pos..this.pos + n]);
            this.pos += n;
            if this.pos == this.buffered.len() {
                this.buffered = Vec::new();
                this.pos = 0;
            }
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Replay<S> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

fn describe(request: &Request, peer: SocketAddr) -> UpgradeRequest {
    let header = |name: &str| {
        request
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
    };
    UpgradeRequest {
        path: request.uri().path().to_string(),
        cookies: header("cookie").map(parse_cookies).unwrap_or_default(),
        remote_addr: client_address(header("x-forwarded-for"), peer),
    }
}

fn error_response(rejection: &Rejection) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(rejection.reason.clone()));
    *response.status_mut() =
        StatusCode::from_u16(rejection.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    response
}

/// The reading half of a connection. Only the connection's reader task
/// holds it, so reads need no lock.
pub struct WebSocketReader {
    id: ConnectionId,
    stream: SplitStream<WsStream>,
}

impl WebSocketReader {
    /// Returns the unique identifier for this connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Receives the next data frame.
    ///
    /// Returns `Ok(None)` when the peer closed cleanly. Close-style
    /// failures come back as [`TransportError::ConnectionClosed`]; anything
    /// else as [`TransportError::ReceiveFailed`], after which the caller
    /// may keep reading.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text.as_str().as_bytes().to_vec())),
                Some(Ok(Message::Binary(data))) => return Ok(Some(data.to_vec())),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/raw frames
                Some(Err(e)) => return Err(classify(e)),
            }
        }
    }
}

/// Sorts read errors into "the socket is gone" and "something odd
/// happened, keep going".
fn classify(error: tungstenite::Error) -> TransportError {
    use std::io::ErrorKind;
    use tungstenite::error::ProtocolError;

    match error {
        tungstenite::Error::ConnectionClosed => {
            TransportError::ConnectionClosed("closed".into())
        }
        tungstenite::Error::AlreadyClosed => {
            TransportError::ConnectionClosed("use of closed connection".into())
        }
        tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            TransportError::ConnectionClosed("abnormal closure".into())
        }
        tungstenite::Error::Io(e)
            if matches!(
                e.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof
            ) =>
        {
            TransportError::ConnectionClosed(e.to_string())
        }
        other => TransportError::ReceiveFailed(std::io::Error::other(other)),
    }
}

fn send_failed(error: tungstenite::Error) -> TransportError {
    TransportError::SendFailed(std::io::Error::other(error))
}

/// The writing half of a connection.
///
/// Clones share one sink behind a `tokio::sync::Mutex`: that mutex is the
/// connection's write guard. Holding it never involves the lobby.
#[derive(Clone)]
pub struct WebSocketWriter {
    id: ConnectionId,
    sink: Arc<Mutex<SplitSink<WsStream, Message>>>,
}

impl WebSocketWriter {
    /// Returns the unique identifier for this connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Sends a text frame.
    pub async fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.sink
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(send_failed)
    }

    /// Sends a close frame.
    pub async fn close(&self) -> Result<(), TransportError> {
        self.sink
            .lock()
            .await
            .close()
            .await
            .map_err(send_failed)
    }
}
