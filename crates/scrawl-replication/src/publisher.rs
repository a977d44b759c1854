//! The outgoing side: one publisher task per process, and the two
//! adapters that feed it.

use std::sync::Arc;

use scrawl_lobby::Dispatch;
use scrawl_protocol::{LobbyId, PlayerId};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::bus::Bus;
use crate::error::BusError;
use crate::frame::{BusFrame, ConnectInfo, FrameKind, inbound_channel, outbound_channel};

/// Publishes on behalf of every lobby in the process.
///
/// `publish` only queues, so callers that must not block (the lobby
/// actor's dispatch) can use it. A single task drains the queue, which
/// keeps frames in the order they were queued. Failed publishes are
/// logged and dropped.
#[derive(Clone)]
pub struct Publisher {
    queue: mpsc::UnboundedSender<(String, Vec<u8>)>,
}

impl Publisher {
    /// Starts the publishing task. It stops when every clone of the
    /// returned publisher is dropped.
    pub fn spawn<B: Bus>(bus: Arc<B>) -> Self {
        let (queue, mut pending) = mpsc::unbounded_channel::<(String, Vec<u8>)>();
        tokio::spawn(async move {
            while let Some((channel, payload)) = pending.recv().await {
                if let Err(e) = bus.publish(&channel, payload).await {
                    error!(channel = %channel, error = %e, "bus publish failed, frame lost");
                }
            }
            debug!("bus publisher stopped");
        });
        Self { queue }
    }

    pub fn publish(&self, channel: String, payload: Vec<u8>) -> Result<(), BusError> {
        self.queue
            .send((channel, payload))
            .map_err(|_| BusError::Closed)
    }

    fn publish_frame(&self, channel: String, frame: &BusFrame) -> Result<(), BusError> {
        self.publish(channel, frame.encode()?)
    }
}

/// The reference's [`Dispatch`]: everything the actor sends goes out on
/// the lobby's outbound channel.
pub struct BusDispatch {
    lobby: LobbyId,
    channel: String,
    publisher: Publisher,
}

impl BusDispatch {
    pub fn new(lobby: LobbyId, publisher: Publisher) -> Self {
        Self {
            channel: outbound_channel(&lobby),
            lobby,
            publisher,
        }
    }

    fn send(&self, frame: BusFrame) {
        if let Err(e) = self.publisher.publish_frame(self.channel.clone(), &frame) {
            error!(lobby_id = %self.lobby, player_id = %frame.player_id, error = %e, "failed to queue outbound frame");
        }
    }
}

impl Dispatch for BusDispatch {
    fn deliver(&self, player: &PlayerId, frame: &str) {
        self.send(BusFrame::event(self.lobby.clone(), player.clone(), frame));
    }

    fn close(&self, player: &PlayerId) {
        self.send(BusFrame::signal(
            self.lobby.clone(),
            player.clone(),
            FrameKind::Close,
        ));
    }
}

/// Forwards a socket's commands to the reference over the inbound
/// channel. Used by every process when replication is on.
#[derive(Clone)]
pub struct BusIngress {
    lobby: LobbyId,
    channel: String,
    publisher: Publisher,
}

impl BusIngress {
    pub fn new(lobby: LobbyId, publisher: Publisher) -> Self {
        Self {
            channel: inbound_channel(&lobby),
            lobby,
            publisher,
        }
    }

    pub fn lobby_id(&self) -> &LobbyId {
        &self.lobby
    }

    pub fn connect(&self, player: PlayerId, info: &ConnectInfo) -> Result<(), BusError> {
        let frame = BusFrame {
            lobby_id: self.lobby.clone(),
            player_id: player,
            data: info.to_data()?,
            kind: FrameKind::Connect,
        };
        self.publisher.publish_frame(self.channel.clone(), &frame)
    }

    /// Reports that the socket holding `socket`'s slot closed.
    pub fn disconnect(&self, player: PlayerId, socket: u64) -> Result<(), BusError> {
        let frame = BusFrame {
            lobby_id: self.lobby.clone(),
            player_id: player,
            data: socket.to_string(),
            kind: FrameKind::Disconnect,
        };
        self.publisher.publish_frame(self.channel.clone(), &frame)
    }

    /// Forwards a raw player frame. Non-UTF-8 input is replaced lossily;
    /// the lobby rejects it as undecodable either way.
    pub fn event(&self, player: PlayerId, raw: &[u8]) -> Result<(), BusError> {
        let frame = BusFrame::event(
            self.lobby.clone(),
            player,
            String::from_utf8_lossy(raw).into_owned(),
        );
        self.publisher.publish_frame(self.channel.clone(), &frame)
    }
}
