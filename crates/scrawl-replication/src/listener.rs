//! The incoming side: tasks that turn bus frames back into lobby
//! commands and socket writes.

use std::sync::Arc;

use scrawl_lobby::{ConnectionTable, LobbyError, LobbyHandle};
use scrawl_protocol::{Codec, JsonCodec, LobbyId};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::{Bus, Subscription};
use crate::error::BusError;
use crate::frame::{
    BusFrame, ConnectInfo, FrameKind, JoinReply, JoinRequest, inbound_channel, outbound_channel,
};

/// Subscribes the reference's actor to the lobby's inbound channel.
///
/// Runs until `shutdown` flips, the subscription ends, or the actor is
/// gone. Malformed frames are logged and skipped.
pub async fn spawn_inbound<B: Bus>(
    bus: Arc<B>,
    handle: LobbyHandle,
    shutdown: watch::Receiver<bool>,
) -> Result<JoinHandle<()>, BusError> {
    let subscription = bus.subscribe(&inbound_channel(handle.id())).await?;
    info!(lobby_id = %handle.id(), "serving lobby commands from the bus");
    Ok(tokio::spawn(run_inbound(bus, subscription, handle, shutdown)))
}

async fn run_inbound<B: Bus>(
    bus: Arc<B>,
    mut subscription: Subscription,
    handle: LobbyHandle,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let raw = tokio::select! {
            raw = subscription.next() => raw,
            _ = shutdown.changed() => break,
        };
        let Some(raw) = raw else { break };
        let Some(frame) = read_frame(&raw, handle.id()) else {
            continue;
        };
        if frame.kind == FrameKind::Join {
            answer_join(&*bus, &handle, &frame.data).await;
            continue;
        }
        if let Err(e) = apply(&handle, frame).await {
            if matches!(e, LobbyError::Unavailable(_)) {
                break;
            }
            warn!(lobby_id = %handle.id(), error = %e, "replicated command failed");
        }
    }
    debug!(lobby_id = %handle.id(), "inbound listener stopped");
}

async fn apply(handle: &LobbyHandle, frame: BusFrame) -> Result<(), LobbyError> {
    let BusFrame {
        player_id,
        data,
        kind,
        ..
    } = frame;
    match kind {
        FrameKind::Connect => {
            let info = ConnectInfo::parse(&data);
            handle
                .attach_remote(player_id.clone(), &info.name, &info.session, &info.address)
                .await?;
            handle.notify_connect(player_id, info.token).await
        }
        FrameKind::Disconnect => {
            let socket = data.parse().unwrap_or_default();
            handle.disconnect(player_id, socket).await
        }
        FrameKind::Event => handle.send_event(player_id, data.into_bytes()).await,
        FrameKind::Close | FrameKind::Join => {
            debug!(lobby_id = %handle.id(), player_id = %player_id, kind = ?kind, "ignoring frame on inbound channel");
            Ok(())
        }
    }
}

/// Seats a player on behalf of another process and publishes the outcome
/// on the channel the request names.
async fn answer_join<B: Bus>(bus: &B, handle: &LobbyHandle, data: &str) {
    let request: JoinRequest = match JsonCodec.decode(data.as_bytes()) {
        Ok(request) => request,
        Err(e) => {
            warn!(lobby_id = %handle.id(), error = %e, "malformed join request");
            return;
        }
    };
    let result = handle.join(&request.name, &request.address).await;
    if let Err(e) = &result {
        info!(lobby_id = %handle.id(), error = %e, "remote join refused");
    }
    let reply = JoinReply::from_result(&result);
    let payload = match JsonCodec.encode(&reply) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(lobby_id = %handle.id(), error = %e, "failed to encode join reply");
            return;
        }
    };
    if let Err(e) = bus.publish(&request.reply, payload).await {
        warn!(lobby_id = %handle.id(), channel = %request.reply, error = %e, "failed to answer join");
    }
}

/// Delivers the lobby's outbound frames to the sockets open in this
/// process. Frames for players connected elsewhere are ignored.
pub async fn spawn_outbound<B: Bus>(
    bus: Arc<B>,
    lobby: LobbyId,
    table: ConnectionTable,
    shutdown: watch::Receiver<bool>,
) -> Result<JoinHandle<()>, BusError> {
    let subscription = bus.subscribe(&outbound_channel(&lobby)).await?;
    Ok(tokio::spawn(run_outbound(subscription, lobby, table, shutdown)))
}

async fn run_outbound(
    mut subscription: Subscription,
    lobby: LobbyId,
    table: ConnectionTable,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let raw = tokio::select! {
            raw = subscription.next() => raw,
            _ = shutdown.changed() => break,
        };
        let Some(raw) = raw else { break };
        let Some(frame) = read_frame(&raw, &lobby) else {
            continue;
        };
        let delivered = match frame.kind {
            FrameKind::Close => table.close(&frame.player_id),
            _ => table.send(&frame.player_id, &frame.data),
        };
        if !delivered {
            debug!(lobby_id = %lobby, player_id = %frame.player_id, "player not connected here");
        }
    }
    debug!(lobby_id = %lobby, "outbound listener stopped");
}

fn read_frame(raw: &[u8], lobby: &LobbyId) -> Option<BusFrame> {
    match BusFrame::decode(raw) {
        Ok(frame) if frame.lobby_id == *lobby => Some(frame),
        Ok(frame) => {
            warn!(lobby_id = %lobby, other = %frame.lobby_id, "frame for another lobby on this channel");
            None
        }
        Err(e) => {
            warn!(lobby_id = %lobby, error = %e, "malformed bus frame");
            None
        }
    }
}
