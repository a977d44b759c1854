//! Asking the reference for a seat.

use std::time::Duration;

use scrawl_protocol::{Codec, JsonCodec, LobbyId, PlayerId, generate_token};
use tracing::debug;

use crate::bus::Bus;
use crate::error::BusError;
use crate::frame::{
    BusFrame, FrameKind, JoinReply, JoinRequest, inbound_channel, join_reply_channel,
};

/// Sends a join request for `lobby` and waits up to `wait` for the
/// reference's answer.
///
/// The reply channel is subscribed before the request goes out, so the
/// answer cannot be missed.
pub async fn request_join<B: Bus>(
    bus: &B,
    lobby: &LobbyId,
    name: &str,
    address: &str,
    wait: Duration,
) -> Result<JoinReply, BusError> {
    let reply = join_reply_channel(lobby, &generate_token());
    let mut answers = bus.subscribe(&reply).await?;
    let request = JoinRequest {
        name: name.to_string(),
        address: address.to_string(),
        reply: reply.clone(),
    };
    let frame = BusFrame {
        lobby_id: lobby.clone(),
        player_id: PlayerId::from(""),
        data: JsonCodec.encode_text(&request)?,
        kind: FrameKind::Join,
    };
    bus.publish(&inbound_channel(lobby), frame.encode()?).await?;
    debug!(lobby_id = %lobby, channel = %reply, "join request sent");

    let answer = tokio::time::timeout(wait, answers.next())
        .await
        .map_err(|_| BusError::Timeout(reply.clone()))?
        .ok_or(BusError::Closed)?;
    Ok(JsonCodec.decode(&answer)?)
}
