//! Per-connection handler: upgrade, connect, and frame pumping.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Upgrade through the registry's gate → lobby and player
//!   2. Register an outbound queue and start the writer task
//!   3. Announce the player to the lobby (locally or over the bus)
//!   4. Loop: receive frames → hand them to the lobby untouched

use std::sync::Arc;

use scrawl_lobby::Outbound;
use scrawl_protocol::{LobbyId, PlayerId};
use scrawl_transport::{IncomingConnection, WebSocketWriter};
use tokio::sync::mpsc;

use crate::registry::{Admitted, Ingress, LobbyRegistry};
use crate::ScrawlError;

/// Drop guard that frees the player's socket slot and tells the lobby
/// they left when the handler exits.
///
/// Runs on every exit path, panics included. Since `Drop` is
/// synchronous, the disconnect is sent from a fire-and-forget task. It
/// names the socket's slot token, so the lobby ignores it if the player
/// has reconnected by the time it arrives.
struct ConnectionGuard {
    registry: Arc<LobbyRegistry>,
    ingress: Ingress,
    lobby: LobbyId,
    player: PlayerId,
    token: u64,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        // A kick or a newer socket already took the slot; the lobby knows.
        if !self.registry.connections().unregister(&self.player, self.token) {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let ingress = self.ingress.clone();
        let lobby = self.lobby.clone();
        let player = self.player.clone();
        let token = self.token;
        runtime.spawn(async move {
            if let Err(e) = ingress.disconnect(player.clone(), token).await {
                tracing::debug!(lobby_id = %lobby, player_id = %player, error = %e, "disconnect not delivered");
            }
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    incoming: IncomingConnection,
    registry: Arc<LobbyRegistry>,
) -> Result<(), ScrawlError> {
    let peer = incoming.peer();
    let (mut reader, writer, admitted) = incoming.upgrade(&*registry).await?;
    let conn_id = reader.id();
    let Admitted { lobby, player, .. } = admitted.clone();

    let Some(ingress) = registry.ingress(&lobby) else {
        // Evicted between the gate and here.
        let _ = writer.close().await;
        return Err(ScrawlError::NotFound(lobby));
    };
    tracing::debug!(%conn_id, %peer, lobby_id = %lobby, player_id = %player, "socket admitted");

    let (token, outbound) = registry.connections().register(player.clone());
    let mut writer_task = tokio::spawn(write_loop(writer.clone(), outbound, player.clone()));
    let _guard = ConnectionGuard {
        registry: Arc::clone(&registry),
        ingress: ingress.clone(),
        lobby: lobby.clone(),
        player: player.clone(),
        token,
    };

    let info = registry.connect_info(&admitted, token);
    if let Err(e) = ingress.connect(player.clone(), &info).await {
        tracing::warn!(lobby_id = %lobby, player_id = %player, error = %e, "connect refused");
        let _ = writer.close().await;
        return Err(e);
    }
    tracing::info!(lobby_id = %lobby, player_id = %player, "player connected");

    loop {
        let frame = tokio::select! {
            frame = reader.recv() => frame,
            _ = &mut writer_task => {
                tracing::debug!(player_id = %player, "writer stopped, closing connection");
                break;
            }
        };

        match frame {
            Ok(Some(data)) => {
                if let Err(e) = ingress.event(player.clone(), data).await {
                    tracing::warn!(lobby_id = %lobby, player_id = %player, error = %e, "lobby unreachable");
                    break;
                }
            }
            Ok(None) => {
                tracing::info!(lobby_id = %lobby, player_id = %player, "connection closed cleanly");
                break;
            }
            Err(e) if e.is_fatal() => {
                tracing::info!(lobby_id = %lobby, player_id = %player, error = %e, "connection lost");
                break;
            }
            Err(e) => {
                tracing::warn!(player_id = %player, error = %e, "read failed, still listening");
            }
        }
    }

    // _guard drops here → slot freed, disconnect sent.
    Ok(())
}

/// Drains a player's outbound queue onto their socket.
async fn write_loop(
    writer: WebSocketWriter,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    player: PlayerId,
) {
    while let Some(message) = outbound.recv().await {
        match message {
            Outbound::Frame(text) => {
                if let Err(e) = writer.send_text(text).await {
                    tracing::debug!(player_id = %player, error = %e, "write failed");
                    return;
                }
            }
            Outbound::Close => break,
        }
    }
    let _ = writer.close().await;
}
