//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::input::RawInput;
use crate::game::server::Frame;
use crate::game::world::JoinRequest;
use crate::game::{GameHandle, PlayerId};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{decode_client, encode, ClientMsg, ServerMsg};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = Uuid::new_v4();
    info!(conn_id = %conn_id, "New WebSocket connection");

    let (ws_sink, mut ws_stream) = socket.split();
    let (direct_tx, direct_rx) = mpsc::channel::<Outbound>(32);
    let writer_handle = tokio::spawn(run_writer(conn_id, ws_sink, direct_rx));

    let mut connection = Connection::new(
        conn_id,
        state.game.clone(),
        direct_tx,
        ConnectionRateLimiter::new(state.config.max_messages_per_second),
    );

    // Reader loop: WebSocket -> game task
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                connection.on_text(&text).await;
            }
            Ok(Message::Binary(_)) => {
                debug!(conn_id = %conn_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(conn_id = %conn_id, "Client initiated close");
                break;
            }
            Err(e) => {
                debug!(conn_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    connection.close().await;
    writer_handle.abort();

    info!(conn_id = %conn_id, "WebSocket connection closed");
}

/// Items for a connection's writer task, delivered in order
#[derive(Debug)]
pub enum Outbound {
    /// Reply to this connection only
    Text(String),
    /// Start forwarding broadcasts; queued right behind `welcome`
    Broadcasts(broadcast::Receiver<Frame>),
}

/// Writer task: direct replies and, once joined, broadcasts -> WebSocket
async fn run_writer(
    conn_id: Uuid,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut direct_rx: mpsc::Receiver<Outbound>,
) {
    let mut broadcast_rx: Option<broadcast::Receiver<Frame>> = None;

    loop {
        let text = tokio::select! {
            outbound = direct_rx.recv() => match outbound {
                Some(Outbound::Text(text)) => text,
                Some(Outbound::Broadcasts(rx)) => {
                    broadcast_rx = Some(rx);
                    continue;
                }
                None => break,
            },
            result = recv_broadcast(&mut broadcast_rx), if broadcast_rx.is_some() => match result {
                Ok(frame) => frame.to_string(),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(conn_id = %conn_id, lagged_count = n, "Client lagged, skipping {} frames", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(conn_id = %conn_id, "Broadcast channel closed");
                    break;
                }
            },
        };

        if let Err(e) = ws_sink.send(Message::Text(text)).await {
            debug!(conn_id = %conn_id, error = %e, "WebSocket send failed");
            break;
        }
    }
}

async fn recv_broadcast(
    rx: &mut Option<broadcast::Receiver<Frame>>,
) -> Result<Frame, broadcast::error::RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Per-connection protocol state: at most one join, and nothing but a join
/// until it has been accepted.
pub struct Connection {
    conn_id: Uuid,
    game: GameHandle,
    outbound: mpsc::Sender<Outbound>,
    rate_limiter: ConnectionRateLimiter,
    player_id: Option<PlayerId>,
}

impl Connection {
    pub fn new(
        conn_id: Uuid,
        game: GameHandle,
        outbound: mpsc::Sender<Outbound>,
        rate_limiter: ConnectionRateLimiter,
    ) -> Self {
        Self {
            conn_id,
            game,
            outbound,
            rate_limiter,
            player_id: None,
        }
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.player_id
    }

    /// Handle one inbound text frame. Anything invalid is dropped.
    pub async fn on_text(&mut self, text: &str) {
        if !self.rate_limiter.check_message() {
            debug!(conn_id = %self.conn_id, "Rate limited message");
            return;
        }

        let envelope = match decode_client(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(conn_id = %self.conn_id, error = %e, "Dropped client message");
                return;
            }
        };

        match (envelope.body, self.player_id) {
            (ClientMsg::Join { nickname, character_id }, None) => {
                self.join(JoinRequest {
                    nickname,
                    character_id,
                })
                .await;
            }
            (ClientMsg::Join { .. }, Some(player_id)) => {
                debug!(conn_id = %self.conn_id, player_id, "Duplicate join ignored");
            }
            (
                ClientMsg::Input {
                    seq,
                    dt,
                    move_x,
                    move_y,
                    aim_angle,
                    shoot,
                    ..
                },
                Some(player_id),
            ) => {
                let input = RawInput {
                    version: envelope.v,
                    seq,
                    dt,
                    move_x,
                    move_y,
                    aim_angle,
                    shoot,
                };
                self.game.send_input(player_id, input);
            }
            (ClientMsg::Ping { client_time }, Some(_)) => {
                self.reply(&ServerMsg::Pong {
                    client_time,
                    server_time: unix_millis(),
                })
                .await;
            }
            (_, None) => {
                debug!(conn_id = %self.conn_id, "Message before join ignored");
            }
            (ClientMsg::Unknown, Some(_)) => {}
        }
    }

    /// Subscribes before joining so no snapshot containing the new player is
    /// missed, but hands the subscription to the writer only after `welcome`.
    async fn join(&mut self, request: JoinRequest) {
        let broadcasts = self.game.subscribe();
        let Some(accepted) = self.game.join(request).await else {
            error!(conn_id = %self.conn_id, "Game loop unavailable, join failed");
            return;
        };

        self.player_id = Some(accepted.player_id);
        info!(conn_id = %self.conn_id, player_id = accepted.player_id, "Connection joined");

        self.reply(&ServerMsg::Welcome {
            player_id: accepted.player_id,
            server_time: accepted.server_time,
        })
        .await;
        let _ = self.outbound.send(Outbound::Broadcasts(broadcasts)).await;
    }

    async fn reply(&self, msg: &ServerMsg) {
        match encode(msg) {
            Ok(text) => {
                let _ = self.outbound.send(Outbound::Text(text)).await;
            }
            Err(e) => warn!(conn_id = %self.conn_id, error = %e, "Failed to encode reply"),
        }
    }

    /// Remove the player, if any; cancels its pending respawn
    pub async fn close(&mut self) {
        if let Some(player_id) = self.player_id.take() {
            self.game.leave(player_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{GameServer, World};
    use crate::ws::protocol::decode_server;
    use std::time::Duration;
    use tokio::time::timeout;

    fn connection() -> (Connection, mpsc::Receiver<Outbound>, GameHandle) {
        let (server, handle) = GameServer::new(World::new(5));
        tokio::spawn(server.run());
        let (tx, rx) = mpsc::channel(32);
        let conn = Connection::new(Uuid::new_v4(), handle.clone(), tx, ConnectionRateLimiter::new(1_000));
        (conn, rx, handle)
    }

    async fn next_outbound(rx: &mut mpsc::Receiver<Outbound>) -> Outbound {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out")
            .expect("closed")
    }

    /// Next direct reply, skipping the broadcast hand-off
    async fn next_reply(rx: &mut mpsc::Receiver<Outbound>) -> ServerMsg {
        loop {
            if let Outbound::Text(text) = next_outbound(rx).await {
                return decode_server(&text).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn join_sends_welcome_once() {
        let (mut conn, mut rx, handle) = connection();

        conn.on_text(r#"{"v":1,"type":"join","nickname":"Ann","characterId":99}"#).await;
        let player_id = match next_reply(&mut rx).await {
            ServerMsg::Welcome { player_id, server_time } => {
                assert!(server_time > 0);
                player_id
            }
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(conn.player_id(), Some(player_id));
        assert!(matches!(next_outbound(&mut rx).await, Outbound::Broadcasts(_)));

        conn.on_text(r#"{"v":1,"type":"join","nickname":"Again"}"#).await;
        tokio_test::assert_err!(rx.try_recv());
        assert_eq!(handle.player_count(), 1);
        assert_eq!(conn.player_id(), Some(player_id));
    }

    #[tokio::test]
    async fn broadcasts_start_after_welcome() {
        let (mut conn, mut rx, _handle) = connection();

        conn.on_text(r#"{"v":1,"type":"join"}"#).await;

        let player_id = match next_outbound(&mut rx).await {
            Outbound::Text(text) => match decode_server(&text).unwrap() {
                ServerMsg::Welcome { player_id, .. } => player_id,
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("welcome must come first, got {other:?}"),
        };
        let mut broadcasts = match next_outbound(&mut rx).await {
            Outbound::Broadcasts(broadcasts) => broadcasts,
            other => panic!("unexpected {other:?}"),
        };

        // the subscription predates the join, so the player shows up in it
        loop {
            let frame = timeout(Duration::from_secs(2), broadcasts.recv())
                .await
                .expect("timed out")
                .expect("broadcast closed");
            if let Ok(ServerMsg::Snapshot(snapshot)) = decode_server(&frame) {
                if snapshot.player(player_id).is_some() {
                    break;
                }
            }
        }
    }

    #[tokio::test]
    async fn ping_before_join_is_ignored() {
        let (mut conn, mut rx, _handle) = connection();

        conn.on_text(r#"{"v":1,"type":"ping","clientTime":5}"#).await;
        tokio_test::assert_err!(rx.try_recv());

        conn.on_text(r#"{"v":1,"type":"join"}"#).await;
        assert!(matches!(next_reply(&mut rx).await, ServerMsg::Welcome { .. }));

        conn.on_text(r#"{"v":1,"type":"ping","clientTime":5.5}"#).await;
        match next_reply(&mut rx).await {
            ServerMsg::Pong { client_time, .. } => assert_eq!(client_time, 5.5),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn garbage_does_not_close_the_session() {
        let (mut conn, mut rx, _handle) = connection();

        conn.on_text("{{{").await;
        conn.on_text(r#"{"v":9,"type":"join"}"#).await;
        conn.on_text(r#"{"v":1,"type":"dance"}"#).await;
        tokio_test::assert_err!(rx.try_recv());
        assert_eq!(conn.player_id(), None);

        conn.on_text(r#"{"v":1,"type":"join"}"#).await;
        assert!(matches!(next_reply(&mut rx).await, ServerMsg::Welcome { .. }));
    }

    #[tokio::test]
    async fn close_removes_player() {
        let (mut conn, mut rx, handle) = connection();
        conn.on_text(r#"{"v":1,"type":"join"}"#).await;
        next_reply(&mut rx).await;
        assert_eq!(handle.player_count(), 1);

        conn.close().await;
        // leave is queued behind nothing else; give the game task a moment
        for _ in 0..50 {
            if handle.player_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(handle.player_count(), 0);
        assert_eq!(conn.player_id(), None);
    }
}
