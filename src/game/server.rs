//! Game server task
//!
//! One task owns the [`World`]. Joins, inputs, leaves, simulation ticks,
//! snapshot broadcasts and respawns all run on it one event at a time, so
//! the registry needs no lock.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::util::time::{snapshot_interval, tick_duration, unix_millis};
use crate::ws::protocol::{encode, GameEvent, ServerMsg};

use super::combat::CombatEvent;
use super::input::RawInput;
use super::snapshot::{SnapshotBuilder, SnapshotStats};
use super::world::{JoinRequest, World};
use super::PlayerId;

/// Encoded frame shared by every subscriber
pub type Frame = Arc<str>;

/// Commands sent from connections to the game task
#[derive(Debug)]
pub enum GameCommand {
    Join {
        request: JoinRequest,
        reply: oneshot::Sender<JoinAccepted>,
    },
    Input {
        player_id: PlayerId,
        input: RawInput,
    },
    Leave {
        player_id: PlayerId,
    },
}

/// Reply to a successful join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinAccepted {
    pub player_id: PlayerId,
    pub server_time: u64,
}

/// Counters readable outside the game task
#[derive(Debug, Default)]
pub struct ServerStats {
    player_count: AtomicUsize,
    tick: AtomicU64,
}

/// Handle to the running game task
#[derive(Clone)]
pub struct GameHandle {
    command_tx: mpsc::Sender<GameCommand>,
    broadcast_tx: broadcast::Sender<Frame>,
    stats: Arc<ServerStats>,
}

impl GameHandle {
    /// Register a new player. `None` if the game task is gone.
    pub async fn join(&self, request: JoinRequest) -> Option<JoinAccepted> {
        let (reply, accepted) = oneshot::channel();
        self.command_tx
            .send(GameCommand::Join { request, reply })
            .await
            .ok()?;
        accepted.await.ok()
    }

    /// Forward an input without waiting. A full queue drops the input; the
    /// player's previous intent stays in effect.
    pub fn send_input(&self, player_id: PlayerId, input: RawInput) -> bool {
        match self.command_tx.try_send(GameCommand::Input { player_id, input }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(player_id, "Command queue full, input dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub async fn leave(&self, player_id: PlayerId) {
        let _ = self.command_tx.send(GameCommand::Leave { player_id }).await;
    }

    /// Subscribe to snapshots and combat events
    pub fn subscribe(&self) -> broadcast::Receiver<Frame> {
        self.broadcast_tx.subscribe()
    }

    pub fn player_count(&self) -> usize {
        self.stats.player_count.load(Ordering::Relaxed)
    }

    pub fn current_tick(&self) -> u64 {
        self.stats.tick.load(Ordering::Relaxed)
    }
}

/// The authoritative game server
pub struct GameServer {
    world: World,
    command_rx: mpsc::Receiver<GameCommand>,
    broadcast_tx: broadcast::Sender<Frame>,
    stats: Arc<ServerStats>,
    snapshot_stats: SnapshotStats,
}

impl GameServer {
    pub fn new(world: World) -> (Self, GameHandle) {
        let (command_tx, command_rx) = mpsc::channel(1024);
        let (broadcast_tx, _) = broadcast::channel(64);
        let stats = Arc::new(ServerStats::default());

        let handle = GameHandle {
            command_tx,
            broadcast_tx: broadcast_tx.clone(),
            stats: stats.clone(),
        };

        let server = Self {
            world,
            command_rx,
            broadcast_tx,
            stats,
            snapshot_stats: SnapshotStats::default(),
        };

        (server, handle)
    }

    /// Run until every [`GameHandle`] is dropped
    pub async fn run(mut self) {
        info!("Game loop started");

        let mut ticks = interval(tick_duration());
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut snapshots = interval(snapshot_interval());
        snapshots.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticks.tick() => {
                    self.run_tick(unix_millis());
                }
                _ = snapshots.tick() => {
                    self.publish_snapshot(unix_millis());
                }
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
            }
        }

        info!(
            snapshots = self.snapshot_stats.total_snapshots,
            avg_bytes = self.snapshot_stats.avg_bytes(),
            "Game loop stopped"
        );
    }

    fn handle_command(&mut self, command: GameCommand) {
        match command {
            GameCommand::Join { request, reply } => {
                let player_id = self.world.join(&request);
                self.sync_player_count();
                let accepted = JoinAccepted {
                    player_id,
                    server_time: unix_millis(),
                };
                if reply.send(accepted).is_err() {
                    // connection closed while joining
                    self.world.remove(player_id);
                    self.sync_player_count();
                }
            }
            GameCommand::Input { player_id, input } => {
                self.world.apply_input(player_id, &input);
            }
            GameCommand::Leave { player_id } => {
                self.world.remove(player_id);
                self.sync_player_count();
            }
        }
    }

    fn sync_player_count(&self) {
        self.stats
            .player_count
            .store(self.world.player_count(), Ordering::Relaxed);
    }

    fn run_tick(&mut self, now_ms: u64) {
        let events = self.world.tick(now_ms);
        self.stats
            .tick
            .store(self.world.current_tick(), Ordering::Relaxed);

        for event in events {
            self.broadcast(&ServerMsg::Event(event.into()));
        }
    }

    fn publish_snapshot(&mut self, now_ms: u64) {
        let snapshot = SnapshotBuilder::build(&self.world, now_ms);
        let player_count = snapshot.players.len();
        if let Some(bytes) = self.broadcast(&ServerMsg::Snapshot(snapshot)) {
            self.snapshot_stats.record(player_count, bytes);
        }
    }

    /// Encode once and fan out. Returns the encoded size.
    fn broadcast(&self, msg: &ServerMsg) -> Option<usize> {
        let text = match encode(msg) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to encode broadcast");
                return None;
            }
        };
        let bytes = text.len();
        // No receivers is not an error: nobody is connected yet
        let _ = self.broadcast_tx.send(Frame::from(text));
        Some(bytes)
    }
}

impl From<CombatEvent> for GameEvent {
    fn from(event: CombatEvent) -> Self {
        match event {
            CombatEvent::Hit {
                attacker,
                target,
                remaining_hp,
            } => GameEvent::Hit {
                attacker_id: attacker,
                target_id: target,
                hp: remaining_hp,
            },
            CombatEvent::Death { attacker, target } => GameEvent::Death {
                attacker_id: attacker,
                target_id: target,
            },
            CombatEvent::Respawn { target } => GameEvent::Respawn { target_id: target },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::PROTOCOL_VERSION;
    use crate::ws::protocol::decode_server;
    use std::time::Duration;
    use tokio::time::timeout;

    fn spawn_server() -> GameHandle {
        let (server, handle) = GameServer::new(World::new(11));
        tokio::spawn(server.run());
        handle
    }

    async fn next_snapshot(rx: &mut broadcast::Receiver<Frame>) -> crate::game::snapshot::Snapshot {
        loop {
            let frame = timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("timed out waiting for snapshot")
                .expect("broadcast closed");
            if let Ok(ServerMsg::Snapshot(snapshot)) = decode_server(&frame) {
                return snapshot;
            }
        }
    }

    #[tokio::test]
    async fn join_returns_increasing_ids() {
        let handle = spawn_server();
        let before = crate::util::time::unix_millis();

        let first = handle.join(JoinRequest::default()).await.unwrap();
        let second = handle.join(JoinRequest::default()).await.unwrap();

        assert!(second.player_id > first.player_id);
        assert!(first.server_time >= before);
        assert_eq!(handle.player_count(), 2);
    }

    #[tokio::test]
    async fn snapshots_reflect_joins_and_leaves() {
        let handle = spawn_server();
        let mut rx = handle.subscribe();

        let joined = handle.join(JoinRequest::default()).await.unwrap();
        let snapshot = loop {
            let snapshot = next_snapshot(&mut rx).await;
            if snapshot.player(joined.player_id).is_some() {
                break snapshot;
            }
        };
        assert_eq!(snapshot.players.len(), 1);

        handle.leave(joined.player_id).await;
        let snapshot = loop {
            let snapshot = next_snapshot(&mut rx).await;
            if snapshot.players.is_empty() {
                break snapshot;
            }
        };
        assert!(snapshot.player(joined.player_id).is_none());
        assert_eq!(handle.player_count(), 0);
    }

    #[tokio::test]
    async fn inputs_move_the_player() {
        let handle = spawn_server();
        let mut rx = handle.subscribe();
        let joined = handle.join(JoinRequest::default()).await.unwrap();

        let start = loop {
            let snapshot = next_snapshot(&mut rx).await;
            if let Some(p) = snapshot.player(joined.player_id) {
                break p.x;
            }
        };

        assert!(handle.send_input(
            joined.player_id,
            RawInput {
                version: PROTOCOL_VERSION,
                seq: 1,
                dt: 0.016,
                move_x: -1.0,
                move_y: 0.0,
                aim_angle: 0.0,
                shoot: false,
            },
        ));

        let moved = loop {
            let snapshot = next_snapshot(&mut rx).await;
            let p = snapshot.player(joined.player_id).unwrap();
            if p.x < start {
                break p.clone();
            }
        };
        assert_eq!(moved.last_input_seq, 1);
        assert!(handle.current_tick() > 0);
    }

    #[test]
    fn combat_events_map_to_wire_events() {
        let event: GameEvent = CombatEvent::Hit {
            attacker: 1,
            target: 2,
            remaining_hp: 50,
        }
        .into();
        assert_eq!(
            event,
            GameEvent::Hit {
                attacker_id: 1,
                target_id: 2,
                hp: 50
            }
        );
        let event: GameEvent = CombatEvent::Respawn { target: 3 }.into();
        assert_eq!(event, GameEvent::Respawn { target_id: 3 });
    }
}
