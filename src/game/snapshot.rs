//! Snapshot building

use serde::{Deserialize, Serialize};

use crate::ws::protocol::PlayerSnapshot;

use super::world::World;

/// Immutable copy of every player at one server timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Simulation tick the state was taken after
    pub tick: u64,
    /// Server wall clock (Unix millis); the client's interpolation timeline
    pub server_time: u64,
    pub players: Vec<PlayerSnapshot>,
    /// Hitscan weapons leave nothing in flight; kept for wire compatibility
    #[serde(default)]
    pub projectiles: Vec<serde_json::Value>,
}

impl Snapshot {
    pub fn player(&self, id: super::PlayerId) -> Option<&PlayerSnapshot> {
        self.players.iter().find(|p| p.id == id)
    }
}

/// Builds snapshots for network transmission
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    /// Copy the full registry. No per-client culling: every client gets the same snapshot.
    pub fn build(world: &World, server_time: u64) -> Snapshot {
        let players = world
            .players()
            .map(|p| PlayerSnapshot {
                id: p.id,
                nickname: p.nickname.clone(),
                character_id: p.character_id,
                x: p.x,
                y: p.y,
                aim_angle: p.aim_angle,
                hp: p.health,
                kills: p.kills,
                deaths: p.deaths,
                alive: p.alive,
                last_input_seq: p.last_input_seq,
            })
            .collect();

        Snapshot {
            tick: world.current_tick(),
            server_time,
            players,
            projectiles: Vec::new(),
        }
    }
}

/// Snapshot size stats for debugging
#[derive(Debug, Default)]
pub struct SnapshotStats {
    pub total_snapshots: u64,
    pub total_bytes: u64,
    pub avg_players_per_snapshot: f32,
}

impl SnapshotStats {
    pub fn record(&mut self, player_count: usize, bytes: usize) {
        self.total_snapshots += 1;
        self.total_bytes += bytes as u64;

        // Running average
        let n = self.total_snapshots as f32;
        self.avg_players_per_snapshot =
            self.avg_players_per_snapshot * ((n - 1.0) / n) + (player_count as f32 / n);
    }

    pub fn avg_bytes(&self) -> u64 {
        self.total_bytes.checked_div(self.total_snapshots).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::world::JoinRequest;
    use crate::ws::protocol::{decode_server, encode, ServerMsg};

    #[test]
    fn snapshot_copies_registry() {
        let mut world = World::new(4);
        let a = world.join(&JoinRequest {
            nickname: Some("a".into()),
            character_id: Some(2.0),
        });
        world.join(&JoinRequest::default());
        world.tick(0);

        let snapshot = SnapshotBuilder::build(&world, 12_345);

        assert_eq!(snapshot.tick, 1);
        assert_eq!(snapshot.server_time, 12_345);
        assert_eq!(snapshot.players.len(), 2);
        let first = snapshot.player(a).unwrap();
        let state = world.player(a).unwrap();
        assert_eq!((first.x, first.y), (state.x, state.y));
        assert_eq!(first.character_id, 2);
        assert_eq!(first.hp, 100);
        assert!(first.alive);
    }

    #[test]
    fn snapshot_wire_shape() {
        let mut world = World::new(4);
        world.join(&JoinRequest::default());
        let snapshot = SnapshotBuilder::build(&world, 99);

        let text = encode(&ServerMsg::Snapshot(snapshot.clone())).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "snapshot");
        assert_eq!(value["serverTime"], 99);
        assert_eq!(value["projectiles"], serde_json::json!([]));
        let player = &value["players"][0];
        for key in ["id", "nickname", "characterId", "x", "y", "aimAngle", "hp", "kills", "deaths", "alive"] {
            assert!(player.get(key).is_some(), "missing {key}");
        }

        match decode_server(&text).unwrap() {
            ServerMsg::Snapshot(decoded) => assert_eq!(decoded, snapshot),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn stats_running_average() {
        let mut stats = SnapshotStats::default();
        stats.record(2, 100);
        stats.record(4, 300);
        assert_eq!(stats.total_snapshots, 2);
        assert_eq!(stats.avg_bytes(), 200);
        assert!((stats.avg_players_per_snapshot - 3.0).abs() < 1e-6);
    }
}
