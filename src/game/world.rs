//! World state and authoritative tick
//!
//! [`World`] owns the player registry. Every mutation (join, leave, input,
//! tick, combat, respawn) goes through its methods, and the game server task
//! calls them one at a time, so the registry is never shared.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::util::time::tick_delta;

use super::combat::{CombatEvent, CombatSystem};
use super::constants::{DEFAULT_NICKNAME, MAX_CHARACTER_ID, MAX_HEALTH, NICKNAME_MAX_CHARS};
use super::input::{sanitize, InputIntent, RawInput};
use super::physics::PhysicsSystem;
use super::respawn::{RespawnQueue, RespawnToken};
use super::PlayerId;

/// Player state (authoritative)
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub id: PlayerId,
    pub nickname: String,
    pub character_id: u8,

    // Position and aim
    pub x: f32,
    pub y: f32,
    pub aim_angle: f32,

    // Combat
    pub health: u8,
    pub alive: bool,
    pub last_shot_ms: Option<u64>,
    /// Live respawn entry, if the player is waiting to respawn
    pub respawn: Option<RespawnToken>,

    // Input tracking
    pub last_input_seq: u32,
    pub intent: InputIntent,

    // Stats
    pub kills: u32,
    pub deaths: u32,
}

impl PlayerState {
    pub fn new(id: PlayerId, nickname: String, character_id: u8, x: f32, y: f32) -> Self {
        Self {
            id,
            nickname,
            character_id,
            x,
            y,
            aim_angle: 0.0,
            health: MAX_HEALTH,
            alive: true,
            last_shot_ms: None,
            respawn: None,
            last_input_seq: 0,
            intent: InputIntent::default(),
            kills: 0,
            deaths: 0,
        }
    }
}

/// Join request fields as received, before validation
#[derive(Debug, Clone, Default)]
pub struct JoinRequest {
    pub nickname: Option<String>,
    pub character_id: Option<f64>,
}

/// Trim, strip control characters and cap the length of a requested name
pub fn sanitize_nickname(requested: Option<&str>) -> String {
    let cleaned: String = requested
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_control())
        .collect();
    let name: String = cleaned.trim().chars().take(NICKNAME_MAX_CHARS).collect();
    let name = name.trim_end();
    if name.is_empty() {
        DEFAULT_NICKNAME.to_string()
    } else {
        name.to_string()
    }
}

/// Integral requests are clamped into the variant range; anything else is 0
pub fn sanitize_character(requested: Option<f64>) -> u8 {
    match requested {
        Some(v) if v.is_finite() && v.fract() == 0.0 => v.clamp(0.0, MAX_CHARACTER_ID as f64) as u8,
        _ => 0,
    }
}

/// The authoritative world
pub struct World {
    players: BTreeMap<PlayerId, PlayerState>,
    respawns: RespawnQueue,
    rng: ChaCha8Rng,
    next_player_id: PlayerId,
    tick: u64,
}

impl World {
    pub fn new(seed: u64) -> Self {
        Self {
            players: BTreeMap::new(),
            respawns: RespawnQueue::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_player_id: 1,
            tick: 0,
        }
    }

    /// World with an unpredictable spawn seed
    pub fn from_entropy() -> Self {
        Self::new(rand::thread_rng().gen())
    }

    /// Create a player at a random spawn point and return its identity
    pub fn join(&mut self, request: &JoinRequest) -> PlayerId {
        let id = self.next_player_id;
        self.next_player_id += 1;

        let nickname = sanitize_nickname(request.nickname.as_deref());
        let character_id = sanitize_character(request.character_id);
        let (x, y) = PhysicsSystem::random_spawn(&mut self.rng);

        info!(player_id = id, nickname = %nickname, character_id, "Player joined");
        self.players
            .insert(id, PlayerState::new(id, nickname, character_id, x, y));
        id
    }

    /// Remove a player. Dropping the state drops its respawn token, which
    /// cancels any pending respawn.
    pub fn remove(&mut self, id: PlayerId) -> Option<PlayerState> {
        let removed = self.players.remove(&id);
        if let Some(player) = &removed {
            info!(
                player_id = id,
                pending_respawn = player.respawn.is_some(),
                "Player left"
            );
        }
        removed
    }

    /// Sanitize and store a player's latest input. Invalid input and unknown
    /// players are ignored. Returns whether the intent was replaced.
    pub fn apply_input(&mut self, id: PlayerId, raw: &RawInput) -> bool {
        let Some(player) = self.players.get_mut(&id) else {
            return false;
        };
        match sanitize(raw, player.alive) {
            Ok(intent) => {
                player.intent = intent;
                player.last_input_seq = intent.seq;
                true
            }
            Err(reason) => {
                debug!(player_id = id, ?reason, "Input dropped");
                false
            }
        }
    }

    /// Run one fixed-delta simulation tick at server time `now_ms`
    pub fn tick(&mut self, now_ms: u64) -> Vec<CombatEvent> {
        self.tick += 1;
        let mut events = self.process_respawns(now_ms);
        let dt = tick_delta();

        let mut shooters = Vec::new();
        for player in self.players.values_mut() {
            if !player.alive {
                continue;
            }

            let intent = player.intent;
            let (x, y) = PhysicsSystem::integrate(player.x, player.y, intent.move_x, intent.move_y, dt);
            debug_assert!(PhysicsSystem::is_in_world(x, y));
            player.x = x;
            player.y = y;
            player.aim_angle = intent.aim_angle;

            if intent.fire {
                shooters.push(player.id);
            }
        }

        for shooter in shooters {
            events.extend(self.resolve_fire(shooter, now_ms));
        }

        events
    }

    /// Resolve one fire request, subject to the shooter's cooldown
    pub fn resolve_fire(&mut self, shooter: PlayerId, now_ms: u64) -> Vec<CombatEvent> {
        CombatSystem::try_fire(&mut self.players, &mut self.respawns, shooter, now_ms)
    }

    /// Fire every respawn that is due and still live
    fn process_respawns(&mut self, now_ms: u64) -> Vec<CombatEvent> {
        let mut events = Vec::new();
        for due in self.respawns.pop_due(now_ms) {
            let Some(player) = self.players.get_mut(&due.player_id) else {
                continue;
            };
            if player.respawn != Some(due.token) {
                continue;
            }

            let (x, y) = PhysicsSystem::random_spawn(&mut self.rng);
            player.x = x;
            player.y = y;
            player.health = MAX_HEALTH;
            player.alive = true;
            player.intent.fire = false;
            player.respawn = None;

            debug!(player_id = player.id, late_ms = now_ms - due.due_ms, "Player respawned");
            events.push(CombatEvent::Respawn { target: player.id });
        }
        events
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerState> {
        self.players.get(&id)
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerState> {
        self.players.values()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    #[cfg(test)]
    pub(crate) fn player_mut(&mut self, id: PlayerId) -> Option<&mut PlayerState> {
        self.players.get_mut(&id)
    }
}
