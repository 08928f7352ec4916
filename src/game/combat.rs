//! Combat system - hitscan, damage, death

use std::collections::BTreeMap;

use tracing::{debug, info};

use super::constants::{BEAM_HALF_WIDTH, DAMAGE_PER_HIT, FIRE_COOLDOWN_MS, HIT_RANGE, RESPAWN_DELAY_MS};
use super::respawn::RespawnQueue;
use super::world::PlayerState;
use super::PlayerId;

/// Combat notification broadcast to clients for visual/audio cues.
/// The resulting state is already part of the next snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombatEvent {
    Hit {
        attacker: PlayerId,
        target: PlayerId,
        remaining_hp: u8,
    },
    Death {
        attacker: PlayerId,
        target: PlayerId,
    },
    Respawn {
        target: PlayerId,
    },
}

/// Candidate considered by the hit test
#[derive(Debug, Clone, Copy)]
pub struct HitCandidate {
    pub id: PlayerId,
    pub x: f32,
    pub y: f32,
}

/// Combat system for cooldowns, hit detection and damage
pub struct CombatSystem;

impl CombatSystem {
    /// Check if a player can fire (cooldown check)
    pub fn can_fire(last_shot_ms: Option<u64>, now_ms: u64) -> bool {
        match last_shot_ms {
            Some(last) => now_ms.saturating_sub(last) >= FIRE_COOLDOWN_MS,
            None => true,
        }
    }

    /// Hitscan along the aim ray from (`x`, `y`).
    ///
    /// Candidates behind the shooter, beyond `HIT_RANGE`, or further than
    /// `BEAM_HALF_WIDTH` from the ray are discarded. The closest remaining
    /// candidate wins; equal distances go to the first candidate given.
    pub fn hitscan<I>(x: f32, y: f32, aim_angle: f32, candidates: I) -> Option<PlayerId>
    where
        I: IntoIterator<Item = HitCandidate>,
    {
        let (dir_x, dir_y) = (aim_angle.cos(), aim_angle.sin());
        let range_sq = HIT_RANGE * HIT_RANGE;

        let mut closest: Option<(PlayerId, f32)> = None;
        for candidate in candidates {
            let to_x = candidate.x - x;
            let to_y = candidate.y - y;

            let forward = to_x * dir_x + to_y * dir_y;
            if forward <= 0.0 {
                continue;
            }

            let dist_sq = to_x * to_x + to_y * to_y;
            if dist_sq > range_sq {
                continue;
            }

            let perpendicular = (to_x * dir_y - to_y * dir_x).abs();
            if perpendicular > BEAM_HALF_WIDTH {
                continue;
            }

            if closest.map_or(true, |(_, best)| dist_sq < best) {
                closest = Some((candidate.id, dist_sq));
            }
        }

        closest.map(|(id, _)| id)
    }

    /// Apply damage to health, returns (new_health, is_dead)
    pub fn apply_damage(current_health: u8, damage: u8) -> (u8, bool) {
        let new_health = current_health.saturating_sub(damage);
        (new_health, new_health == 0)
    }

    /// Resolve a fire request of `shooter_id` at server time `now_ms`.
    ///
    /// A request inside the cooldown is dropped. Otherwise the cooldown
    /// restarts whether or not anything is hit.
    pub fn try_fire(
        players: &mut BTreeMap<PlayerId, PlayerState>,
        respawns: &mut RespawnQueue,
        shooter_id: PlayerId,
        now_ms: u64,
    ) -> Vec<CombatEvent> {
        let (x, y, aim_angle) = match players.get_mut(&shooter_id) {
            Some(shooter) if shooter.alive => {
                if !Self::can_fire(shooter.last_shot_ms, now_ms) {
                    return Vec::new();
                }
                shooter.last_shot_ms = Some(now_ms);
                (shooter.x, shooter.y, shooter.aim_angle)
            }
            _ => return Vec::new(),
        };

        let candidates = players
            .values()
            .filter(|p| p.id != shooter_id && p.alive)
            .map(|p| HitCandidate {
                id: p.id,
                x: p.x,
                y: p.y,
            });

        let Some(target_id) = Self::hitscan(x, y, aim_angle, candidates) else {
            return Vec::new();
        };

        Self::apply_hit(players, respawns, shooter_id, target_id, now_ms)
    }

    fn apply_hit(
        players: &mut BTreeMap<PlayerId, PlayerState>,
        respawns: &mut RespawnQueue,
        attacker_id: PlayerId,
        target_id: PlayerId,
        now_ms: u64,
    ) -> Vec<CombatEvent> {
        let mut events = Vec::with_capacity(2);

        let Some(target) = players.get_mut(&target_id) else {
            return events;
        };

        let (new_health, killed) = Self::apply_damage(target.health, DAMAGE_PER_HIT);
        target.health = new_health;
        events.push(CombatEvent::Hit {
            attacker: attacker_id,
            target: target_id,
            remaining_hp: new_health,
        });
        debug!(attacker = attacker_id, target = target_id, hp = new_health, "Hit");

        if !killed {
            return events;
        }

        target.alive = false;
        target.deaths += 1;
        target.respawn = Some(respawns.schedule(target_id, now_ms + RESPAWN_DELAY_MS));

        if let Some(attacker) = players.get_mut(&attacker_id) {
            attacker.kills += 1;
        }

        events.push(CombatEvent::Death {
            attacker: attacker_id,
            target: target_id,
        });
        info!(attacker = attacker_id, target = target_id, "Player killed");

        events
    }
}
