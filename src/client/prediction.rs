//! Client-side prediction
//!
//! The local player moves immediately on local input using the same
//! integration as the server tick. Authoritative snapshots then pull the
//! predicted position back toward the server's, gradually.

use crate::game::constants::{CORRECTION_FACTOR, CORRECTION_THRESHOLD, MAX_HEALTH, WORLD_HEIGHT, WORLD_WIDTH};
use crate::game::input::clamp_movement;
use crate::game::physics::PhysicsSystem;
use crate::ws::protocol::PlayerSnapshot;

/// Locally simulated state of the local player
#[derive(Debug, Clone, PartialEq)]
pub struct PredictedState {
    pub x: f32,
    pub y: f32,
    pub aim_angle: f32,
    /// Locally asserted fire flag, for immediate visual feedback only
    pub firing: bool,
    pub health: u8,
    pub alive: bool,
    pub kills: u32,
    pub deaths: u32,
    /// Set once the first authoritative position has been applied
    pub server_pos_known: bool,
}

impl Default for PredictedState {
    fn default() -> Self {
        Self {
            x: WORLD_WIDTH / 2.0,
            y: WORLD_HEIGHT / 2.0,
            aim_angle: 0.0,
            firing: false,
            health: MAX_HEALTH,
            alive: true,
            kills: 0,
            deaths: 0,
            server_pos_known: false,
        }
    }
}

/// How a snapshot changed the predicted position
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correction {
    /// First authoritative position, taken as-is
    Bootstrap,
    /// Within threshold, left alone
    None,
    /// Moved part of the way toward the server position
    Nudged { error: f32 },
}

impl PredictedState {
    /// Advance by one local frame. Movement is only predicted while alive;
    /// damage and other combat outcomes are never predicted.
    pub fn predict(&mut self, move_x: f32, move_y: f32, aim_angle: f32, firing: bool, dt: f32) {
        if aim_angle.is_finite() {
            self.aim_angle = aim_angle;
        }
        self.firing = firing && self.alive;
        if !self.alive || !dt.is_finite() || dt <= 0.0 {
            return;
        }

        let (move_x, move_y) = clamp_movement(move_x, move_y);
        let (x, y) = PhysicsSystem::integrate(self.x, self.y, move_x, move_y, dt);
        self.x = x;
        self.y = y;
    }

    /// Blend toward the authoritative state of the local player
    pub fn reconcile(&mut self, authoritative: &PlayerSnapshot) -> Correction {
        let correction = if !self.server_pos_known {
            self.x = authoritative.x;
            self.y = authoritative.y;
            self.server_pos_known = true;
            Correction::Bootstrap
        } else {
            let dx = authoritative.x - self.x;
            let dy = authoritative.y - self.y;
            let error = dx.hypot(dy);
            if error > CORRECTION_THRESHOLD {
                self.x += dx * CORRECTION_FACTOR;
                self.y += dy * CORRECTION_FACTOR;
                Correction::Nudged { error }
            } else {
                Correction::None
            }
        };

        // Discrete facts come straight from the server
        self.health = authoritative.hp;
        self.alive = authoritative.alive;
        self.kills = authoritative.kills;
        self.deaths = authoritative.deaths;
        if !self.alive {
            self.firing = false;
        }

        correction
    }

    /// Respawn event for the local player, ahead of the next snapshot
    pub fn on_respawn(&mut self) {
        self.health = MAX_HEALTH;
        self.alive = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::MAX_SPEED;

    fn authoritative(x: f32, y: f32) -> PlayerSnapshot {
        PlayerSnapshot {
            id: 1,
            nickname: "me".into(),
            character_id: 0,
            x,
            y,
            aim_angle: 0.0,
            hp: 75,
            kills: 2,
            deaths: 1,
            alive: true,
            last_input_seq: 0,
        }
    }

    #[test]
    fn prediction_uses_server_formula() {
        let mut state = PredictedState::default();
        let (start_x, start_y) = (state.x, state.y);

        state.predict(1.0, 0.0, 0.3, true, 0.1);

        assert_eq!(state.x, start_x + MAX_SPEED * 0.1);
        assert_eq!(state.y, start_y);
        assert_eq!(state.aim_angle, 0.3);
        assert!(state.firing);
        assert_eq!(state.health, MAX_HEALTH);
    }

    #[test]
    fn prediction_clamps_to_world() {
        let mut state = PredictedState::default();
        for _ in 0..100 {
            state.predict(-1.0, -1.0, 0.0, false, 0.1);
        }
        assert_eq!((state.x, state.y), (0.0, 0.0));
    }

    #[test]
    fn first_snapshot_snaps() {
        let mut state = PredictedState::default();
        assert_eq!(state.reconcile(&authoritative(10.0, 20.0)), Correction::Bootstrap);
        assert_eq!((state.x, state.y), (10.0, 20.0));
        assert_eq!(state.health, 75);
        assert_eq!(state.kills, 2);
        assert_eq!(state.deaths, 1);
    }

    #[test]
    fn small_error_is_tolerated() {
        let mut state = PredictedState::default();
        state.reconcile(&authoritative(100.0, 100.0));
        state.x = 105.0;

        assert_eq!(state.reconcile(&authoritative(100.0, 100.0)), Correction::None);
        assert_eq!(state.x, 105.0);
    }

    #[test]
    fn large_error_is_nudged_not_snapped() {
        let mut state = PredictedState::default();
        state.reconcile(&authoritative(100.0, 100.0));
        state.x = 200.0;

        let correction = state.reconcile(&authoritative(100.0, 100.0));

        assert_eq!(correction, Correction::Nudged { error: 100.0 });
        assert!((state.x - 165.0).abs() < 1e-4);

        // repeated updates converge inside the threshold
        for _ in 0..20 {
            state.reconcile(&authoritative(100.0, 100.0));
        }
        assert!((state.x - 100.0).abs() <= CORRECTION_THRESHOLD);
    }

    #[test]
    fn dead_player_does_not_move() {
        let mut state = PredictedState::default();
        let mut dead = authoritative(50.0, 50.0);
        dead.alive = false;
        dead.hp = 0;
        state.reconcile(&dead);

        state.predict(1.0, 0.0, 0.0, true, 0.1);

        assert_eq!((state.x, state.y), (50.0, 50.0));
        assert!(!state.firing);

        state.on_respawn();
        assert!(state.alive);
        assert_eq!(state.health, MAX_HEALTH);
    }
}
