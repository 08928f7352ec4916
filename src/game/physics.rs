//! Player movement and world bounds

use rand::Rng;

use super::constants::{MAX_SPEED, SPAWN_MARGIN, WORLD_HEIGHT, WORLD_WIDTH};

/// Physics system shared by the authoritative tick and client prediction
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Advance a position by a movement vector over `dt` seconds.
    /// Returns the new (x, y), clamped into the world rectangle.
    pub fn integrate(x: f32, y: f32, move_x: f32, move_y: f32, dt: f32) -> (f32, f32) {
        let new_x = x + move_x * MAX_SPEED * dt;
        let new_y = y + move_y * MAX_SPEED * dt;
        Self::clamp_to_world(new_x, new_y)
    }

    /// Clamp each axis into `[0, WORLD_WIDTH]` / `[0, WORLD_HEIGHT]`
    pub fn clamp_to_world(x: f32, y: f32) -> (f32, f32) {
        (x.clamp(0.0, WORLD_WIDTH), y.clamp(0.0, WORLD_HEIGHT))
    }

    pub fn is_in_world(x: f32, y: f32) -> bool {
        (0.0..=WORLD_WIDTH).contains(&x) && (0.0..=WORLD_HEIGHT).contains(&y)
    }

    /// Pick a spawn point at least `SPAWN_MARGIN` away from every edge
    pub fn random_spawn<R: Rng>(rng: &mut R) -> (f32, f32) {
        let x = rng.gen_range(SPAWN_MARGIN..=WORLD_WIDTH - SPAWN_MARGIN);
        let y = rng.gen_range(SPAWN_MARGIN..=WORLD_HEIGHT - SPAWN_MARGIN);
        (x, y)
    }
}
