//! World policy constants
//!
//! Client prediction and the server simulation both read these, so the two
//! integrate movement identically. They are compiled in, never negotiated.

/// Wire protocol version carried in every envelope
pub const PROTOCOL_VERSION: u32 = 1;

/// World rectangle
pub const WORLD_WIDTH: f32 = 800.0;
pub const WORLD_HEIGHT: f32 = 600.0;

/// Distance kept from the world edges when picking a spawn point
pub const SPAWN_MARGIN: f32 = 50.0;

/// Units per second at full deflection
pub const MAX_SPEED: f32 = 220.0;

/// Largest frame delta (seconds) a client may declare
pub const MAX_INPUT_DT: f32 = 0.1;

/// Tolerance above unit length before a movement vector is renormalized
pub const MOVE_EPSILON: f32 = 1e-6;

pub const MAX_HEALTH: u8 = 100;

/// Minimum time between two resolved shots of one player
pub const FIRE_COOLDOWN_MS: u64 = 250;
pub const DAMAGE_PER_HIT: u8 = 25;
pub const HIT_RANGE: f32 = 900.0;
/// Maximum perpendicular distance from the aim ray that still counts as a hit
pub const BEAM_HALF_WIDTH: f32 = 30.0;

pub const RESPAWN_DELAY_MS: u64 = 2500;

/// Character variants are numbered 0..=MAX_CHARACTER_ID
pub const MAX_CHARACTER_ID: u8 = 3;
pub const NICKNAME_MAX_CHARS: usize = 16;
pub const DEFAULT_NICKNAME: &str = "Player";

// Client-side presentation policy

/// Deliberate render lag so interpolation usually has a bracketing pair
pub const RENDER_DELAY_MS: i64 = 100;
pub const SNAPSHOT_BUFFER_CAPACITY: usize = 50;
/// Prediction error (units) tolerated before correcting toward the server
pub const CORRECTION_THRESHOLD: f32 = 12.0;
/// Fraction of the remaining error removed per authoritative update
pub const CORRECTION_FACTOR: f32 = 0.35;
pub const PING_INTERVAL_MS: u64 = 2000;
