//! Input sanitization
//!
//! Turns a client's raw per-frame input into an [`InputIntent`] the
//! simulation can trust, or rejects it. Rejection is silent: the player's
//! previous intent simply stays in effect.

use super::constants::{MAX_INPUT_DT, MOVE_EPSILON, PROTOCOL_VERSION};

/// Latest sanitized movement/aim/fire request of a player
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputIntent {
    /// Movement vector, length in `[0, 1]`
    pub move_x: f32,
    pub move_y: f32,
    /// Aim direction in radians
    pub aim_angle: f32,
    pub fire: bool,
    /// Client sequence number the intent came from
    pub seq: u32,
}

/// Input exactly as declared by the client (after JSON decoding)
#[derive(Debug, Clone, Copy)]
pub struct RawInput {
    pub version: u32,
    pub seq: u32,
    pub dt: f32,
    pub move_x: f32,
    pub move_y: f32,
    pub aim_angle: f32,
    pub shoot: bool,
}

/// Why an input was dropped. Only used for debug logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputRejection {
    PlayerDead,
    VersionMismatch,
    InvalidDelta,
    InvalidAim,
}

/// Validate and normalize a raw input for a player whose alive flag is `alive`
pub fn sanitize(raw: &RawInput, alive: bool) -> Result<InputIntent, InputRejection> {
    if !alive {
        return Err(InputRejection::PlayerDead);
    }
    if raw.version != PROTOCOL_VERSION {
        return Err(InputRejection::VersionMismatch);
    }
    if !raw.dt.is_finite() || raw.dt < 0.0 || raw.dt > MAX_INPUT_DT {
        return Err(InputRejection::InvalidDelta);
    }
    if !raw.aim_angle.is_finite() {
        return Err(InputRejection::InvalidAim);
    }

    let (move_x, move_y) = clamp_movement(raw.move_x, raw.move_y);

    Ok(InputIntent {
        move_x,
        move_y,
        aim_angle: raw.aim_angle,
        fire: raw.shoot,
        seq: raw.seq,
    })
}

/// Non-finite components zero the vector; anything longer than unit length
/// is scaled back to unit length. Partial deflection passes through.
pub fn clamp_movement(move_x: f32, move_y: f32) -> (f32, f32) {
    if !move_x.is_finite() || !move_y.is_finite() {
        return (0.0, 0.0);
    }
    let length = move_x.hypot(move_y);
    if length > 1.0 + MOVE_EPSILON {
        (move_x / length, move_y / length)
    } else {
        (move_x, move_y)
    }
}
