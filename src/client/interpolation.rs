//! Interpolation of remote players between buffered snapshots

use crate::game::PlayerId;
use crate::ws::protocol::PlayerSnapshot;

use super::buffer::Bracket;
use super::prediction::PredictedState;

/// A player as it should be drawn this frame
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPlayer {
    pub id: PlayerId,
    pub nickname: String,
    pub character_id: u8,
    pub x: f32,
    pub y: f32,
    pub aim_angle: f32,
    pub hp: u8,
    pub kills: u32,
    pub deaths: u32,
    pub alive: bool,
    pub is_local: bool,
}

impl RenderedPlayer {
    fn from_snapshot(player: &PlayerSnapshot, x: f32, y: f32) -> Self {
        Self {
            id: player.id,
            nickname: player.nickname.clone(),
            character_id: player.character_id,
            x,
            y,
            aim_angle: player.aim_angle,
            hp: player.hp,
            kills: player.kills,
            deaths: player.deaths,
            alive: player.alive,
            is_local: false,
        }
    }

    /// Predicted position and aim; discrete facts as of the latest snapshot
    fn local(local: &LocalPlayer<'_>) -> Self {
        let predicted = local.predicted;
        Self {
            id: local.latest.id,
            nickname: local.latest.nickname.clone(),
            character_id: local.latest.character_id,
            x: predicted.x,
            y: predicted.y,
            aim_angle: predicted.aim_angle,
            hp: predicted.health,
            kills: predicted.kills,
            deaths: predicted.deaths,
            alive: predicted.alive,
            is_local: true,
        }
    }
}

/// The local player's entry in the most recent snapshot and its prediction
#[derive(Debug, Clone, Copy)]
pub struct LocalPlayer<'a> {
    pub latest: &'a PlayerSnapshot,
    pub predicted: &'a PredictedState,
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Build the frame's player list.
///
/// Remote membership follows the newer snapshot. Remote positions are
/// blended from `older` to `newer`; a player missing from `older` renders at
/// its `newer` position. Aim and scalar fields come from `newer` unblended.
///
/// The local player is not interpolated. Once its first authoritative
/// position is known it is drawn from the prediction, whether or not the
/// delayed `newer` snapshot contains it yet.
pub fn interpolate(bracket: &Bracket<'_>, local: Option<LocalPlayer<'_>>) -> Vec<RenderedPlayer> {
    let local_id = local.map(|l| l.latest.id);

    let mut rendered: Vec<RenderedPlayer> = bracket
        .newer
        .players
        .iter()
        .filter(|newer| Some(newer.id) != local_id)
        .map(|newer| {
            let older = bracket.older.player(newer.id).unwrap_or(newer);
            let x = lerp(older.x, newer.x, bracket.t);
            let y = lerp(older.y, newer.y, bracket.t);
            RenderedPlayer::from_snapshot(newer, x, y)
        })
        .collect();

    if let Some(local) = local.filter(|l| l.predicted.server_pos_known) {
        rendered.push(RenderedPlayer::local(&local));
    }
    rendered
}
