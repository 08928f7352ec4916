//! Client-side protocol state machine
//!
//! Ties the prediction engine, clock sync and snapshot buffer to the
//! server's message stream. Transport-agnostic: callers feed decoded
//! frames in and send the returned messages out.

use tracing::{debug, info};

use crate::game::constants::MAX_INPUT_DT;
use crate::game::PlayerId;
use crate::ws::protocol::{decode_server, ClientMsg, GameEvent, ProtocolError, ServerMsg};

use super::buffer::SnapshotRingBuffer;
use super::clock::ClockSync;
use super::interpolation::{interpolate, LocalPlayer, RenderedPlayer};
use super::prediction::{Correction, PredictedState};

/// Client errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Connection failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Connection closed by server")]
    Closed,
}

/// Local controls sampled for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameInput {
    pub move_x: f32,
    pub move_y: f32,
    pub aim_angle: f32,
    pub shoot: bool,
}

#[derive(Debug)]
pub struct ClientSession {
    nickname: String,
    character_id: u8,
    player_id: Option<PlayerId>,
    input_seq: u32,
    clock: ClockSync,
    buffer: SnapshotRingBuffer,
    predicted: PredictedState,
}

impl ClientSession {
    pub fn new(nickname: impl Into<String>, character_id: u8) -> Self {
        Self {
            nickname: nickname.into(),
            character_id,
            player_id: None,
            input_seq: 0,
            clock: ClockSync::new(),
            buffer: SnapshotRingBuffer::default(),
            predicted: PredictedState::default(),
        }
    }

    pub fn join_message(&self) -> ClientMsg {
        ClientMsg::Join {
            nickname: Some(self.nickname.clone()),
            character_id: Some(f64::from(self.character_id)),
        }
    }

    /// Decode and apply one text frame from the server
    pub fn handle_text(&mut self, text: &str, local_now_ms: u64) -> Result<(), ClientError> {
        let msg = decode_server(text)?;
        self.handle_server_msg(msg, local_now_ms);
        Ok(())
    }

    pub fn handle_server_msg(&mut self, msg: ServerMsg, local_now_ms: u64) {
        match msg {
            ServerMsg::Welcome {
                player_id,
                server_time,
            } => {
                if self.player_id.is_some() {
                    debug!(player_id, "Ignoring repeated welcome");
                    return;
                }
                info!(player_id, "Joined game");
                self.player_id = Some(player_id);
                self.clock.on_welcome(local_now_ms, server_time);
            }
            ServerMsg::Snapshot(snapshot) => {
                if let Some(me) = self.player_id.and_then(|id| snapshot.player(id)) {
                    if let Correction::Nudged { error } = self.predicted.reconcile(me) {
                        debug!(error, "Correcting predicted position");
                    }
                }
                self.buffer.push(snapshot);
            }
            ServerMsg::Event(event) => {
                if let GameEvent::Respawn { target_id } = event {
                    if Some(target_id) == self.player_id {
                        self.predicted.on_respawn();
                    }
                }
            }
            ServerMsg::Pong {
                client_time,
                server_time,
            } => {
                self.clock.on_pong(local_now_ms, client_time, server_time);
            }
        }
    }

    /// Predict one local frame and build the input message for it.
    /// Nothing is predicted or sent before the welcome arrives.
    pub fn frame(&mut self, input: FrameInput, dt: f32, client_time_ms: f64) -> Option<ClientMsg> {
        self.player_id?;

        let dt = if dt.is_finite() { dt.clamp(0.0, MAX_INPUT_DT) } else { 0.0 };
        self.predicted
            .predict(input.move_x, input.move_y, input.aim_angle, input.shoot, dt);

        self.input_seq = self.input_seq.wrapping_add(1);
        Some(ClientMsg::Input {
            seq: self.input_seq,
            dt,
            move_x: input.move_x,
            move_y: input.move_y,
            aim_angle: input.aim_angle,
            shoot: input.shoot,
            client_time: client_time_ms,
        })
    }

    /// Latency probe; only meaningful once joined
    pub fn ping_message(&self, client_time_ms: f64) -> Option<ClientMsg> {
        self.player_id.map(|_| ClientMsg::Ping {
            client_time: client_time_ms,
        })
    }

    /// Players to draw at `local_now_ms`, or nothing until a snapshot arrives
    pub fn render(&self, local_now_ms: u64) -> Vec<RenderedPlayer> {
        let render_time = self.clock.render_time(local_now_ms);
        let Some(bracket) = self.buffer.bracket(render_time) else {
            return Vec::new();
        };
        let local = self
            .player_id
            .and_then(|id| self.buffer.latest()?.player(id))
            .map(|latest| LocalPlayer {
                latest,
                predicted: &self.predicted,
            });
        interpolate(&bracket, local)
    }

    /// Channel closed: back to the pre-join state
    pub fn on_close(&mut self) {
        self.player_id = None;
        self.input_seq = 0;
        self.clock = ClockSync::new();
        self.buffer.clear();
        self.predicted = PredictedState::default();
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.player_id
    }

    pub fn is_joined(&self) -> bool {
        self.player_id.is_some()
    }

    pub fn predicted(&self) -> &PredictedState {
        &self.predicted
    }

    pub fn clock(&self) -> &ClockSync {
        &self.clock
    }

    pub fn buffer(&self) -> &SnapshotRingBuffer {
        &self.buffer
    }
}
