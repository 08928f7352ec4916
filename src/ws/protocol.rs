//! WebSocket protocol message definitions
//! These are the wire types for client-server communication.
//!
//! Every message is a JSON object `{ "v": <version>, "type": <tag>, ... }`.
//! Field names are camelCase on the wire.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::game::constants::PROTOCOL_VERSION;
use crate::game::snapshot::Snapshot;
use crate::game::PlayerId;

/// Versioned envelope around a message body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub v: u32,
    #[serde(flatten)]
    pub body: T,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMsg {
    /// Enter the game; honored once per connection
    Join {
        #[serde(default, deserialize_with = "lenient_string")]
        nickname: Option<String>,
        #[serde(default, deserialize_with = "lenient_number")]
        character_id: Option<f64>,
    },

    /// Player input for the current client frame
    Input {
        #[serde(default, deserialize_with = "lenient_seq")]
        seq: u32,
        /// Client frame delta in seconds
        #[serde(default = "nan", deserialize_with = "lenient_f32")]
        dt: f32,
        #[serde(default = "nan", deserialize_with = "lenient_f32")]
        move_x: f32,
        #[serde(default = "nan", deserialize_with = "lenient_f32")]
        move_y: f32,
        /// Aim direction in radians
        #[serde(default = "nan", deserialize_with = "lenient_f32")]
        aim_angle: f32,
        #[serde(default, deserialize_with = "lenient_bool")]
        shoot: bool,
        #[serde(default, deserialize_with = "lenient_f64")]
        client_time: f64,
    },

    /// Ping for latency measurement and clock sync
    Ping {
        #[serde(default, deserialize_with = "lenient_f64")]
        client_time: f64,
    },

    /// Any tag this server does not know
    #[serde(other)]
    Unknown,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMsg {
    /// Sent once after a valid join
    Welcome { player_id: PlayerId, server_time: u64 },

    /// Full world state, broadcast at the snapshot rate
    Snapshot(Snapshot),

    /// Combat transition, broadcast as it happens
    Event(GameEvent),

    /// Pong response
    Pong {
        /// Echo back client timestamp
        client_time: f64,
        server_time: u64,
    },
}

/// Player state in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub nickname: String,
    pub character_id: u8,
    pub x: f32,
    pub y: f32,
    /// Aim direction in radians
    pub aim_angle: f32,
    /// Health (0-100)
    pub hp: u8,
    pub kills: u32,
    pub deaths: u32,
    pub alive: bool,
    /// Last accepted input sequence
    #[serde(default)]
    pub last_input_seq: u32,
}

/// Combat events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum GameEvent {
    Hit {
        attacker_id: PlayerId,
        target_id: PlayerId,
        /// Target health after the hit
        hp: u8,
    },
    Death {
        attacker_id: PlayerId,
        target_id: PlayerId,
    },
    Respawn {
        target_id: PlayerId,
    },
}

/// Reasons an inbound frame is dropped
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Protocol version mismatch: got {0}")]
    VersionMismatch(u32),

    #[error("Unknown message type")]
    UnknownType,
}

/// Decode a client frame. Wrong version and unknown tags are errors, which
/// the caller drops.
pub fn decode_client(text: &str) -> Result<Envelope<ClientMsg>, ProtocolError> {
    let envelope: Envelope<ClientMsg> = serde_json::from_str(text)?;
    if envelope.v != PROTOCOL_VERSION {
        return Err(ProtocolError::VersionMismatch(envelope.v));
    }
    if matches!(envelope.body, ClientMsg::Unknown) {
        return Err(ProtocolError::UnknownType);
    }
    Ok(envelope)
}

/// Decode a server frame (client side)
pub fn decode_server(text: &str) -> Result<ServerMsg, ProtocolError> {
    let envelope: Envelope<ServerMsg> = serde_json::from_str(text)?;
    if envelope.v != PROTOCOL_VERSION {
        return Err(ProtocolError::VersionMismatch(envelope.v));
    }
    Ok(envelope.body)
}

/// Encode any message body inside a current-version envelope
pub fn encode<T: Serialize>(body: &T) -> Result<String, ProtocolError> {
    let envelope = Envelope {
        v: PROTOCOL_VERSION,
        body,
    };
    Ok(serde_json::to_string(&envelope)?)
}

fn nan() -> f32 {
    f32::NAN
}

/// Numbers pass through; null or any other type becomes NaN
fn lenient_f32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(Value::as_f64)
        .map(|v| v as f32)
        .unwrap_or(f32::NAN))
}

/// Non-numbers become 0; out-of-range numbers saturate
fn lenient_seq<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
        .map_or(0, |v| v as u32))
}

/// Echoed timestamps: numbers pass through, anything else is 0
fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(Value::as_f64).unwrap_or(0.0))
}

/// Numbers and numeric strings
fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

/// JSON truthiness
fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(b)) => b,
        Some(Value::Number(n)) => n.as_f64().map_or(false, |v| v != 0.0 && !v.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
        Some(Value::Null) | None => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_join() {
        let msg = decode_client(r#"{"v":1,"type":"join","nickname":"Ann","characterId":2}"#).unwrap();
        match msg.body {
            ClientMsg::Join {
                nickname,
                character_id,
            } => {
                assert_eq!(nickname.as_deref(), Some("Ann"));
                assert_eq!(character_id, Some(2.0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn join_fields_are_lenient() {
        let msg = decode_client(r#"{"v":1,"type":"join","nickname":42,"characterId":"3"}"#).unwrap();
        match msg.body {
            ClientMsg::Join {
                nickname,
                character_id,
            } => {
                assert_eq!(nickname, None);
                assert_eq!(character_id, Some(3.0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn null_numbers_become_nan() {
        let text = r#"{"v":1,"type":"input","seq":4,"dt":0.016,"moveX":null,"moveY":1,"aimAngle":null,"shoot":1}"#;
        match decode_client(text).unwrap().body {
            ClientMsg::Input {
                seq,
                dt,
                move_x,
                move_y,
                aim_angle,
                shoot,
                ..
            } => {
                assert_eq!(seq, 4);
                assert!((dt - 0.016).abs() < 1e-6);
                assert!(move_x.is_nan());
                assert_eq!(move_y, 1.0);
                assert!(aim_angle.is_nan());
                assert!(shoot);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn odd_seq_and_timestamps_are_coerced() {
        match decode_client(r#"{"v":1,"type":"input","seq":null,"dt":0.01,"clientTime":null}"#)
            .unwrap()
            .body
        {
            ClientMsg::Input { seq, client_time, .. } => {
                assert_eq!(seq, 0);
                assert_eq!(client_time, 0.0);
            }
            other => panic!("unexpected {other:?}"),
        }

        match decode_client(r#"{"v":1,"type":"input","seq":4294967296}"#).unwrap().body {
            ClientMsg::Input { seq, .. } => assert_eq!(seq, u32::MAX),
            other => panic!("unexpected {other:?}"),
        }

        match decode_client(r#"{"v":1,"type":"ping","clientTime":null}"#).unwrap().body {
            ClientMsg::Ping { client_time } => assert_eq!(client_time, 0.0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_wrong_version_and_unknown_type() {
        assert!(matches!(
            decode_client(r#"{"v":2,"type":"ping","clientTime":1}"#),
            Err(ProtocolError::VersionMismatch(2))
        ));
        assert!(matches!(
            decode_client(r#"{"v":1,"type":"teleport"}"#),
            Err(ProtocolError::UnknownType)
        ));
        assert!(matches!(
            decode_client("not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            decode_client(r#"{"type":"ping"}"#),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn event_wire_shape() {
        let text = encode(&ServerMsg::Event(GameEvent::Hit {
            attacker_id: 1,
            target_id: 2,
            hp: 75,
        }))
        .unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["v"], 1);
        assert_eq!(value["type"], "event");
        assert_eq!(value["eventType"], "hit");
        assert_eq!(value["attackerId"], 1);
        assert_eq!(value["targetId"], 2);
        assert_eq!(value["hp"], 75);

        match decode_server(&text).unwrap() {
            ServerMsg::Event(GameEvent::Hit { hp, .. }) => assert_eq!(hp, 75),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn welcome_wire_shape() {
        let text = encode(&ServerMsg::Welcome {
            player_id: 7,
            server_time: 1_000,
        })
        .unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "welcome");
        assert_eq!(value["playerId"], 7);
        assert_eq!(value["serverTime"], 1_000);
    }

    #[test]
    fn client_input_encodes_camel_case() {
        let text = encode(&ClientMsg::Input {
            seq: 1,
            dt: 0.016,
            move_x: 0.5,
            move_y: 0.0,
            aim_angle: 1.0,
            shoot: false,
            client_time: 5.0,
        })
        .unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "input");
        assert_eq!(value["moveX"], 0.5);
        assert_eq!(value["aimAngle"], 1.0);
        assert_eq!(value["clientTime"], 5.0);
    }
}
