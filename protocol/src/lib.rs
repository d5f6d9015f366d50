//! The wire format shared by the server and the terminal client.
//!
//! A message is one JSON-encoded text frame with a closed set of `type`
//! values (see [`MessageType`]). [`parse`] turns raw bytes into a typed
//! [`Message`], validating both the envelope and the payload shape for the
//! given type; [`encode`] turns a [`Message`] back into bytes, filling in a
//! server-assigned `timestamp` when the caller didn't set one.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of message types recognized on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Connect,
    Disconnect,
    Move,
    MoveFailed,
    Restart,
    StateUpdate,
    PlayerJoined,
    PlayerLeft,
    SetPlayerName,
    Error,
    Ping,
    Pong,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = serde_json::to_value(self).unwrap_or_default();
        write!(f, "{}", raw.as_str().unwrap_or("UNKNOWN"))
    }
}

/// Reasons a connect envelope is malformed or a frame cannot be interpreted.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("message is missing a `type` field")]
    MissingType,
    #[error("unknown message type: {0}")]
    UnknownType(String),
    #[error("payload does not match the shape required for {0}: {1}")]
    InvalidPayloadShape(MessageType, String),
}

/// `{board:{width,height,grid}, players, entities, score}` — the authoritative
/// world value broadcast every tick, per spec §3/§6.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameStateDto {
    pub board: BoardDto,
    pub players: Vec<PlayerDto>,
    #[serde(default)]
    pub entities: Vec<EntityDto>,
    pub score: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoardDto {
    pub width: u32,
    pub height: u32,
    /// Row-major, one entry per cell: `true` = wall.
    pub grid: Vec<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerDto {
    pub player_id: String,
    pub x: u32,
    pub y: u32,
    pub player_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EntityDto {
    pub entity_id: String,
    pub x: u32,
    pub y: u32,
    pub entity_type: String,
    pub glyph: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation_frame: Option<u32>,
}

/// Reason a `MOVE` was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MoveFailReason {
    OutOfBounds,
    Wall,
    PlayerCollision,
}

/// `CONNECT` is overloaded across three directions/phases (initial greeting,
/// join request, join response); every field is therefore optional at the
/// wire layer and the protocol state machine picks the fields it expects for
/// the state it's in.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_state: Option<GameStateDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_reconnection: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EmptyPayload {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovePayload {
    pub dx: i8,
    pub dy: i8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MoveFailedPayload {
    pub reason: MoveFailReason,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdatePayload {
    pub game_state: GameStateDto,
    pub tick: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerJoinedPayload {
    pub client_id: String,
    pub player_id: String,
    pub player_name: String,
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerLeftPayload {
    pub player_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SetPlayerNamePayload {
    pub player_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

/// Typed payload, one variant per [`MessageType`]. Carrying the payload in
/// the enum (rather than a raw `serde_json::Value`) is what lets
/// [`parse`] validate payload shape as part of parsing. Each variant is
/// decoded/encoded explicitly by [`decode_payload`]/[`payload_to_value`]
/// rather than through `Payload`'s own (de)serialization, since several
/// variants share structurally-compatible shapes and an untagged derive
/// would pick the wrong one.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Connect(ConnectPayload),
    Move(MovePayload),
    MoveFailed(MoveFailedPayload),
    StateUpdate(StateUpdatePayload),
    PlayerJoined(PlayerJoinedPayload),
    PlayerLeft(PlayerLeftPayload),
    SetPlayerName(SetPlayerNamePayload),
    Error(ErrorPayload),
    Empty(EmptyPayload),
}

/// A parsed, validated protocol message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub msg_type: MessageType,
    pub payload: Payload,
    pub timestamp: i64,
    pub client_id: Option<String>,
}

/// On-the-wire envelope shape, used only to drive (de)serialization.
#[derive(Debug, Serialize, Deserialize)]
struct RawMessage {
    #[serde(rename = "type")]
    msg_type: Option<serde_json::Value>,
    #[serde(default)]
    payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "clientId")]
    client_id: Option<String>,
}

impl Message {
    pub fn new(msg_type: MessageType, payload: Payload) -> Self {
        Message {
            msg_type,
            payload,
            timestamp: 0,
            client_id: None,
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

fn decode_payload(msg_type: MessageType, raw: serde_json::Value) -> Result<Payload, ProtocolError> {
    let shape_err = |e: serde_json::Error| {
        ProtocolError::InvalidPayloadShape(msg_type, e.to_string())
    };

    Ok(match msg_type {
        MessageType::Connect => {
            Payload::Connect(serde_json::from_value(raw).map_err(shape_err)?)
        }
        MessageType::Move => Payload::Move(serde_json::from_value(raw).map_err(shape_err)?),
        MessageType::MoveFailed => {
            Payload::MoveFailed(serde_json::from_value(raw).map_err(shape_err)?)
        }
        MessageType::StateUpdate => {
            Payload::StateUpdate(serde_json::from_value(raw).map_err(shape_err)?)
        }
        MessageType::PlayerJoined => {
            Payload::PlayerJoined(serde_json::from_value(raw).map_err(shape_err)?)
        }
        MessageType::PlayerLeft => {
            Payload::PlayerLeft(serde_json::from_value(raw).map_err(shape_err)?)
        }
        MessageType::SetPlayerName => {
            Payload::SetPlayerName(serde_json::from_value(raw).map_err(shape_err)?)
        }
        MessageType::Error => Payload::Error(serde_json::from_value(raw).map_err(shape_err)?),
        MessageType::Disconnect | MessageType::Restart | MessageType::Ping | MessageType::Pong => {
            Payload::Empty(serde_json::from_value(raw).map_err(shape_err)?)
        }
    })
}

fn payload_to_value(payload: &Payload) -> serde_json::Value {
    match payload {
        Payload::Connect(p) => serde_json::to_value(p),
        Payload::Move(p) => serde_json::to_value(p),
        Payload::MoveFailed(p) => serde_json::to_value(p),
        Payload::StateUpdate(p) => serde_json::to_value(p),
        Payload::PlayerJoined(p) => serde_json::to_value(p),
        Payload::PlayerLeft(p) => serde_json::to_value(p),
        Payload::SetPlayerName(p) => serde_json::to_value(p),
        Payload::Error(p) => serde_json::to_value(p),
        Payload::Empty(p) => serde_json::to_value(p),
    }
    .expect("payload types are always representable as JSON")
}

/// Parses and validates one JSON text frame. Unknown types and structurally
/// wrong payloads are rejected here so they never reach the protocol state
/// machine.
pub fn parse(bytes: &[u8]) -> Result<Message, ProtocolError> {
    let raw: RawMessage = serde_json::from_slice(bytes)
        .map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;

    let Some(type_value) = raw.msg_type else {
        return Err(ProtocolError::MissingType);
    };
    let type_str = type_value
        .as_str()
        .ok_or(ProtocolError::MissingType)?;
    let msg_type: MessageType = serde_json::from_value(serde_json::Value::String(type_str.to_string()))
        .map_err(|_| ProtocolError::UnknownType(type_str.to_string()))?;

    let payload = decode_payload(msg_type, raw.payload)?;

    Ok(Message {
        msg_type,
        payload,
        timestamp: raw.timestamp.unwrap_or(0),
        client_id: raw.client_id,
    })
}

/// Encodes a message to its canonical wire form, assigning `now_millis` as
/// the timestamp if the message doesn't already carry one.
pub fn encode(mut message: Message, now_millis: i64) -> Vec<u8> {
    if message.timestamp == 0 {
        message.timestamp = now_millis;
    }
    let raw = RawMessage {
        msg_type: Some(serde_json::to_value(message.msg_type).expect("MessageType always serializes")),
        payload: payload_to_value(&message.payload),
        timestamp: Some(message.timestamp),
        client_id: message.client_id,
    };
    serde_json::to_vec(&raw).expect("RawMessage always serializes")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_move() -> Message {
        Message::new(MessageType::Move, Payload::Move(MovePayload { dx: 1, dy: 0 }))
            .with_timestamp(1_000)
    }

    #[test]
    fn encode_then_parse_round_trips() {
        let msg = sample_move();
        let bytes = encode(msg.clone(), 42);
        let parsed = parse(&bytes).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn encode_fills_missing_timestamp() {
        let msg = Message::new(MessageType::Ping, Payload::Empty(EmptyPayload {}));
        let bytes = encode(msg, 12_345);
        let parsed = parse(&bytes).unwrap();
        assert_eq!(parsed.timestamp, 12_345);
    }

    #[test]
    fn missing_type_is_rejected() {
        let err = parse(br#"{"payload":{}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingType));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = parse(br#"{"type":"TELEPORT","payload":{}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownType(_)));
    }

    #[test]
    fn malformed_frame_is_rejected() {
        let err = parse(b"not json").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedFrame(_)));
    }

    #[test]
    fn wrong_shape_payload_is_rejected() {
        let err = parse(br#"{"type":"MOVE","payload":{"dx":"left","dy":0}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayloadShape(MessageType::Move, _)));
    }

    #[test]
    fn connect_payload_accepts_any_subset_of_fields() {
        let bytes = br#"{"type":"CONNECT","payload":{"clientId":"c1"}}"#;
        let parsed = parse(bytes).unwrap();
        match parsed.payload {
            Payload::Connect(p) => assert_eq!(p.client_id.as_deref(), Some("c1")),
            _ => panic!("expected Connect payload"),
        }
    }
}
