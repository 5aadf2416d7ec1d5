//! Wire protocol shared by the session server and its clients.
//!
//! Every frame is a JSON envelope `{"event": "<name>", "data": <payload>}`.
//! Payload-less events omit `data`. Outbound events are typed ([`ServerEvent`])
//! and serialized directly; inbound events are decoded from a loosely-typed
//! envelope and then shape-checked into a [`ClientEvent`], so that malformed
//! payloads surface as a [`ValidationError`] instead of a generic decode error.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

pub const USERNAME_MAX_LEN: usize = 20;
pub const CHAT_MAX_LEN: usize = 100;
/// Username that can never be claimed.
pub const RESERVED_USERNAME: &str = "guest";

pub const EVENT_SEED: &str = "seed";
pub const EVENT_USER_PRESENCE: &str = "user presence";
pub const EVENT_PLAYER_LIST: &str = "player list";
pub const EVENT_USERNAME_CHOSEN: &str = "username chosen";
pub const EVENT_USERNAME_TAKEN: &str = "username taken";
pub const EVENT_INVALID_USERNAME: &str = "invalid username";
pub const EVENT_CHAT_MESSAGE: &str = "chat message";
pub const EVENT_UPDATE_POSITION: &str = "update position";
pub const EVENT_PLAYER_DISCONNECTED: &str = "player disconnected";
pub const EVENT_NEW_PLAYER: &str = "new player";

/// Opaque connection identifier. Assigned once per connection, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named, positioned participant. Also the payload of `new player` and
/// `update position`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub x: f64,
    pub y: f64,
    pub username: String,
}

impl Player {
    pub fn new(username: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            username: username.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub username: String,
    pub status: PresenceStatus,
}

/// One row of the `player list` broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: SessionId,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub username: String,
    #[serde(rename = "msg")]
    pub text: String,
    pub reactions: BTreeMap<String, u32>,
}

impl ChatMessage {
    pub fn new(username: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            text: text.into(),
            reactions: BTreeMap::new(),
        }
    }
}

/// Payload of `update position` as seen by peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub id: SessionId,
    pub player: Player,
}

/// Events emitted by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "seed")]
    Seed(f64),
    #[serde(rename = "user presence")]
    UserPresence(BTreeMap<SessionId, PresenceEntry>),
    #[serde(rename = "player list")]
    PlayerList(Vec<RosterEntry>),
    #[serde(rename = "username chosen")]
    UsernameChosen(String),
    #[serde(rename = "username taken")]
    UsernameTaken,
    #[serde(rename = "invalid username")]
    InvalidUsername,
    #[serde(rename = "chat message")]
    ChatMessage(ChatMessage),
    #[serde(rename = "update position")]
    UpdatePosition(PositionUpdate),
    #[serde(rename = "player disconnected")]
    PlayerDisconnected(SessionId),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Seed(_) => EVENT_SEED,
            ServerEvent::UserPresence(_) => EVENT_USER_PRESENCE,
            ServerEvent::PlayerList(_) => EVENT_PLAYER_LIST,
            ServerEvent::UsernameChosen(_) => EVENT_USERNAME_CHOSEN,
            ServerEvent::UsernameTaken => EVENT_USERNAME_TAKEN,
            ServerEvent::InvalidUsername => EVENT_INVALID_USERNAME,
            ServerEvent::ChatMessage(_) => EVENT_CHAT_MESSAGE,
            ServerEvent::UpdatePosition(_) => EVENT_UPDATE_POSITION,
            ServerEvent::PlayerDisconnected(_) => EVENT_PLAYER_DISCONNECTED,
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }
}

/// Events sent by clients, after shape validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "new player")]
    NewPlayer(Player),
    #[serde(rename = "chat message")]
    ChatMessage(String),
    #[serde(rename = "update position")]
    UpdatePosition(Player),
}

/// Malformed inbound frame or payload.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("frame is not an event envelope: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown event {0:?}")]
    UnknownEvent(String),
    #[error("payload must be an object")]
    NotAnObject,
    #[error("payload must be a string")]
    NotAString,
    #[error("\"{0}\" is required")]
    MissingField(&'static str),
    #[error("\"{0}\" is not allowed")]
    UnknownField(String),
    #[error("\"{0}\" must be a finite number")]
    NotANumber(&'static str),
    #[error("\"{0}\" must be a string")]
    FieldNotAString(&'static str),
    #[error("\"{field}\" length {len} outside {min}..={max}")]
    Length {
        field: &'static str,
        len: usize,
        min: usize,
        max: usize,
    },
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Option<Value>,
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::NewPlayer(_) => EVENT_NEW_PLAYER,
            ClientEvent::ChatMessage(_) => EVENT_CHAT_MESSAGE,
            ClientEvent::UpdatePosition(_) => EVENT_UPDATE_POSITION,
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses and shape-checks one inbound frame.
    pub fn decode(frame: &str) -> Result<Self, ValidationError> {
        let envelope: Envelope = serde_json::from_str(frame)?;
        match envelope.event.as_str() {
            EVENT_NEW_PLAYER => Ok(ClientEvent::NewPlayer(player_payload(envelope.data)?)),
            EVENT_UPDATE_POSITION => {
                Ok(ClientEvent::UpdatePosition(player_payload(envelope.data)?))
            }
            EVENT_CHAT_MESSAGE => match envelope.data {
                Some(Value::String(text)) => {
                    check_length("msg", &text, 1, CHAT_MAX_LEN)?;
                    Ok(ClientEvent::ChatMessage(text))
                }
                _ => Err(ValidationError::NotAString),
            },
            _ => Err(ValidationError::UnknownEvent(envelope.event)),
        }
    }
}

fn player_payload(data: Option<Value>) -> Result<Player, ValidationError> {
    let Some(Value::Object(map)) = data else {
        return Err(ValidationError::NotAnObject);
    };

    if let Some(key) = map
        .keys()
        .find(|key| !matches!(key.as_str(), "x" | "y" | "username"))
    {
        return Err(ValidationError::UnknownField(key.clone()));
    }

    let x = number_field(&map, "x")?;
    let y = number_field(&map, "y")?;
    let username = username_field(&map)?;

    Ok(Player { x, y, username })
}

fn number_field(map: &Map<String, Value>, field: &'static str) -> Result<f64, ValidationError> {
    match map.get(field) {
        None | Some(Value::Null) => Err(ValidationError::MissingField(field)),
        Some(value) => value
            .as_f64()
            .filter(|n| n.is_finite())
            .ok_or(ValidationError::NotANumber(field)),
    }
}

fn username_field(map: &Map<String, Value>) -> Result<String, ValidationError> {
    match map.get("username") {
        None | Some(Value::Null) => Err(ValidationError::MissingField("username")),
        Some(Value::String(raw)) => {
            let trimmed = raw.trim();
            check_length("username", trimmed, 1, USERNAME_MAX_LEN)?;
            Ok(trimmed.to_string())
        }
        Some(_) => Err(ValidationError::FieldNotAString("username")),
    }
}

fn check_length(
    field: &'static str,
    value: &str,
    min: usize,
    max: usize,
) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(ValidationError::Length {
            field,
            len,
            min,
            max,
        });
    }
    Ok(())
}
