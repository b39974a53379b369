use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use strum_macros::FromRepr;

use crate::game::models::{Coord, GameBoard, GameId, GameState, MoveOutcome, PlayerId, Ship};

use super::payloads::{
    ConnectedPayload, ErrorPayload, GameStartedPayload, GameUpdatePayload, MakeMovePayload,
    MoveResultPayload, PlaceShipsPayload,
};

/// Event kinds, serialized as their wire integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum EventKind {
    /// S→C: which instance owns this connection
    Connected = 0,
    /// C→S: request matchmaking
    Join = 1,
    /// S→C: a session was created for this player
    GameStarted = 2,
    /// S→C: board snapshots plus status tag (includes the turn notice)
    GameUpdate = 3,
    /// C→S: submit a fleet
    PlaceShips = 4,
    /// C→S: fire at a single cell
    MakeMove = 5,
    /// S→C: outcome of the player's own move
    MoveResult = 6,
    /// S→C: error report
    Error = 7,
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = u8::deserialize(deserializer)?;
        EventKind::from_repr(raw)
            .ok_or_else(|| de::Error::custom(format!("unknown event kind {}", raw)))
    }
}

/// Kind-specific payload, decoded against the declared event kind.
///
/// Unlike the loose "any object" payload this replaces, a payload that does
/// not match its declared kind fails deserialization instead of surfacing
/// later as a missing field.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Connected(ConnectedPayload),
    Join,
    GameStarted(GameStartedPayload),
    GameUpdate(GameUpdatePayload),
    PlaceShips(PlaceShipsPayload),
    MakeMove(MakeMovePayload),
    MoveResult(MoveResultPayload),
    Error(ErrorPayload),
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::Connected(_) => EventKind::Connected,
            EventPayload::Join => EventKind::Join,
            EventPayload::GameStarted(_) => EventKind::GameStarted,
            EventPayload::GameUpdate(_) => EventKind::GameUpdate,
            EventPayload::PlaceShips(_) => EventKind::PlaceShips,
            EventPayload::MakeMove(_) => EventKind::MakeMove,
            EventPayload::MoveResult(_) => EventKind::MoveResult,
            EventPayload::Error(_) => EventKind::Error,
        }
    }

    fn decode(kind: EventKind, value: Option<Value>) -> Result<Self, String> {
        fn typed<T: serde::de::DeserializeOwned>(
            kind: EventKind,
            value: Option<Value>,
        ) -> Result<T, String> {
            let value = value
                .filter(|v| !v.is_null())
                .ok_or_else(|| format!("missing payload for event kind {:?}", kind))?;
            serde_json::from_value(value)
                .map_err(|e| format!("invalid payload for event kind {:?}: {}", kind, e))
        }

        match kind {
            EventKind::Join => match value {
                None | Some(Value::Null) => Ok(EventPayload::Join),
                Some(Value::Object(map)) if map.is_empty() => Ok(EventPayload::Join),
                Some(_) => Err("Join carries no payload".to_string()),
            },
            EventKind::Connected => typed(kind, value).map(EventPayload::Connected),
            EventKind::GameStarted => typed(kind, value).map(EventPayload::GameStarted),
            EventKind::GameUpdate => typed(kind, value).map(EventPayload::GameUpdate),
            EventKind::PlaceShips => typed(kind, value).map(EventPayload::PlaceShips),
            EventKind::MakeMove => typed(kind, value).map(EventPayload::MakeMove),
            EventKind::MoveResult => typed(kind, value).map(EventPayload::MoveResult),
            EventKind::Error => typed(kind, value).map(EventPayload::Error),
        }
    }

    fn to_value(&self) -> Result<Option<Value>, serde_json::Error> {
        let value = match self {
            EventPayload::Join => return Ok(None),
            EventPayload::Connected(p) => serde_json::to_value(p)?,
            EventPayload::GameStarted(p) => serde_json::to_value(p)?,
            EventPayload::GameUpdate(p) => serde_json::to_value(p)?,
            EventPayload::PlaceShips(p) => serde_json::to_value(p)?,
            EventPayload::MakeMove(p) => serde_json::to_value(p)?,
            EventPayload::MoveResult(p) => serde_json::to_value(p)?,
            EventPayload::Error(p) => serde_json::to_value(p)?,
        };
        Ok(Some(value))
    }
}

/// The message unit exchanged over sockets and over the shared log.
///
/// `to` is set on outbound (server-to-client) envelopes only; the fan-out
/// consumer uses it to decide whether this instance can deliver.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    pub payload: EventPayload,
    pub to: Option<PlayerId>,
}

/// Raw wire shape: `{"Event": <int>, "Payload": <object>, "To": <int>}`
#[derive(Serialize, Deserialize)]
struct WireEnvelope {
    #[serde(rename = "Event")]
    event: EventKind,
    #[serde(rename = "Payload", default, skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
    #[serde(rename = "To", default, skip_serializing_if = "Option::is_none")]
    to: Option<PlayerId>,
}

impl EventEnvelope {
    pub fn new(payload: EventPayload, to: Option<PlayerId>) -> Self {
        Self { payload, to }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// Create a CONNECTED envelope (sent directly on the socket, no routing)
    pub fn connected(server: impl Into<String>) -> Self {
        Self::new(
            EventPayload::Connected(ConnectedPayload {
                server: server.into(),
            }),
            None,
        )
    }

    /// Create a GAME_STARTED envelope addressed to one player
    pub fn game_started(game_id: GameId, to: PlayerId) -> Self {
        Self::new(
            EventPayload::GameStarted(GameStartedPayload { game_id }),
            Some(to),
        )
    }

    /// Create a GAME_UPDATE envelope addressed to one player
    pub fn game_update(
        status: GameState,
        my_board: GameBoard,
        hit_board: GameBoard,
        to: PlayerId,
    ) -> Self {
        Self::new(
            EventPayload::GameUpdate(GameUpdatePayload {
                status,
                my_board,
                hit_board,
            }),
            Some(to),
        )
    }

    /// Create a MOVE_RESULT envelope addressed to the mover
    pub fn move_result(
        location: Coord,
        outcome: MoveOutcome,
        my_board: GameBoard,
        hit_board: GameBoard,
        to: PlayerId,
    ) -> Self {
        Self::new(
            EventPayload::MoveResult(MoveResultPayload {
                location,
                outcome,
                my_board,
                hit_board,
            }),
            Some(to),
        )
    }

    /// Create an ERROR envelope addressed to one player
    pub fn error(message: impl Into<String>, to: PlayerId) -> Self {
        Self::new(EventPayload::Error(ErrorPayload::new(message)), Some(to))
    }

    /// Create a PLACE_SHIPS envelope (client-side / test traffic)
    pub fn place_ships(ships: Vec<Ship>) -> Self {
        Self::new(EventPayload::PlaceShips(PlaceShipsPayload { ships }), None)
    }

    /// Create a MAKE_MOVE envelope (client-side / test traffic)
    pub fn make_move(location: Coord) -> Self {
        Self::new(EventPayload::MakeMove(MakeMovePayload { location }), None)
    }

    /// Create a JOIN envelope (client-side / test traffic)
    pub fn join() -> Self {
        Self::new(EventPayload::Join, None)
    }
}

impl Serialize for EventEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = WireEnvelope {
            event: self.kind(),
            payload: self.payload.to_value().map_err(serde::ser::Error::custom)?,
            to: self.to,
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EventEnvelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireEnvelope::deserialize(deserializer)?;
        let payload = EventPayload::decode(wire.event, wire.payload).map_err(de::Error::custom)?;
        Ok(EventEnvelope {
            payload,
            to: wire.to,
        })
    }
}
