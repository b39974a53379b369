use serde::{Deserialize, Serialize};

use crate::game::models::{Coord, GameBoard, GameId, GameState, MoveOutcome, Ship};

/// Sent to a client right after its socket is upgraded, naming the instance
/// that owns the connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ConnectedPayload {
    pub server: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameStartedPayload {
    #[serde(rename = "GameID")]
    pub game_id: GameId,
}

/// Board snapshots plus a status tag, from the receiving player's point of
/// view. `my_board` carries the player's own fleet with per-cell hit flags,
/// `hit_board` only the opponent cells the player has already hit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct GameUpdatePayload {
    pub status: GameState,
    pub my_board: GameBoard,
    pub hit_board: GameBoard,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct PlaceShipsPayload {
    pub ships: Vec<Ship>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct MakeMovePayload {
    pub location: Coord,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct MoveResultPayload {
    pub location: Coord,
    pub outcome: MoveOutcome,
    pub my_board: GameBoard,
    pub hit_board: GameBoard,
}

// The wire field is "Err", not "Error" or "Message".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorPayload {
    #[serde(rename = "Err")]
    pub err: String,
}

impl ErrorPayload {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            err: message.into(),
        }
    }
}
