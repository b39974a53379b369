use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use strum_macros::{Display, EnumString, FromRepr};

/// Opaque player identifier, issued by the auth collaborator
pub type PlayerId = i64;

/// Game session identifier, issued by the persistence collaborator
pub type GameId = i64;

/// Fixed square board edge length
pub const BOARD_SIZE: usize = 9;

/// Largest allowed ship, in cells
pub const MAX_SHIP_SIZE: usize = 5;

/// A single cell: coordinates plus whether the segment there has been hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Coord {
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub hit: bool,
}

impl Coord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y, hit: false }
    }

    pub fn in_bounds(&self) -> bool {
        (0..BOARD_SIZE as i32).contains(&self.x) && (0..BOARD_SIZE as i32).contains(&self.y)
    }
}

/// A ship as submitted by a client: size plus ordered segment cells
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Ship {
    pub size: u8,
    pub location: Vec<Coord>,
    #[serde(default)]
    pub sunk: bool,
}

/// A persisted ship: the submitted shape plus storage identity
#[derive(Debug, Clone, PartialEq)]
pub struct ShipModel {
    pub id: i64,
    pub game_id: GameId,
    pub player_id: PlayerId,
    pub size: u8,
    pub cells: Vec<Coord>,
    pub sunk: bool,
}

impl ShipModel {
    pub fn all_cells_hit(&self) -> bool {
        self.cells.iter().all(|c| c.hit)
    }
}

/// Derived square grid view of one side of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GameBoard {
    pub coords: Vec<Vec<Coord>>,
}

impl GameBoard {
    /// An all-empty N×N board
    pub fn empty(size: usize) -> Self {
        let coords = (0..size as i32)
            .map(|x| (0..size as i32).map(|y| Coord::new(x, y)).collect())
            .collect();
        Self { coords }
    }
}

/// Session lifecycle status as persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum GameStatus {
    Started,
    Completed,
}

/// A game session between two distinct players
#[derive(Debug, Clone, PartialEq)]
pub struct GameModel {
    pub id: GameId,
    pub player1: PlayerId,
    pub player2: PlayerId,
    pub status: GameStatus,
    pub winner: Option<PlayerId>,
    /// None until both fleets are placed and first turn is assigned
    pub current_turn: Option<PlayerId>,
}

impl GameModel {
    pub fn has_player(&self, player: PlayerId) -> bool {
        self.player1 == player || self.player2 == player
    }

    pub fn opponent_of(&self, player: PlayerId) -> Option<PlayerId> {
        if player == self.player1 {
            Some(self.player2)
        } else if player == self.player2 {
            Some(self.player1)
        } else {
            None
        }
    }
}

/// Status tag carried in GameUpdate payloads, serialized as its wire integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum GameState {
    Won = 1,
    Lost = 2,
    MyTurn = 3,
    NotMyTurn = 4,
}

/// Outcome tag carried in MoveResult payloads, serialized as its wire integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum MoveOutcome {
    Won = 1,
    Lost = 2,
    ShipSunk = 3,
    ShipHit = 4,
    ShipMiss = 5,
}

impl Serialize for GameState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for GameState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = u8::deserialize(deserializer)?;
        GameState::from_repr(raw)
            .ok_or_else(|| de::Error::custom(format!("unknown game state {}", raw)))
    }
}

impl Serialize for MoveOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for MoveOutcome {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = u8::deserialize(deserializer)?;
        MoveOutcome::from_repr(raw)
            .ok_or_else(|| de::Error::custom(format!("unknown move outcome {}", raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_game_status_text_roundtrip() {
        assert_eq!(GameStatus::Started.to_string(), "Started");
        assert_eq!(GameStatus::from_str("Completed").unwrap(), GameStatus::Completed);
        assert!(GameStatus::from_str("Paused").is_err());
    }

    #[test]
    fn test_opponent_of() {
        let game = GameModel {
            id: 1,
            player1: 10,
            player2: 20,
            status: GameStatus::Started,
            winner: None,
            current_turn: None,
        };
        assert_eq!(game.opponent_of(10), Some(20));
        assert_eq!(game.opponent_of(20), Some(10));
        assert_eq!(game.opponent_of(30), None);
    }

    #[test]
    fn test_coord_bounds() {
        assert!(Coord::new(0, 0).in_bounds());
        assert!(Coord::new(8, 8).in_bounds());
        assert!(!Coord::new(9, 0).in_bounds());
        assert!(!Coord::new(0, -1).in_bounds());
    }

    #[test]
    fn test_state_tags_serialize_as_integers() {
        assert_eq!(serde_json::to_string(&GameState::Won).unwrap(), "1");
        assert_eq!(serde_json::to_string(&MoveOutcome::ShipMiss).unwrap(), "5");
        assert!(serde_json::from_str::<GameState>("9").is_err());
    }
}
