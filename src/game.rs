pub mod board;
pub mod models;
pub mod repository;
pub mod service;

pub use models::{
    Coord, GameBoard, GameId, GameModel, GameState, GameStatus, MoveOutcome, PlayerId, Ship,
    ShipModel, BOARD_SIZE, MAX_SHIP_SIZE,
};
pub use repository::{GameRepository, InMemoryGameRepository, PostgresGameRepository};
pub use service::GameService;
