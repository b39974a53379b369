// Library crate for the battleship game server
// This file exposes the public API for integration tests

pub mod db;
pub mod event;
pub mod game;
pub mod matchmaking;
pub mod protocol;
pub mod session;
pub mod shared;
pub mod websockets;

// Re-export commonly used types for easier access in tests
pub use event::{spawn_fanout, InMemoryEventLog, LogCursor, OrderedLog};
pub use game::{GameService, GameState, MoveOutcome};
pub use matchmaking::{InMemoryMatchQueue, MatchQueue};
pub use protocol::{EventEnvelope, EventKind, EventPayload};
pub use session::AuthService;
pub use shared::{AppError, AppState};
pub use websockets::{ConnectionRegistry, InMemoryConnectionRegistry, MessageHandler};
