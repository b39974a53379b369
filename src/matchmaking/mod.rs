// Cross-instance matchmaking: an atomic FIFO of waiting players.

pub use queue::{InMemoryMatchQueue, MatchOutcome, MatchQueue, PostgresMatchQueue};

mod queue;
