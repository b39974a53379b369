use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::VecDeque;
use tracing::{debug, instrument};

use crate::game::models::PlayerId;
use crate::shared::AppError;

/// Result of one matchmaking attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// The caller was paired with the player who was waiting
    Matched(PlayerId),
    /// Nobody was waiting; the caller is now at the tail of the queue
    Waiting,
}

/// Shared FIFO of waiting players.
///
/// `try_match` is a single atomic pop-or-push: two concurrent callers on an
/// empty queue must never both enqueue, and no two callers may pop the same
/// entry. No dedup is performed; callers invoke this once per join request.
#[async_trait]
pub trait MatchQueue: Send + Sync {
    async fn try_match(&self, player: PlayerId) -> Result<MatchOutcome, AppError>;
}

/// Single-process implementation: one mutex makes pop-or-push atomic
pub struct InMemoryMatchQueue {
    waiting: tokio::sync::Mutex<VecDeque<PlayerId>>,
}

impl Default for InMemoryMatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMatchQueue {
    pub fn new() -> Self {
        Self {
            waiting: tokio::sync::Mutex::new(VecDeque::new()),
        }
    }
}

#[async_trait]
impl MatchQueue for InMemoryMatchQueue {
    #[instrument(skip(self))]
    async fn try_match(&self, player: PlayerId) -> Result<MatchOutcome, AppError> {
        let mut waiting = self.waiting.lock().await;
        match waiting.pop_front() {
            Some(opponent) => {
                debug!(player, opponent, "Matched with waiting player");
                Ok(MatchOutcome::Matched(opponent))
            }
            None => {
                waiting.push_back(player);
                debug!(player, "Queue empty, now waiting");
                Ok(MatchOutcome::Waiting)
            }
        }
    }
}

/// Advisory lock key serializing queue transactions across instances
const QUEUE_LOCK_KEY: i64 = 0x6d617463685f71; // "match_q"

/// Cross-instance implementation backed by a Postgres table.
///
/// A transaction-scoped advisory lock serializes the pop-or-push across all
/// server instances, which is what makes the operation atomic rather than a
/// separately observable check-then-act.
pub struct PostgresMatchQueue {
    pool: PgPool,
}

impl PostgresMatchQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MatchQueue for PostgresMatchQueue {
    #[instrument(skip(self))]
    async fn try_match(&self, player: PlayerId) -> Result<MatchOutcome, AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(QUEUE_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        let head = sqlx::query(
            "DELETE FROM matchmaking_queue \
             WHERE id = (SELECT id FROM matchmaking_queue ORDER BY id LIMIT 1) \
             RETURNING player_id",
        )
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        let outcome = match head {
            Some(row) => MatchOutcome::Matched(row.get("player_id")),
            None => {
                sqlx::query("INSERT INTO matchmaking_queue (player_id) VALUES ($1)")
                    .bind(player)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| AppError::DatabaseError(e.to_string()))?;
                MatchOutcome::Waiting
            }
        };

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        debug!(player, ?outcome, "Matchmaking attempt resolved");
        Ok(outcome)
    }
}
