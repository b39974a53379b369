use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, instrument, warn};

use crate::protocol::EventEnvelope;
use crate::shared::AppError;

/// A single shared, ordered, multi-consumer log of outbound envelopes.
///
/// Publishing is append-only and fire-and-forget. Each subscriber owns its
/// cursor and sees every envelope published after it subscribed, in order.
#[async_trait]
pub trait OrderedLog: Send + Sync {
    async fn publish(&self, envelope: &EventEnvelope) -> Result<(), AppError>;

    async fn subscribe(&self) -> Result<Box<dyn LogCursor>, AppError>;
}

/// One consumer's position in the log
#[async_trait]
pub trait LogCursor: Send {
    /// Next envelope, waiting as long as it takes. An error here is fatal to
    /// the consumer: the log is unreachable and the instance cannot make
    /// forward progress.
    async fn next(&mut self) -> Result<EventEnvelope, AppError>;
}

/// Single-process log on a broadcast channel: every subscriber gets every
/// envelope. A slow subscriber that lags simply skips what it missed
/// (at-most-once delivery).
pub struct InMemoryEventLog {
    sender: broadcast::Sender<EventEnvelope>,
}

impl InMemoryEventLog {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for InMemoryEventLog {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl OrderedLog for InMemoryEventLog {
    async fn publish(&self, envelope: &EventEnvelope) -> Result<(), AppError> {
        match self.sender.send(envelope.clone()) {
            Ok(receivers) => {
                debug!(kind = ?envelope.kind(), receivers, "Envelope published");
            }
            Err(_) => {
                // No consumer running; fire-and-forget means this is not an error
                debug!(kind = ?envelope.kind(), "Envelope published with no consumers");
            }
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<Box<dyn LogCursor>, AppError> {
        Ok(Box::new(InMemoryLogCursor {
            receiver: self.sender.subscribe(),
        }))
    }
}

struct InMemoryLogCursor {
    receiver: broadcast::Receiver<EventEnvelope>,
}

#[async_trait]
impl LogCursor for InMemoryLogCursor {
    async fn next(&mut self) -> Result<EventEnvelope, AppError> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) => return Ok(envelope),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Log consumer lagged, envelopes dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(AppError::Internal);
                }
            }
        }
    }
}

/// Cross-instance log backed by an append-only Postgres table. Consumers
/// poll from their own cursor, so every instance reads every envelope.
pub struct PostgresEventLog {
    pool: PgPool,
    poll_interval: Duration,
}

impl PostgresEventLog {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            poll_interval: Duration::from_millis(250),
        }
    }

    pub fn with_poll_interval(pool: PgPool, poll_interval: Duration) -> Self {
        Self {
            pool,
            poll_interval,
        }
    }
}

#[async_trait]
impl OrderedLog for PostgresEventLog {
    #[instrument(skip(self, envelope))]
    async fn publish(&self, envelope: &EventEnvelope) -> Result<(), AppError> {
        let json = serde_json::to_string(envelope)
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        sqlx::query("INSERT INTO game_events (envelope) VALUES ($1)")
            .bind(json)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to append envelope to log");
                AppError::DatabaseError(e.to_string())
            })?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<Box<dyn LogCursor>, AppError> {
        Ok(Box::new(PostgresLogCursor {
            pool: self.pool.clone(),
            poll_interval: self.poll_interval,
            cursor: 0,
            buffered: VecDeque::new(),
        }))
    }
}

struct PostgresLogCursor {
    pool: PgPool,
    poll_interval: Duration,
    cursor: i64,
    buffered: VecDeque<EventEnvelope>,
}

#[async_trait]
impl LogCursor for PostgresLogCursor {
    async fn next(&mut self) -> Result<EventEnvelope, AppError> {
        loop {
            if let Some(envelope) = self.buffered.pop_front() {
                return Ok(envelope);
            }

            let rows = sqlx::query(
                "SELECT id, envelope FROM game_events WHERE id > $1 ORDER BY id LIMIT 100",
            )
            .bind(self.cursor)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

            if rows.is_empty() {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }

            for row in rows {
                self.cursor = row.get("id");
                let json: String = row.get("envelope");
                match serde_json::from_str(&json) {
                    Ok(envelope) => self.buffered.push_back(envelope),
                    // A malformed row must not wedge the whole consumer
                    Err(e) => warn!(error = %e, id = self.cursor, "Skipping unreadable envelope"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::models::GameState;
    use crate::game::models::BOARD_SIZE;
    use crate::game::models::GameBoard;

    #[tokio::test]
    async fn test_subscriber_sees_envelopes_in_publish_order() {
        let log = InMemoryEventLog::default();
        let mut cursor = log.subscribe().await.unwrap();

        log.publish(&EventEnvelope::game_started(1, 10)).await.unwrap();
        log.publish(&EventEnvelope::game_started(2, 20)).await.unwrap();

        let first = cursor.next().await.unwrap();
        let second = cursor.next().await.unwrap();
        assert_eq!(first, EventEnvelope::game_started(1, 10));
        assert_eq!(second, EventEnvelope::game_started(2, 20));
    }

    #[tokio::test]
    async fn test_publish_without_consumers_is_not_an_error() {
        let log = InMemoryEventLog::default();
        log.publish(&EventEnvelope::error("nobody listening", 1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_every_subscriber_reads_every_envelope() {
        let log = InMemoryEventLog::default();
        let mut a = log.subscribe().await.unwrap();
        let mut b = log.subscribe().await.unwrap();

        let envelope = EventEnvelope::game_update(
            GameState::MyTurn,
            GameBoard::empty(BOARD_SIZE),
            GameBoard::empty(BOARD_SIZE),
            7,
        );
        log.publish(&envelope).await.unwrap();

        assert_eq!(a.next().await.unwrap(), envelope);
        assert_eq!(b.next().await.unwrap(), envelope);
    }
}
