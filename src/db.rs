use sqlx::PgPool;
use tracing::{info, instrument};

use crate::shared::AppError;

/// Connects to PostgreSQL and makes sure the schema exists
#[instrument(skip(database_url))]
pub async fn connect(database_url: &str) -> Result<PgPool, AppError> {
    let pool = PgPool::connect(database_url)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;
    ensure_schema(&pool).await?;
    info!("Connected to PostgreSQL");
    Ok(pool)
}

/// Idempotent schema setup, run once at startup
pub async fn ensure_schema(pool: &PgPool) -> Result<(), AppError> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS users (
            id BIGSERIAL PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password TEXT NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS games (
            id BIGSERIAL PRIMARY KEY,
            player1 BIGINT NOT NULL,
            player2 BIGINT NOT NULL,
            status TEXT NOT NULL DEFAULT 'Started',
            winner BIGINT,
            current_turn BIGINT
        )",
        "CREATE TABLE IF NOT EXISTS ships (
            id BIGSERIAL PRIMARY KEY,
            game_id BIGINT NOT NULL REFERENCES games(id),
            player_id BIGINT NOT NULL,
            size INT NOT NULL,
            cells TEXT NOT NULL,
            sunk BOOLEAN NOT NULL DEFAULT FALSE
        )",
        "CREATE TABLE IF NOT EXISTS matchmaking_queue (
            id BIGSERIAL PRIMARY KEY,
            player_id BIGINT NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS game_events (
            id BIGSERIAL PRIMARY KEY,
            envelope TEXT NOT NULL
        )",
    ];

    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
    }
    Ok(())
}
