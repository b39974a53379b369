use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{info, instrument};

use crate::game::PlayerId;
use crate::shared::AppError;

/// Storage seam for user accounts. An unknown email registers a new account
/// on first login; a known email must present the stored password.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn validate_login(&self, email: &str, password: &str) -> Result<PlayerId, AppError>;
}

/// In-memory user store for development and testing
pub struct InMemoryUserRepository {
    users: Mutex<Store>,
}

struct Store {
    by_email: HashMap<String, (PlayerId, String)>,
    next_id: PlayerId,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(Store {
                by_email: HashMap::new(),
                next_id: 1,
            }),
        }
    }
}

impl Default for InMemoryUserRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn validate_login(&self, email: &str, password: &str) -> Result<PlayerId, AppError> {
        let mut store = self.users.lock().unwrap();

        if let Some((id, stored)) = store.by_email.get(email) {
            if stored == password {
                return Ok(*id);
            }
            return Err(AppError::Unauthorized("Invalid password".to_string()));
        }

        let id = store.next_id;
        store.next_id += 1;
        store
            .by_email
            .insert(email.to_string(), (id, password.to_string()));
        Ok(id)
    }
}

/// PostgreSQL-backed user store
pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    #[instrument(skip(self, password))]
    async fn validate_login(&self, email: &str, password: &str) -> Result<PlayerId, AppError> {
        let existing = sqlx::query("SELECT id, password FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        if let Some(row) = existing {
            let stored: String = row
                .try_get("password")
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;
            if stored != password {
                return Err(AppError::Unauthorized("Invalid password".to_string()));
            }
            return row
                .try_get("id")
                .map_err(|e| AppError::DatabaseError(e.to_string()));
        }

        // First login with this email registers the account
        let row = sqlx::query("INSERT INTO users (email, password) VALUES ($1, $2) RETURNING id")
            .bind(email)
            .bind(password)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        let id: PlayerId = row
            .try_get("id")
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        info!(player_id = id, "Registered new user on first login");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_login_registers_account() {
        let repo = InMemoryUserRepository::new();
        let id = repo.validate_login("a@example.com", "hunter2").await.unwrap();
        assert_eq!(id, 1);
    }

    #[tokio::test]
    async fn test_repeat_login_returns_same_id() {
        let repo = InMemoryUserRepository::new();
        let first = repo.validate_login("a@example.com", "hunter2").await.unwrap();
        let second = repo.validate_login("a@example.com", "hunter2").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_wrong_password_rejected() {
        let repo = InMemoryUserRepository::new();
        repo.validate_login("a@example.com", "hunter2").await.unwrap();
        let result = repo.validate_login("a@example.com", "wrong").await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_distinct_emails_get_distinct_ids() {
        let repo = InMemoryUserRepository::new();
        let a = repo.validate_login("a@example.com", "pw").await.unwrap();
        let b = repo.validate_login("b@example.com", "pw").await.unwrap();
        assert_ne!(a, b);
    }
}
