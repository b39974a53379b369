use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use super::repository::UserRepository;
use super::token::TokenConfig;
use super::types::SessionResponse;
use crate::game::PlayerId;
use crate::shared::AppError;

/// Issues and validates session tokens on top of the user store
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    token_config: TokenConfig,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self {
            users,
            token_config: TokenConfig::new(),
        }
    }

    /// Checks credentials (registering unknown emails) and issues a JWT
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionResponse, AppError> {
        let player_id = self.users.validate_login(email, password).await?;
        let session_id = Uuid::new_v4().to_string();
        let token = self.token_config.create_token(session_id, player_id)?;

        info!(player_id, "Session issued");
        Ok(SessionResponse {
            session_id: token,
            player_id,
        })
    }

    /// Resolves a session token to the player it was issued for
    #[instrument(skip(self, token))]
    pub async fn validate_session(&self, token: &str) -> Result<PlayerId, AppError> {
        let claims = self.token_config.validate_token(token)?;
        Ok(claims.player_id)
    }
}
