use axum::{extract::State, Json};
use tracing::{info, instrument};

use super::types::{LoginRequest, SessionResponse};
use crate::shared::{AppError, AppState};

/// HTTP handler for creating a new session
///
/// POST /session with JSON credentials
/// Returns a JWT token as session_id plus the resolved player id
#[instrument(name = "create_session", skip(state, credentials))]
pub async fn create_session(
    State(state): State<AppState>,
    Json(credentials): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    info!(email = %credentials.email, "Creating new session");

    let session = state
        .auth_service
        .login(&credentials.email, &credentials.password)
        .await?;

    info!(player_id = session.player_id, "Session created successfully");
    Ok(Json(session))
}
