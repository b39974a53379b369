use async_trait::async_trait;
use axum::{
    extract::{State, WebSocketUpgrade},
    http::HeaderMap,
    response::Response,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::event::OrderedLog;
use crate::game::models::PlayerId;
use crate::game::GameService;
use crate::protocol::{EventEnvelope, EventPayload};
use crate::shared::{AppError, AppState};

use super::socket::{Connection, MessageHandler};

/// Routes inbound envelopes from one socket into the game state machine.
///
/// Any error coming back from the state machine is turned into an Error
/// envelope published to the originating player; no state is mutated for
/// rejected input.
pub struct EnvelopeRouter {
    game_service: Arc<GameService>,
    event_log: Arc<dyn OrderedLog>,
}

impl EnvelopeRouter {
    pub fn new(game_service: Arc<GameService>, event_log: Arc<dyn OrderedLog>) -> Self {
        Self {
            game_service,
            event_log,
        }
    }

    async fn dispatch(&self, player: PlayerId, message: &str) -> Result<(), AppError> {
        let envelope: EventEnvelope = serde_json::from_str(message)
            .map_err(|e| AppError::Validation(format!("malformed envelope: {}", e)))?;

        match envelope.payload {
            EventPayload::Join => self.game_service.join(player).await,
            EventPayload::PlaceShips(payload) => {
                self.game_service.place_ships(player, payload.ships).await
            }
            EventPayload::MakeMove(payload) => {
                self.game_service.make_move(player, payload.location).await
            }
            other => Err(AppError::Validation(format!(
                "event kind {:?} is not a client event",
                other.kind()
            ))),
        }
    }
}

#[async_trait]
impl MessageHandler for EnvelopeRouter {
    async fn handle_message(&self, player: PlayerId, message: String) {
        info!(player, message = %message, "Received message");

        if let Err(e) = self.dispatch(player, &message).await {
            warn!(player, error = %e, "Inbound envelope rejected");
            let error_envelope = EventEnvelope::error(e.to_string(), player);
            if let Err(publish_err) = self.event_log.publish(&error_envelope).await {
                warn!(player, error = %publish_err, "Failed to publish error envelope");
            }
        }
    }
}

/// WebSocket endpoint, authenticated via the Sec-WebSocket-Protocol header.
/// GET /events with the session JWT in that header; auth failure rejects the
/// request before any upgrade happens.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(app_state): State<AppState>,
) -> Result<Response, AppError> {
    let token = headers
        .get("sec-websocket-protocol")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            warn!("Missing or invalid Sec-WebSocket-Protocol header");
            AppError::Unauthorized("Missing authentication token".to_string())
        })?;

    let player = app_state.auth_service.validate_session(token).await?;

    info!(player, "WebSocket authentication successful");

    Ok(ws.on_upgrade(move |socket| handle_websocket_connection(socket, player, app_state)))
}

/// Handle the upgraded WebSocket connection
async fn handle_websocket_connection(
    socket: axum::extract::ws::WebSocket,
    player: PlayerId,
    app_state: AppState,
) {
    info!(player, instance = %app_state.instance, "WebSocket connection established");

    // Outbound channel (fan-out -> client)
    let (outbound_sender, outbound_receiver) = mpsc::unbounded_channel::<String>();

    // Tell the client which instance owns it before anything else arrives
    let connected = EventEnvelope::connected(app_state.instance.clone());
    match serde_json::to_string(&connected) {
        Ok(json) => {
            let _ = outbound_sender.send(json);
        }
        Err(e) => warn!(player, error = %e, "Failed to serialize Connected envelope"),
    }

    app_state
        .registry
        .register(player, outbound_sender)
        .await;
    // The registry now holds the only sender; a reconnect that replaces the
    // entry drops it and this loop ends.

    let message_handler = Arc::new(EnvelopeRouter::new(
        app_state.game_service.clone(),
        app_state.event_log.clone(),
    ));

    let connection = Connection::new(
        player,
        Box::new(socket),
        outbound_receiver,
        message_handler,
    );

    match connection.run().await {
        Ok(()) => {
            info!(player, "WebSocket connection closed cleanly");
        }
        Err(e) => {
            warn!(player, error = ?e, "WebSocket connection error");
        }
    }

    // Transient I/O failure or disconnect: drop the registry entry, leave
    // all session state alone
    app_state.registry.remove(player).await;

    info!(player, "WebSocket connection cleaned up");
}
