use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use battleship::event::{spawn_fanout, InMemoryEventLog, OrderedLog, PostgresEventLog};
use battleship::game::repository::{InMemoryGameRepository, PostgresGameRepository};
use battleship::game::{GameRepository, GameService};
use battleship::matchmaking::{InMemoryMatchQueue, MatchQueue, PostgresMatchQueue};
use battleship::session::repository::{InMemoryUserRepository, PostgresUserRepository};
use battleship::session::{create_session, AuthService};
use battleship::shared::AppState;
use battleship::websockets::{websocket_handler, InMemoryConnectionRegistry};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "battleship=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting battleship game server");

    let instance = std::env::var("INSTANCE")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "battleship-local".to_string());

    // With DATABASE_URL all shared state lives in PostgreSQL so multiple
    // instances can cooperate; without it everything is in-process.
    let (users, games, queue, event_log): (
        Arc<dyn battleship::session::repository::UserRepository>,
        Arc<dyn GameRepository>,
        Arc<dyn MatchQueue>,
        Arc<dyn OrderedLog>,
    ) = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            let pool = battleship::db::connect(&database_url)
                .await
                .expect("Failed to connect to database");
            (
                Arc::new(PostgresUserRepository::new(pool.clone())),
                Arc::new(PostgresGameRepository::new(pool.clone())),
                Arc::new(PostgresMatchQueue::new(pool.clone())),
                Arc::new(PostgresEventLog::new(pool)),
            )
        }
        Err(_) => {
            info!("DATABASE_URL not set, using in-memory state (single instance only)");
            (
                Arc::new(InMemoryUserRepository::new()),
                Arc::new(InMemoryGameRepository::new()),
                Arc::new(InMemoryMatchQueue::new()),
                Arc::new(InMemoryEventLog::new(1024)),
            )
        }
    };

    let registry = Arc::new(InMemoryConnectionRegistry::new());
    let auth_service = Arc::new(AuthService::new(users));
    let game_service = Arc::new(GameService::new(games, queue, event_log.clone()));

    let app_state = AppState::new(
        auth_service,
        game_service,
        registry.clone(),
        event_log.clone(),
        instance.clone(),
    );

    // One fan-out consumer per instance delivers log entries to local sockets
    spawn_fanout(event_log, registry)
        .await
        .expect("Failed to start fan-out consumer");

    let app = Router::new()
        .route("/", get(|| async { "battleship" }))
        .route("/session", post(create_session))
        .route("/events", get(websocket_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .expect("Failed to bind listener");
    info!(instance = %instance, port = %port, "Server running");
    axum::serve(listener, app).await.expect("Server error");
}
