use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use battleship::event::{spawn_fanout, InMemoryEventLog};
use battleship::game::repository::InMemoryGameRepository;
use battleship::game::{Coord, GameService, PlayerId, Ship};
use battleship::matchmaking::InMemoryMatchQueue;
use battleship::websockets::{
    ConnectionRegistry, EnvelopeRouter, InMemoryConnectionRegistry, MessageHandler,
};

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

/// In-memory stack with the fan-out consumer running and one registered
/// outbound channel per player, so tests observe exactly what a connected
/// client would receive.
pub struct TestSetup {
    pub game_service: Arc<GameService>,
    pub registry: Arc<InMemoryConnectionRegistry>,
    pub router: EnvelopeRouter,
    pub players: Vec<PlayerId>,
    receivers: Mutex<HashMap<PlayerId, mpsc::UnboundedReceiver<String>>>,
    pub _fanout_handle: JoinHandle<()>,
}

pub struct TestSetupBuilder {
    players: Vec<PlayerId>,
    rng_seed: u64,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            players: vec![],
            rng_seed: 7,
        }
    }

    pub fn with_players(mut self, players: Vec<PlayerId>) -> Self {
        self.players = players;
        self
    }

    pub fn with_two_players(self) -> Self {
        self.with_players(vec![1, 2])
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = seed;
        self
    }

    pub async fn build(self) -> TestSetup {
        let event_log = Arc::new(InMemoryEventLog::new(256));
        let registry = Arc::new(InMemoryConnectionRegistry::new());
        let game_service = Arc::new(GameService::with_rng_seed(
            Arc::new(InMemoryGameRepository::new()),
            Arc::new(InMemoryMatchQueue::new()),
            event_log.clone(),
            self.rng_seed,
        ));

        let fanout_handle = spawn_fanout(event_log.clone(), registry.clone())
            .await
            .unwrap();

        let mut receivers = HashMap::new();
        for &player in &self.players {
            let (sender, receiver) = mpsc::unbounded_channel();
            registry.register(player, sender).await;
            receivers.insert(player, receiver);
        }

        TestSetup {
            router: EnvelopeRouter::new(game_service.clone(), event_log),
            game_service,
            registry,
            players: self.players,
            receivers: Mutex::new(receivers),
            _fanout_handle: fanout_handle,
        }
    }
}

impl TestSetup {
    /// Feed a raw client frame through the inbound router
    pub async fn send_raw(&self, player: PlayerId, frame: &str) {
        self.router.handle_message(player, frame.to_string()).await;
    }

    pub async fn send_join(&self, player: PlayerId) {
        self.send_raw(player, r#"{"Event":1}"#).await;
    }

    pub async fn send_place_ships(&self, player: PlayerId, ships: &[Ship]) {
        let payload = serde_json::json!({ "Ships": ships });
        let frame = serde_json::json!({ "Event": 4, "Payload": payload });
        self.send_raw(player, &frame.to_string()).await;
    }

    pub async fn send_move(&self, player: PlayerId, x: i32, y: i32) {
        let frame =
            serde_json::json!({ "Event": 5, "Payload": { "Location": { "X": x, "Y": y } } });
        self.send_raw(player, &frame.to_string()).await;
    }

    /// Takes ownership of a player's receiver, simulating a dropped socket
    pub async fn take_receiver(&self, player: PlayerId) -> mpsc::UnboundedReceiver<String> {
        self.receivers
            .lock()
            .await
            .remove(&player)
            .expect("player has no registered receiver")
    }

    /// Re-registers a player with a fresh channel, as a reconnect would
    pub async fn reconnect(&self, player: PlayerId) {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.registry.register(player, sender).await;
        self.receivers.lock().await.insert(player, receiver);
    }

    pub(crate) async fn recv_frame(&self, player: PlayerId) -> Option<String> {
        let mut receivers = self.receivers.lock().await;
        let receiver = receivers
            .get_mut(&player)
            .expect("player has no registered receiver");
        tokio::time::timeout(std::time::Duration::from_secs(1), receiver.recv())
            .await
            .ok()
            .flatten()
    }

    pub(crate) async fn try_recv_frame(&self, player: PlayerId) -> Option<String> {
        let mut receivers = self.receivers.lock().await;
        let receiver = receivers
            .get_mut(&player)
            .expect("player has no registered receiver");
        tokio::time::timeout(std::time::Duration::from_millis(100), receiver.recv())
            .await
            .ok()
            .flatten()
    }
}

/// Single-cell fleet: one shot at (4, 4) sinks it and ends the game
pub fn single_cell_fleet() -> Vec<Ship> {
    vec![ship(1, &[(4, 4)])]
}

pub fn standard_fleet() -> Vec<Ship> {
    vec![
        ship(2, &[(0, 0), (0, 1)]),
        ship(3, &[(2, 2), (3, 2), (4, 2)]),
    ]
}

pub fn ship(size: u8, cells: &[(i32, i32)]) -> Ship {
    Ship {
        size,
        location: cells.iter().map(|&(x, y)| Coord::new(x, y)).collect(),
        sunk: false,
    }
}
