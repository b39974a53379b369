use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::game::models::PlayerId;

/// Instance-local map from player to live connection handle.
///
/// `register` replaces any prior entry without error: last connection wins.
/// The replaced sender is dropped here, which closes the orphaned
/// connection's outbound channel and terminates its socket loop.
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    async fn register(&self, player: PlayerId, sender: mpsc::UnboundedSender<String>);

    async fn lookup(&self, player: PlayerId) -> Option<mpsc::UnboundedSender<String>>;

    /// Idempotent; removing an absent player is not an error
    async fn remove(&self, player: PlayerId);

    /// Best-effort delivery; silently does nothing when the player is not
    /// registered on this instance
    async fn send_to_player(&self, player: PlayerId, message: &str);
}

pub struct InMemoryConnectionRegistry {
    // player id -> outbound sender
    connections: Arc<RwLock<HashMap<PlayerId, mpsc::UnboundedSender<String>>>>,
}

impl Default for InMemoryConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl ConnectionRegistry for InMemoryConnectionRegistry {
    async fn register(&self, player: PlayerId, sender: mpsc::UnboundedSender<String>) {
        let mut connections = self.connections.write().await;
        if connections.insert(player, sender).is_some() {
            debug!(player, "Replaced existing connection, old handle orphaned");
        }
    }

    async fn remove(&self, player: PlayerId) {
        let mut connections = self.connections.write().await;
        connections.remove(&player);
    }

    async fn lookup(&self, player: PlayerId) -> Option<mpsc::UnboundedSender<String>> {
        let connections = self.connections.read().await;
        connections.get(&player).cloned()
    }

    async fn send_to_player(&self, player: PlayerId, message: &str) {
        let connections = self.connections.read().await;
        if let Some(sender) = connections.get(&player) {
            let _ = sender.send(message.to_string());
        }
    }
}
