use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::log::{LogCursor, OrderedLog};
use crate::protocol::EventEnvelope;
use crate::shared::AppError;
use crate::websockets::ConnectionRegistry;

/// Start this instance's single fan-out consumer.
///
/// The cursor is opened before the task is spawned, so anything published
/// after this returns is guaranteed to be seen. The task runs for the life
/// of the instance; if the log becomes unreachable it logs at error level
/// and exits, at which point the process must be restarted.
pub async fn spawn_fanout(
    log: Arc<dyn OrderedLog>,
    registry: Arc<dyn ConnectionRegistry>,
) -> Result<JoinHandle<()>, AppError> {
    let cursor = log.subscribe().await?;
    info!("Fan-out consumer subscribed to event log");

    Ok(tokio::spawn(async move {
        if let Err(e) = run(cursor, registry).await {
            error!(error = %e, "Fan-out consumer terminated; instance requires restart");
        }
    }))
}

async fn run(
    mut cursor: Box<dyn LogCursor>,
    registry: Arc<dyn ConnectionRegistry>,
) -> Result<(), AppError> {
    loop {
        let envelope = cursor.next().await?;
        deliver(&*registry, &envelope).await;
    }
}

/// Deliver one envelope if its destination is connected here; otherwise drop
/// it silently. Another instance holding the connection does the same scan
/// and delivers its own.
async fn deliver(registry: &dyn ConnectionRegistry, envelope: &EventEnvelope) {
    let Some(to) = envelope.to else {
        debug!(kind = ?envelope.kind(), "Envelope without destination, dropped");
        return;
    };

    let json = match serde_json::to_string(envelope) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, kind = ?envelope.kind(), "Failed to serialize envelope");
            return;
        }
    };

    if registry.lookup(to).await.is_some() {
        debug!(to, kind = ?envelope.kind(), "Delivering envelope to local connection");
        registry.send_to_player(to, &json).await;
    } else {
        debug!(to, kind = ?envelope.kind(), "Destination not local, dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::InMemoryEventLog;
    use crate::websockets::InMemoryConnectionRegistry;
    use tokio::sync::mpsc;
    use tokio::time::{timeout, Duration};

    async fn recv_envelope(rx: &mut mpsc::UnboundedReceiver<String>) -> EventEnvelope {
        let json = timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("timed out waiting for delivery")
            .expect("channel closed");
        serde_json::from_str(&json).unwrap()
    }

    #[tokio::test]
    async fn test_delivers_to_locally_registered_player() {
        let log: Arc<dyn OrderedLog> = Arc::new(InMemoryEventLog::default());
        let registry: Arc<dyn ConnectionRegistry> = Arc::new(InMemoryConnectionRegistry::new());
        let _consumer = spawn_fanout(log.clone(), registry.clone()).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register(10, tx).await;

        log.publish(&EventEnvelope::game_started(1, 10)).await.unwrap();

        let delivered = recv_envelope(&mut rx).await;
        assert_eq!(delivered, EventEnvelope::game_started(1, 10));
    }

    #[tokio::test]
    async fn test_drops_envelopes_for_unregistered_players() {
        let log: Arc<dyn OrderedLog> = Arc::new(InMemoryEventLog::default());
        let registry: Arc<dyn ConnectionRegistry> = Arc::new(InMemoryConnectionRegistry::new());
        let _consumer = spawn_fanout(log.clone(), registry.clone()).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register(10, tx).await;

        // Addressed elsewhere; must not reach player 10
        log.publish(&EventEnvelope::game_started(1, 99)).await.unwrap();
        log.publish(&EventEnvelope::game_started(2, 10)).await.unwrap();

        let delivered = recv_envelope(&mut rx).await;
        assert_eq!(delivered, EventEnvelope::game_started(2, 10));
    }

    #[tokio::test]
    async fn test_two_instances_each_deliver_their_own_connections() {
        let log: Arc<dyn OrderedLog> = Arc::new(InMemoryEventLog::default());
        let registry_a: Arc<dyn ConnectionRegistry> = Arc::new(InMemoryConnectionRegistry::new());
        let registry_b: Arc<dyn ConnectionRegistry> = Arc::new(InMemoryConnectionRegistry::new());
        let _consumer_a = spawn_fanout(log.clone(), registry_a.clone()).await.unwrap();
        let _consumer_b = spawn_fanout(log.clone(), registry_b.clone()).await.unwrap();

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        registry_a.register(1, tx_a).await;
        registry_b.register(2, tx_b).await;

        log.publish(&EventEnvelope::game_started(7, 1)).await.unwrap();
        log.publish(&EventEnvelope::game_started(7, 2)).await.unwrap();

        assert_eq!(recv_envelope(&mut rx_a).await, EventEnvelope::game_started(7, 1));
        assert_eq!(recv_envelope(&mut rx_b).await, EventEnvelope::game_started(7, 2));

        // Neither instance delivered the other's envelope
        assert!(timeout(Duration::from_millis(100), rx_a.recv()).await.is_err());
        assert!(timeout(Duration::from_millis(100), rx_b.recv()).await.is_err());
    }
}
