//! Test assertion helpers - fluent API for verifying delivered envelopes
#![allow(dead_code)] // Test utilities may not all be used in every test

use serde_json::Value;

use battleship::game::PlayerId;
use battleship::protocol::EventKind;

use super::setup::TestSetup;

// ============================================================================
// Assertion Helpers
// ============================================================================

pub struct EnvelopeAssertion<'a> {
    setup: &'a TestSetup,
    player: PlayerId,
}

impl<'a> EnvelopeAssertion<'a> {
    pub fn for_player(setup: &'a TestSetup, player: PlayerId) -> Self {
        Self { setup, player }
    }

    /// Consume the next delivered frame and assert its event kind, returning
    /// the decoded payload for further inspection
    pub async fn received_kind(&self, expected: EventKind) -> Value {
        let frame = self
            .setup
            .recv_frame(self.player)
            .await
            .unwrap_or_else(|| panic!("player {} should have received a frame", self.player));

        let value: Value = serde_json::from_str(&frame).unwrap();
        let kind = value["Event"]
            .as_u64()
            .unwrap_or_else(|| panic!("frame missing Event discriminant: {}", frame));
        assert_eq!(
            kind, expected as u64,
            "player {} received wrong event kind in {}",
            self.player, frame
        );
        value["Payload"].clone()
    }

    /// Assert no frame arrives within the grace window
    pub async fn received_nothing(&self) {
        if let Some(frame) = self.setup.try_recv_frame(self.player).await {
            panic!(
                "player {} should have received nothing, got {}",
                self.player, frame
            );
        }
    }
}

/// Drain one GameStarted frame per player and return the shared game id
pub async fn expect_game_started(setup: &TestSetup, players: &[PlayerId]) -> i64 {
    let mut ids = Vec::new();
    for &player in players {
        let payload = EnvelopeAssertion::for_player(setup, player)
            .received_kind(EventKind::GameStarted)
            .await;
        ids.push(payload["GameID"].as_i64().unwrap());
    }
    for window in ids.windows(2) {
        assert_eq!(window[0], window[1], "players saw different game ids");
    }
    ids[0]
}
