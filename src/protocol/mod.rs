// Wire protocol shared by client sockets and the cross-instance event log.
//
// Every message is an EventEnvelope: an integer event kind, a kind-specific
// payload, and (for server-to-client traffic) a destination player.

pub use envelope::{EventEnvelope, EventKind, EventPayload};
pub use payloads::{
    ConnectedPayload, ErrorPayload, GameStartedPayload, GameUpdatePayload, MakeMovePayload,
    MoveResultPayload, PlaceShipsPayload,
};

mod envelope;
mod payloads;
