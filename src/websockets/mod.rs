// WebSocket layer: per-connection read/write loops, the instance-local
// connection registry, and routing of inbound envelopes into the game.

pub use handler::{websocket_handler, EnvelopeRouter};
pub use registry::{ConnectionRegistry, InMemoryConnectionRegistry};
pub use socket::{Connection, MessageHandler, SocketError, SocketWrapper};

mod handler;
mod registry;
mod socket;
