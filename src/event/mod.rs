// Cross-instance event distribution.
//
// Outbound envelopes are appended to a single shared ordered log; every
// server instance runs one fan-out consumer that delivers whatever is
// addressed to its locally registered connections and drops the rest.

pub use fanout::spawn_fanout;
pub use log::{InMemoryEventLog, LogCursor, OrderedLog, PostgresEventLog};

mod fanout;
mod log;
