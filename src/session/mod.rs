//! Realtime session
//!
//! Wire protocol, connection lifecycle, and the rolling session log.
//! Audio capture and playback live in `audio`; the manager here wires them
//! to the bidirectional endpoint.

mod log;
mod manager;
pub mod wire;

pub use log::{DEFAULT_LOG_CAPACITY, LogEntry, LogKind, SessionLog};
pub use manager::{SessionEvent, SessionEventKind, SessionManager, StateSnapshot};
