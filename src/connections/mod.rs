//! Live client connections and change-set broadcast.
//!
//! The accepting layer (websocket upgrade, SSE handshake, ...) lives outside
//! this crate; it hands each established channel to a [`ConnectionRegistry`]
//! as an `Arc<dyn Connection>` and deregisters it on disconnect.

mod registry;

pub use registry::{BroadcastReport, Connection, ConnectionRegistry, DEFAULT_SEND_TIMEOUT};
