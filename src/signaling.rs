//! WebSocket signaling relay: room membership and verbatim message fan-out

mod actor;
mod messages;
mod server;
mod types;

pub use actor::RoomRegistryHandle;
pub use messages::{Envelope, MessageKind, ServerMessage};
pub use server::{DEFAULT_SIGNALING_PORT, SignalingServer};
pub use types::{ConnId, OutboundMessage, RoomId};
