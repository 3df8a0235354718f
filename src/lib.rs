//! echowire: a minimal TLS WebSocket signaling relay for peer-to-peer
//! session negotiation, plus a companion single-page static server.
//!
//! Clients join a named room and exchange opaque offer/answer/candidate
//! frames; the relay forwards each frame verbatim to the other members of
//! the sender's room and never inspects negotiation payloads.

pub mod config;
pub mod signaling;
pub mod static_server;
pub mod tls;
