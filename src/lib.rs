//! Signaling and matchmaking server for capacity-3 peer-to-peer A/V sessions.
//!
//! Clients connect over WebSocket, get matched into a room with up to two
//! other peers, and exchange opaque offer/answer/candidate messages through
//! the server until they establish a direct media path of their own.

pub mod auth;
pub mod config;
pub mod error;
pub mod matchmaker;
pub mod protocol;
pub mod relay;
pub mod session;
pub mod state;
pub mod store;
