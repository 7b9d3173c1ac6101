//! Error taxonomy for the signaling core.

use thiserror::Error;

/// Errors surfaced by the presence and room stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("room {0} already exists")]
    AlreadyExists(String),

    #[error("room {0} not found")]
    NotFound(String),

    #[error("room {0} is full")]
    RoomFull(String),

    /// Transient failure reaching the backing store (timeout included).
    /// Callers treat this as "state unknown", never as proof of a change.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Matchmaking failure after the bounded retry budget is spent.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("matchmaking failed after {0} attempts")]
    Exhausted(usize),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Authentication rejection. Fatal to the connection, no side effects.
#[derive(Debug, Error)]
#[error("authentication rejected: {0}")]
pub struct AuthError(pub String);
