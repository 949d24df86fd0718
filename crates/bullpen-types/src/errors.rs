use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::GameId;

pub type Result<T, E = BullpenError> = std::result::Result<T, E>;

/// Failure reported by a remote feed call.
///
/// Cloneable so a single in-flight result can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum FeedError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rate limited by upstream")]
    RateLimited,
    #[error("remote call timed out")]
    Timeout,
    #[error("upstream returned status {0}")]
    Upstream5xx(u16),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("malformed upstream payload: {0}")]
    Malformed(String),
}

/// Unified error type covering common failure scenarios across subsystems.
#[derive(Debug, Error)]
pub enum BullpenError {
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(#[from] FeedError),
    #[error("stale snapshot rejected for game {game_id}: {reason}")]
    StaleReject { game_id: GameId, reason: String },
    #[error("store error: {0}")]
    StoreIo(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("operational error: {0}")]
    Ops(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
