//! Shared domain types for the Bullpen project.

pub mod config;
pub mod events;
pub mod game;
pub mod matchup;
pub mod stats;

mod errors;

pub use errors::{BullpenError, FeedError, Result};

/// MLB `gamePk`.
pub type GameId = u64;
/// MLB person id.
pub type PlayerId = u64;
/// Monotonic per-game play counter (`atBatIndex + 1` upstream).
pub type EventId = u64;
