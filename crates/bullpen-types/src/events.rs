use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::{AtBatEvent, GameState};

/// Immutable envelope handed to observers after an accepted poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameUpdate {
    pub id: Uuid,
    pub state: GameState,
    pub events: Vec<AtBatEvent>,
    pub published_at: DateTime<Utc>,
}

impl GameUpdate {
    pub fn new(state: GameState, events: Vec<AtBatEvent>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state,
            events,
            published_at: Utc::now(),
        }
    }
}
