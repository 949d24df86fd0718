use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EventId, GameId, PlayerId};

/// Lifecycle of a tracked game. Ordering follows the only legal direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GameStatus {
    Scheduled,
    Live,
    Final,
}

impl GameStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, GameStatus::Final)
    }

    /// Staying put or moving forward is legal; regressions are not.
    pub fn can_advance_to(self, next: GameStatus) -> bool {
        next >= self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum InningHalf {
    #[default]
    Top,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Bases {
    pub first: bool,
    pub second: bool,
    pub third: bool,
}

impl Bases {
    pub const fn new(first: bool, second: bool, third: bool) -> Self {
        Self {
            first,
            second,
            third,
        }
    }

    pub fn occupied(&self) -> usize {
        [self.first, self.second, self.third]
            .iter()
            .filter(|b| **b)
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Count {
    pub balls: u8,
    pub strikes: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Score {
    pub home: u16,
    pub away: u16,
}

/// Outcome of one plate appearance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AtBatOutcome {
    Single,
    Double,
    Triple,
    HomeRun,
    Walk,
    IntentionalWalk,
    HitByPitch,
    Strikeout,
    FieldOut,
    DoublePlay,
    FieldersChoice,
    SacFly,
    SacBunt,
    ReachedOnError,
    Other(String),
    /// The id was covered by the snapshot range but no play record came with it.
    Unrecorded,
}

/// One completed play as reported upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayRecord {
    pub event_id: EventId,
    pub batter_id: PlayerId,
    pub pitcher_id: PlayerId,
    pub outcome: AtBatOutcome,
    pub timestamp: DateTime<Utc>,
}

/// Raw game snapshot returned by the remote feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStatePayload {
    pub game_id: GameId,
    pub status: GameStatus,
    pub inning: u8,
    pub inning_half: InningHalf,
    pub outs: u8,
    pub bases: Bases,
    pub count: Count,
    pub score: Score,
    pub current_batter_id: Option<PlayerId>,
    pub current_pitcher_id: Option<PlayerId>,
    pub last_event_id: EventId,
    /// Recent completed plays; may be truncated by the upstream.
    #[serde(default)]
    pub plays: Vec<PlayRecord>,
}

impl GameStatePayload {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.outs > 2 {
            return Err(format!("outs out of range: {}", self.outs));
        }
        if self.count.balls > 3 || self.count.strikes > 2 {
            return Err(format!(
                "count out of range: {}-{}",
                self.count.balls, self.count.strikes
            ));
        }
        if let Some(play) = self.plays.iter().find(|p| p.event_id > self.last_event_id) {
            return Err(format!(
                "play {} is ahead of last_event_id {}",
                play.event_id, self.last_event_id
            ));
        }
        Ok(())
    }
}

/// Authoritative state of one game as held by the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub game_id: GameId,
    pub status: GameStatus,
    pub inning: u8,
    pub inning_half: InningHalf,
    pub outs: u8,
    pub bases: Bases,
    pub count: Count,
    pub score: Score,
    pub current_batter_id: Option<PlayerId>,
    pub current_pitcher_id: Option<PlayerId>,
    pub last_event_id: EventId,
    pub updated_at: DateTime<Utc>,
}

impl GameState {
    pub fn from_payload(payload: &GameStatePayload, updated_at: DateTime<Utc>) -> Self {
        Self {
            game_id: payload.game_id,
            status: payload.status,
            inning: payload.inning,
            inning_half: payload.inning_half,
            outs: payload.outs,
            bases: payload.bases,
            count: payload.count,
            score: payload.score,
            current_batter_id: payload.current_batter_id,
            current_pitcher_id: payload.current_pitcher_id,
            last_event_id: payload.last_event_id,
            updated_at,
        }
    }
}

/// Immutable record of one plate-appearance outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtBatEvent {
    pub game_id: GameId,
    pub event_id: EventId,
    pub batter_id: PlayerId,
    pub pitcher_id: PlayerId,
    pub outcome: AtBatOutcome,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> GameStatePayload {
        GameStatePayload {
            game_id: 1,
            status: GameStatus::Live,
            inning: 3,
            inning_half: InningHalf::Bottom,
            outs: 1,
            bases: Bases::new(true, false, true),
            count: Count {
                balls: 2,
                strikes: 1,
            },
            score: Score { home: 2, away: 1 },
            current_batter_id: Some(10),
            current_pitcher_id: Some(20),
            last_event_id: 12,
            plays: Vec::new(),
        }
    }

    #[test]
    fn status_only_moves_forward() {
        assert!(GameStatus::Scheduled.can_advance_to(GameStatus::Live));
        assert!(GameStatus::Live.can_advance_to(GameStatus::Final));
        assert!(GameStatus::Scheduled.can_advance_to(GameStatus::Final));
        assert!(GameStatus::Live.can_advance_to(GameStatus::Live));
        assert!(!GameStatus::Final.can_advance_to(GameStatus::Live));
        assert!(GameStatus::Final.is_terminal());
    }

    #[test]
    fn payload_validation_catches_impossible_counts() {
        assert!(payload().validate().is_ok());

        let mut bad = payload();
        bad.outs = 3;
        assert!(bad.validate().is_err());

        let mut bad = payload();
        bad.count.balls = 4;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn state_copies_payload_fields() {
        let p = payload();
        let now = Utc::now();
        let state = GameState::from_payload(&p, now);
        assert_eq!(state.bases.occupied(), 2);
        assert_eq!(state.last_event_id, 12);
        assert_eq!(state.updated_at, now);
    }
}
