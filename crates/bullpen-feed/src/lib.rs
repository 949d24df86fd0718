//! Remote game/stat provider abstraction.

mod mlb;

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex, MutexGuard,
    },
};

use async_trait::async_trait;
use bullpen_types::{
    game::GameStatePayload,
    stats::{GameLogLine, PlayerRole, StatPayload},
    FeedError, GameId, PlayerId, Result,
};
use tokio::time::{sleep, Duration};
use tracing::debug;

pub use mlb::MlbStatsFeed;

/// Upstream provider of live game snapshots and player statistics.
///
/// Every call may fail or hang; callers are expected to bound it with a timeout.
#[async_trait]
pub trait RemoteFeed: Send + Sync {
    async fn fetch_game_state(&self, game_id: GameId) -> Result<GameStatePayload, FeedError>;
    async fn fetch_player_season_stats(
        &self,
        player_id: PlayerId,
        role: PlayerRole,
    ) -> Result<StatPayload, FeedError>;
    async fn fetch_recent_games(
        &self,
        player_id: PlayerId,
        games: usize,
    ) -> Result<Vec<GameLogLine>, FeedError>;
    async fn fetch_head_to_head(
        &self,
        batter_id: PlayerId,
        pitcher_id: PlayerId,
    ) -> Result<StatPayload, FeedError>;
}

/// Per-operation call counts observed by a [`ScriptedFeed`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedCallCounts {
    pub game_state: usize,
    pub season: usize,
    pub recent_games: usize,
    pub head_to_head: usize,
}

#[derive(Default)]
struct ScriptState {
    games: HashMap<GameId, VecDeque<Result<GameStatePayload, FeedError>>>,
    last_game: HashMap<GameId, GameStatePayload>,
    season: HashMap<(PlayerId, PlayerRole), StatPayload>,
    recent: HashMap<PlayerId, Vec<GameLogLine>>,
    head_to_head: HashMap<(PlayerId, PlayerId), StatPayload>,
    stat_failure: Option<FeedError>,
    latency: Duration,
}

#[derive(Default)]
struct Counters {
    game_state: AtomicUsize,
    season: AtomicUsize,
    recent_games: AtomicUsize,
    head_to_head: AtomicUsize,
}

/// In-process feed driven by queued responses, used for development and tests.
///
/// Game snapshots are served in push order; once the queue drains the last
/// served snapshot repeats, like an upstream that has nothing new to report.
#[derive(Default)]
pub struct ScriptedFeed {
    state: Mutex<ScriptState>,
    counters: Counters,
}

impl ScriptedFeed {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push_game_state(&self, payload: GameStatePayload) {
        self.state()
            .games
            .entry(payload.game_id)
            .or_default()
            .push_back(Ok(payload));
    }

    pub fn push_game_failure(&self, game_id: GameId, error: FeedError) {
        self.state()
            .games
            .entry(game_id)
            .or_default()
            .push_back(Err(error));
    }

    pub fn set_season(&self, player_id: PlayerId, role: PlayerRole, payload: StatPayload) {
        self.state().season.insert((player_id, role), payload);
    }

    pub fn set_recent_games(&self, player_id: PlayerId, lines: Vec<GameLogLine>) {
        self.state().recent.insert(player_id, lines);
    }

    pub fn set_head_to_head(&self, batter_id: PlayerId, pitcher_id: PlayerId, payload: StatPayload) {
        self.state()
            .head_to_head
            .insert((batter_id, pitcher_id), payload);
    }

    /// Make every stat call fail with `error` until cleared with `None`.
    pub fn fail_stats(&self, error: Option<FeedError>) {
        self.state().stat_failure = error;
    }

    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = latency;
    }

    pub fn calls(&self) -> FeedCallCounts {
        FeedCallCounts {
            game_state: self.counters.game_state.load(Ordering::SeqCst),
            season: self.counters.season.load(Ordering::SeqCst),
            recent_games: self.counters.recent_games.load(Ordering::SeqCst),
            head_to_head: self.counters.head_to_head.load(Ordering::SeqCst),
        }
    }

    async fn delay(&self) {
        let latency = self.state().latency;
        if !latency.is_zero() {
            sleep(latency).await;
        }
    }

    fn stat_lookup<K, T>(
        &self,
        pick: impl FnOnce(&ScriptState) -> Option<T>,
        describe: K,
    ) -> Result<T, FeedError>
    where
        K: FnOnce() -> String,
    {
        let state = self.state();
        if let Some(error) = &state.stat_failure {
            return Err(error.clone());
        }
        pick(&*state).ok_or_else(|| FeedError::NotFound(describe()))
    }
}

#[async_trait]
impl RemoteFeed for ScriptedFeed {
    async fn fetch_game_state(&self, game_id: GameId) -> Result<GameStatePayload, FeedError> {
        self.counters.game_state.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        let mut state = self.state();
        let next = state.games.get_mut(&game_id).and_then(|q| q.pop_front());
        match next {
            Some(Ok(payload)) => {
                debug!(game_id, last_event_id = payload.last_event_id, "scripted game state");
                state.last_game.insert(game_id, payload.clone());
                Ok(payload)
            }
            Some(Err(error)) => Err(error),
            None => state
                .last_game
                .get(&game_id)
                .cloned()
                .ok_or_else(|| FeedError::NotFound(format!("game {game_id}"))),
        }
    }

    async fn fetch_player_season_stats(
        &self,
        player_id: PlayerId,
        role: PlayerRole,
    ) -> Result<StatPayload, FeedError> {
        self.counters.season.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        self.stat_lookup(
            |s| s.season.get(&(player_id, role)).cloned(),
            || format!("{role:?} season stats for {player_id}"),
        )
    }

    async fn fetch_recent_games(
        &self,
        player_id: PlayerId,
        games: usize,
    ) -> Result<Vec<GameLogLine>, FeedError> {
        self.counters.recent_games.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        self.stat_lookup(
            |s| {
                s.recent.get(&player_id).map(|lines| {
                    let skip = lines.len().saturating_sub(games);
                    lines[skip..].to_vec()
                })
            },
            || format!("game log for {player_id}"),
        )
    }

    async fn fetch_head_to_head(
        &self,
        batter_id: PlayerId,
        pitcher_id: PlayerId,
    ) -> Result<StatPayload, FeedError> {
        self.counters.head_to_head.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        self.stat_lookup(
            |s| s.head_to_head.get(&(batter_id, pitcher_id)).cloned(),
            || format!("head-to-head {batter_id} vs {pitcher_id}"),
        )
    }
}
