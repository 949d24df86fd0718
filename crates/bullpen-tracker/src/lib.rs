//! Live game state tracking.
//!
//! The tracker owns the authoritative [`GameState`] per game. Each poll
//! fetches a snapshot through the shared [`FetchCoordinator`], checks it
//! against the held state and, when accepted, derives the plate appearances
//! that happened in between from the event id range.

mod poller;

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, PoisonError, RwLock as StdRwLock},
};

use bullpen_coordinator::{FetchCoordinator, FetchKey};
use bullpen_feed::RemoteFeed;
use bullpen_network::GameObserver;
use bullpen_types::{
    game::{AtBatEvent, AtBatOutcome, GameState, GameStatePayload},
    BullpenError, FeedError, GameId, Result,
};
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub use poller::{Poller, PollerHandle};

/// What a poll did with the snapshot it fetched.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// First snapshot for the game; stored without events.
    Baseline,
    Accepted,
    /// Out-of-order, duplicate or invalid snapshot; state left untouched.
    Rejected(String),
    /// The feed call failed; previous state kept for the next tick.
    FeedUnavailable(FeedError),
    /// The game already reached `Final`; no fetch was made.
    Finished,
    /// The game was untracked while the fetch was in flight; nothing stored.
    Untracked,
}

impl Disposition {
    pub fn changed_state(&self) -> bool {
        matches!(self, Disposition::Baseline | Disposition::Accepted)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome {
    pub state: GameState,
    pub events: Vec<AtBatEvent>,
    pub disposition: Disposition,
}

enum Transition {
    Baseline(GameState),
    Advance(GameState, Vec<AtBatEvent>),
    Reject(String),
}

pub struct GameStateTracker {
    feed: Arc<dyn RemoteFeed>,
    coordinator: Arc<FetchCoordinator>,
    games: RwLock<HashMap<GameId, Option<GameState>>>,
    observers: StdRwLock<Vec<Arc<dyn GameObserver>>>,
}

impl GameStateTracker {
    pub fn new(feed: Arc<dyn RemoteFeed>, coordinator: Arc<FetchCoordinator>) -> Self {
        Self {
            feed,
            coordinator,
            games: RwLock::new(HashMap::new()),
            observers: StdRwLock::new(Vec::new()),
        }
    }

    pub fn add_observer(&self, observer: Arc<dyn GameObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Start tracking `game_id`. Returns false if it was already tracked.
    pub async fn track(&self, game_id: GameId) -> bool {
        let mut games = self.games.write().await;
        if games.contains_key(&game_id) {
            return false;
        }
        games.insert(game_id, None);
        info!(game_id, "tracking game");
        true
    }

    pub async fn untrack(&self, game_id: GameId) -> Option<GameState> {
        let removed = self.games.write().await.remove(&game_id).flatten();
        info!(game_id, "untracked game");
        removed
    }

    pub async fn tracked_games(&self) -> Vec<GameId> {
        let mut ids: Vec<_> = self.games.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Tracked games the poller should still visit.
    pub async fn pollable_games(&self) -> Vec<GameId> {
        let games = self.games.read().await;
        let mut ids: Vec<_> = games
            .iter()
            .filter(|(_, state)| !state.as_ref().is_some_and(|s| s.status.is_terminal()))
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub async fn state(&self, game_id: GameId) -> Option<GameState> {
        self.games.read().await.get(&game_id).cloned().flatten()
    }

    /// Every observed game state, keyed by game.
    pub async fn states(&self) -> BTreeMap<GameId, GameState> {
        self.games
            .read()
            .await
            .iter()
            .filter_map(|(id, state)| state.clone().map(|s| (*id, s)))
            .collect()
    }

    /// Drop games that reached `Final`, returning their ids.
    pub async fn evict_finished(&self) -> Vec<GameId> {
        let mut games = self.games.write().await;
        let mut finished: Vec<_> = games
            .iter()
            .filter(|(_, state)| state.as_ref().is_some_and(|s| s.status.is_terminal()))
            .map(|(id, _)| *id)
            .collect();
        finished.sort_unstable();
        for id in &finished {
            games.remove(id);
        }
        if !finished.is_empty() {
            info!(?finished, "evicted finished games");
        }
        finished
    }

    /// Fetch the newest snapshot for `game_id` and fold it into the held state.
    ///
    /// Fails when the game is not tracked, or when it has never been observed
    /// and the feed gives nothing usable; every other problem is reported in
    /// the outcome.
    pub async fn poll(&self, game_id: GameId) -> Result<PollOutcome> {
        let previous = {
            let games = self.games.read().await;
            match games.get(&game_id) {
                Some(held) => held.clone(),
                None => {
                    return Err(BullpenError::Configuration(format!(
                        "game {game_id} is not tracked"
                    )))
                }
            }
        };
        if let Some(state) = previous.as_ref().filter(|s| s.status.is_terminal()) {
            debug!(game_id, "game is final; skipping fetch");
            return Ok(PollOutcome {
                state: state.clone(),
                events: Vec::new(),
                disposition: Disposition::Finished,
            });
        }

        let fetched = self.fetch(game_id).await.and_then(|payload| {
            if payload.game_id != game_id {
                return Err(FeedError::Malformed(format!(
                    "asked for game {game_id}, feed returned {}",
                    payload.game_id
                )));
            }
            payload.validate().map_err(FeedError::Malformed)?;
            Ok(payload)
        });
        let payload = match fetched {
            Ok(payload) => payload,
            Err(err) => {
                return match previous {
                    Some(state) => {
                        warn!(game_id, "feed unavailable, keeping previous state: {err}");
                        Ok(PollOutcome {
                            state,
                            events: Vec::new(),
                            disposition: Disposition::FeedUnavailable(err),
                        })
                    }
                    None => Err(BullpenError::RemoteUnavailable(err)),
                };
            }
        };

        // Observers run under the write lock so updates for one game reach
        // them in the order they were applied.
        let mut games = self.games.write().await;
        let Some(held) = games.get_mut(&game_id) else {
            debug!(game_id, "game untracked during fetch; snapshot dropped");
            return Ok(PollOutcome {
                state: GameState::from_payload(&payload, Utc::now()),
                events: Vec::new(),
                disposition: Disposition::Untracked,
            });
        };
        let (state, events, disposition) = match transition(held.as_ref(), &payload) {
            Transition::Baseline(state) => {
                *held = Some(state.clone());
                (state, Vec::new(), Disposition::Baseline)
            }
            Transition::Advance(state, events) => {
                *held = Some(state.clone());
                (state, events, Disposition::Accepted)
            }
            Transition::Reject(reason) => {
                let Some(current) = held.clone() else {
                    return Err(BullpenError::StaleReject { game_id, reason });
                };
                debug!(game_id, %reason, "discarded snapshot");
                (current, Vec::new(), Disposition::Rejected(reason))
            }
        };

        if disposition.changed_state() {
            info!(
                game_id,
                status = ?state.status,
                last_event_id = state.last_event_id,
                events = events.len(),
                "game state advanced"
            );
            self.notify(&state, &events);
        }
        drop(games);

        Ok(PollOutcome {
            state,
            events,
            disposition,
        })
    }

    async fn fetch(&self, game_id: GameId) -> Result<GameStatePayload, FeedError> {
        let feed = Arc::clone(&self.feed);
        self.coordinator
            .run(FetchKey::game_state(game_id), move || async move {
                feed.fetch_game_state(game_id).await
            })
            .await
    }

    /// Observers must not block: they are called with the game map locked.
    fn notify(&self, state: &GameState, events: &[AtBatEvent]) {
        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in observers {
            observer.on_game_update(state, events);
        }
    }
}

/// Decide whether `payload` may replace `held`.
fn transition(held: Option<&GameState>, payload: &GameStatePayload) -> Transition {
    let now = Utc::now();
    let Some(held) = held else {
        return Transition::Baseline(GameState::from_payload(payload, now));
    };

    if !held.status.can_advance_to(payload.status) {
        return Transition::Reject(format!(
            "status regression {:?} -> {:?}",
            held.status, payload.status
        ));
    }
    if payload.last_event_id > held.last_event_id {
        let events = diff_events(held, payload);
        return Transition::Advance(GameState::from_payload(payload, now), events);
    }
    if payload.last_event_id == held.last_event_id && payload.status > held.status {
        return Transition::Advance(GameState::from_payload(payload, now), Vec::new());
    }
    Transition::Reject(format!(
        "event id {} does not advance past {}",
        payload.last_event_id, held.last_event_id
    ))
}

/// One event per id in `(held.last_event_id, payload.last_event_id]`.
///
/// Ids without a matching play record still produce an event so the count
/// always equals the id delta. Player id `0` means unknown.
fn diff_events(held: &GameState, payload: &GameStatePayload) -> Vec<AtBatEvent> {
    let now = Utc::now();
    (held.last_event_id + 1..=payload.last_event_id)
        .map(|event_id| {
            match payload.plays.iter().find(|play| play.event_id == event_id) {
                Some(play) => AtBatEvent {
                    game_id: payload.game_id,
                    event_id,
                    batter_id: play.batter_id,
                    pitcher_id: play.pitcher_id,
                    outcome: play.outcome.clone(),
                    timestamp: play.timestamp,
                },
                None => AtBatEvent {
                    game_id: payload.game_id,
                    event_id,
                    batter_id: held.current_batter_id.unwrap_or_default(),
                    pitcher_id: held.current_pitcher_id.unwrap_or_default(),
                    outcome: AtBatOutcome::Unrecorded,
                    timestamp: now,
                },
            }
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::fixtures::{payload, play};
    use super::*;
    use bullpen_feed::ScriptedFeed;
    use bullpen_types::game::{Bases, Count, GameStatus};
    use std::{sync::Mutex, time::Duration};

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(u64, usize)>>,
    }

    impl GameObserver for Recorder {
        fn on_game_update(&self, state: &GameState, events: &[AtBatEvent]) {
            self.seen
                .lock()
                .unwrap()
                .push((state.last_event_id, events.len()));
        }
    }

    fn tracker(feed: &Arc<ScriptedFeed>) -> GameStateTracker {
        GameStateTracker::new(
            Arc::clone(feed) as Arc<dyn RemoteFeed>,
            Arc::new(FetchCoordinator::new(Duration::from_secs(1))),
        )
    }

    #[tokio::test]
    async fn two_intervening_plays_emit_two_events() {
        let feed = Arc::new(ScriptedFeed::new());
        feed.push_game_state(payload(778549, 40));

        let mut next = payload(778549, 42);
        next.outs = 0;
        next.inning_half = bullpen_types::game::InningHalf::Bottom;
        next.bases = Bases::new(false, true, false);
        next.count = Count {
            balls: 0,
            strikes: 0,
        };
        next.plays = vec![
            play(41, 592450, AtBatOutcome::Strikeout),
            play(42, 665742, AtBatOutcome::Double),
        ];
        feed.push_game_state(next);

        let tracker = tracker(&feed);
        tracker.track(778549).await;
        let recorder = Arc::new(Recorder::default());
        tracker.add_observer(recorder.clone());

        let baseline = tracker.poll(778549).await.unwrap();
        assert_eq!(baseline.disposition, Disposition::Baseline);
        assert!(baseline.events.is_empty());

        let outcome = tracker.poll(778549).await.unwrap();
        assert_eq!(outcome.disposition, Disposition::Accepted);
        let ids: Vec<_> = outcome.events.iter().map(|e| e.event_id).collect();
        assert_eq!(ids, vec![41, 42]);
        assert_eq!(outcome.events[0].outcome, AtBatOutcome::Strikeout);
        assert_eq!(outcome.events[1].batter_id, 665742);

        let state = tracker.state(778549).await.unwrap();
        assert_eq!(state.last_event_id, 42);
        assert_eq!(state.outs, 0);
        assert_eq!(state.bases, Bases::new(false, true, false));
        assert_eq!(state.count, Count::default());
        assert_eq!(*recorder.seen.lock().unwrap(), vec![(40, 0), (42, 2)]);
    }

    #[tokio::test]
    async fn older_or_equal_snapshots_are_rejected() {
        let feed = Arc::new(ScriptedFeed::new());
        feed.push_game_state(payload(1, 10));
        feed.push_game_state(payload(1, 9));
        feed.push_game_state(payload(1, 10));
        let tracker = tracker(&feed);
        tracker.track(1).await;
        let recorder = Arc::new(Recorder::default());
        tracker.add_observer(recorder.clone());

        tracker.poll(1).await.unwrap();
        for _ in 0..2 {
            let outcome = tracker.poll(1).await.unwrap();
            assert!(matches!(outcome.disposition, Disposition::Rejected(_)));
            assert!(outcome.events.is_empty());
            assert_eq!(outcome.state.last_event_id, 10);
        }
        assert_eq!(recorder.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_play_records_are_gap_filled() {
        let feed = Arc::new(ScriptedFeed::new());
        feed.push_game_state(payload(2, 5));
        let mut jump = payload(2, 9);
        jump.plays = vec![play(9, 7, AtBatOutcome::HomeRun)];
        feed.push_game_state(jump);
        let tracker = tracker(&feed);
        tracker.track(2).await;

        tracker.poll(2).await.unwrap();
        let outcome = tracker.poll(2).await.unwrap();
        assert_eq!(outcome.events.len(), 4);
        assert!(outcome.events[..3]
            .iter()
            .all(|e| e.outcome == AtBatOutcome::Unrecorded && e.batter_id == 660271));
        assert_eq!(outcome.events[3].outcome, AtBatOutcome::HomeRun);
    }

    #[tokio::test]
    async fn feed_failure_keeps_previous_state() {
        let feed = Arc::new(ScriptedFeed::new());
        feed.push_game_state(payload(3, 20));
        feed.push_game_failure(3, FeedError::Upstream5xx(502));
        let tracker = tracker(&feed);
        tracker.track(3).await;

        tracker.poll(3).await.unwrap();
        let outcome = tracker.poll(3).await.unwrap();
        assert_eq!(
            outcome.disposition,
            Disposition::FeedUnavailable(FeedError::Upstream5xx(502))
        );
        assert_eq!(outcome.state.last_event_id, 20);
    }

    #[tokio::test]
    async fn unseen_game_with_failing_feed_is_an_error() {
        let feed = Arc::new(ScriptedFeed::new());
        feed.push_game_failure(4, FeedError::RateLimited);
        let tracker = tracker(&feed);
        tracker.track(4).await;
        assert!(matches!(
            tracker.poll(4).await,
            Err(BullpenError::RemoteUnavailable(FeedError::RateLimited))
        ));
        assert!(tracker.state(4).await.is_none());
    }

    #[tokio::test]
    async fn status_moves_forward_and_final_stops_polling() {
        let feed = Arc::new(ScriptedFeed::new());
        let mut scheduled = payload(5, 0);
        scheduled.status = GameStatus::Scheduled;
        feed.push_game_state(scheduled.clone());
        feed.push_game_state(payload(5, 0));
        let mut finished = payload(5, 0);
        finished.status = GameStatus::Final;
        finished.outs = 0;
        feed.push_game_state(finished);
        feed.push_game_state(scheduled);
        let tracker = tracker(&feed);
        tracker.track(5).await;

        tracker.poll(5).await.unwrap();
        let live = tracker.poll(5).await.unwrap();
        assert_eq!(live.disposition, Disposition::Accepted);
        assert_eq!(live.state.status, GameStatus::Live);
        let done = tracker.poll(5).await.unwrap();
        assert_eq!(done.state.status, GameStatus::Final);

        let calls = feed.calls().game_state;
        let after = tracker.poll(5).await.unwrap();
        assert_eq!(after.disposition, Disposition::Finished);
        assert_eq!(feed.calls().game_state, calls);
        assert!(tracker.pollable_games().await.is_empty());
        assert_eq!(tracker.evict_finished().await, vec![5]);
        assert!(tracker.tracked_games().await.is_empty());
    }

    #[tokio::test]
    async fn invalid_payload_never_mutates_state() {
        let feed = Arc::new(ScriptedFeed::new());
        feed.push_game_state(payload(6, 3));
        let mut bad = payload(6, 4);
        bad.outs = 3;
        feed.push_game_state(bad);
        let tracker = tracker(&feed);
        tracker.track(6).await;

        tracker.poll(6).await.unwrap();
        let outcome = tracker.poll(6).await.unwrap();
        assert!(matches!(
            outcome.disposition,
            Disposition::FeedUnavailable(FeedError::Malformed(_))
        ));
        assert_eq!(tracker.state(6).await.unwrap().last_event_id, 3);
    }

    #[tokio::test]
    async fn concurrent_polls_share_one_fetch() {
        let feed = Arc::new(ScriptedFeed::new());
        feed.push_game_state(payload(7, 1));
        feed.set_latency(Duration::from_millis(30));
        let tracker = tracker(&feed);
        tracker.track(7).await;

        let outcomes = futures::future::join_all((0..5).map(|_| tracker.poll(7))).await;
        assert_eq!(feed.calls().game_state, 1);
        let baselines = outcomes
            .iter()
            .filter(|o| o.as_ref().unwrap().disposition == Disposition::Baseline)
            .count();
        assert_eq!(baselines, 1);
    }

    #[tokio::test]
    async fn untracked_games_are_not_polled() {
        let feed = Arc::new(ScriptedFeed::new());
        feed.push_game_state(payload(8, 1));
        let tracker = tracker(&feed);

        assert!(matches!(
            tracker.poll(8).await,
            Err(BullpenError::Configuration(_))
        ));
        assert_eq!(feed.calls().game_state, 0);
        assert!(tracker.tracked_games().await.is_empty());
    }

    #[tokio::test]
    async fn untrack_during_fetch_drops_the_snapshot() {
        let feed = Arc::new(ScriptedFeed::new());
        feed.push_game_state(payload(9, 1));
        feed.set_latency(Duration::from_millis(50));
        let tracker = Arc::new(tracker(&feed));
        let recorder = Arc::new(Recorder::default());
        tracker.add_observer(recorder.clone());
        tracker.track(9).await;

        let polling = tokio::spawn({
            let tracker = Arc::clone(&tracker);
            async move { tracker.poll(9).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        tracker.untrack(9).await;

        let outcome = polling.await.unwrap().unwrap();
        assert_eq!(outcome.disposition, Disposition::Untracked);
        assert!(tracker.tracked_games().await.is_empty());
        assert!(tracker.pollable_games().await.is_empty());
        assert!(recorder.seen.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn observers_see_updates_in_event_order() {
        let feed = Arc::new(ScriptedFeed::new());
        for id in 1..=40 {
            feed.push_game_state(payload(11, id));
        }
        let tracker = Arc::new(tracker(&feed));
        let recorder = Arc::new(Recorder::default());
        tracker.add_observer(recorder.clone());
        tracker.track(11).await;

        let polls: Vec<_> = (0..40)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                tokio::spawn(async move { tracker.poll(11).await })
            })
            .collect();
        for poll in polls {
            poll.await.unwrap().unwrap();
        }

        let seen: Vec<_> = recorder.seen.lock().unwrap().iter().map(|(id, _)| *id).collect();
        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
