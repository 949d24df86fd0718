//! Wiring facade: builds every subsystem from one [`BullpenConfig`].

use std::{path::PathBuf, sync::Arc};

use bullpen_coordinator::FetchCoordinator;
use bullpen_feed::{MlbStatsFeed, RemoteFeed};
use bullpen_matchup::{ChatInsightProvider, MatchupResolver};
use bullpen_network::{GameObserver, UpdateHub};
use bullpen_ops::{ensure_data_dir, init_tracing, UpdateJournal};
use bullpen_store::{FreshnessPolicy, MemoryStatStore, SqliteStatStore, StatStore};
use bullpen_tracker::{GameStateTracker, Poller, PollerHandle};
use bullpen_types::{
    config::{BullpenConfig, StoreBackend},
    matchup::{EnrichedMatchup, MatchupQuery},
    BullpenError, Result,
};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct Bullpen {
    config: BullpenConfig,
    store: Arc<dyn StatStore>,
    tracker: Arc<GameStateTracker>,
    resolver: Arc<MatchupResolver>,
    hub: UpdateHub,
}

impl Bullpen {
    /// Build against the public MLB Stats API.
    pub async fn from_config(config: BullpenConfig) -> Result<Self> {
        let feed = MlbStatsFeed::new(&config.feed)?;
        Self::with_feed(config, Arc::new(feed)).await
    }

    pub async fn with_feed(config: BullpenConfig, feed: Arc<dyn RemoteFeed>) -> Result<Self> {
        config.validate()?;
        let store = open_store(&config).await?;
        let coordinator = Arc::new(FetchCoordinator::new(config.resolver.fetch_timeout()));

        let tracker = Arc::new(GameStateTracker::new(
            Arc::clone(&feed),
            Arc::clone(&coordinator),
        ));
        let hub = UpdateHub::new(config.tracker.observer_capacity);
        tracker.add_observer(Arc::new(hub.clone()) as Arc<dyn GameObserver>);

        let mut resolver = MatchupResolver::new(
            Arc::clone(&store),
            feed,
            coordinator,
            FreshnessPolicy::from_config(&config.freshness),
            config.resolver.clone(),
        );
        if let Some(insight) = &config.insight {
            match ChatInsightProvider::from_config(insight) {
                Ok(provider) => {
                    resolver = resolver.with_insight(
                        Arc::new(provider),
                        std::time::Duration::from_millis(insight.timeout_ms),
                    );
                }
                Err(err) => warn!("insight disabled: {err}"),
            }
        }

        Ok(Self {
            config,
            store,
            tracker,
            resolver: Arc::new(resolver),
            hub,
        })
    }

    /// Install logging, prepare the data directory and track configured games.
    pub async fn boot(&self) -> Result<PathBuf> {
        init_tracing(&self.config.ops)?;
        let data_dir = ensure_data_dir(&self.config.ops.data_dir)?;
        self.track_configured().await;
        info!(
            games = self.config.tracker.game_ids.len(),
            backend = ?self.config.store.backend,
            "bullpen boot complete"
        );
        Ok(data_dir)
    }

    pub async fn track_configured(&self) -> usize {
        let mut added = 0;
        for game_id in &self.config.tracker.game_ids {
            if self.tracker.track(*game_id).await {
                added += 1;
            }
        }
        added
    }

    pub fn spawn_poller(&self) -> PollerHandle {
        Poller::new(Arc::clone(&self.tracker), self.config.tracker.poll_interval()).spawn()
    }

    /// Journal every published update under `data_dir` until the hub closes.
    pub fn spawn_journal(&self, data_dir: PathBuf) -> JoinHandle<()> {
        let updates = self.hub.subscribe();
        tokio::spawn(async move {
            let journal = UpdateJournal::new(&data_dir);
            info!(path = ?journal.path(), "journaling game updates");
            journal.follow(updates).await;
        })
    }

    pub async fn matchup(&self, query: &MatchupQuery) -> Result<EnrichedMatchup> {
        self.resolver.resolve_with_insight(query).await
    }

    pub fn config(&self) -> &BullpenConfig {
        &self.config
    }

    pub fn tracker(&self) -> &Arc<GameStateTracker> {
        &self.tracker
    }

    pub fn resolver(&self) -> &Arc<MatchupResolver> {
        &self.resolver
    }

    pub fn store(&self) -> &Arc<dyn StatStore> {
        &self.store
    }

    pub fn hub(&self) -> &UpdateHub {
        &self.hub
    }
}

async fn open_store(config: &BullpenConfig) -> Result<Arc<dyn StatStore>> {
    match config.store.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStatStore::new())),
        StoreBackend::Sqlite => {
            let path = config.store.sqlite_path.as_deref().ok_or_else(|| {
                BullpenError::Configuration("store.sqlite_path is required for sqlite".into())
            })?;
            Ok(Arc::new(SqliteStatStore::open(path).await?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bullpen_feed::ScriptedFeed;
    use bullpen_types::{
        config::InsightConfig,
        game::{Bases, Count, GameStatePayload, GameStatus, InningHalf, Score},
        matchup::ResultTier,
        stats::{Metric, StatKey, StatPayload},
    };
    use futures::StreamExt;

    fn payload(last_event_id: u64) -> GameStatePayload {
        GameStatePayload {
            game_id: 778549,
            status: GameStatus::Live,
            inning: 1,
            inning_half: InningHalf::Top,
            outs: 0,
            bases: Bases::default(),
            count: Count::default(),
            score: Score::default(),
            current_batter_id: Some(1),
            current_pitcher_id: Some(2),
            last_event_id,
            plays: Vec::new(),
        }
    }

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("bullpen-service-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn tracked_games_flow_to_hub_subscribers() {
        let feed = Arc::new(ScriptedFeed::new());
        feed.push_game_state(payload(3));
        feed.push_game_state(payload(5));

        let mut config = BullpenConfig::default();
        config.tracker.game_ids = vec![778549];
        let bullpen = Bullpen::with_feed(config, feed as Arc<dyn RemoteFeed>)
            .await
            .unwrap();
        assert_eq!(bullpen.track_configured().await, 1);

        let mut updates = bullpen.hub().subscribe();
        bullpen.tracker().poll(778549).await.unwrap();
        bullpen.tracker().poll(778549).await.unwrap();

        let baseline = updates.next().await.unwrap();
        assert!(baseline.events.is_empty());
        let advanced = updates.next().await.unwrap();
        assert_eq!(advanced.events.len(), 2);
        assert_eq!(advanced.state.last_event_id, 5);
    }

    #[tokio::test]
    async fn sqlite_backend_persists_resolved_components() {
        let dir = scratch_dir();
        ensure_data_dir(dir.to_str().unwrap()).unwrap();
        let db = dir.join("bullpen.db");

        let feed = Arc::new(ScriptedFeed::new());
        feed.set_head_to_head(
            10,
            20,
            StatPayload::new()
                .with(Metric::PlateAppearances, 4.0)
                .with(Metric::AtBats, 4.0)
                .with(Metric::Hits, 1.0)
                .with(Metric::HomeRuns, 0.0)
                .with(Metric::Walks, 0.0)
                .with(Metric::Strikeouts, 1.0),
        );

        let mut config = BullpenConfig::default();
        config.store.backend = StoreBackend::Sqlite;
        config.store.sqlite_path = Some(db.to_string_lossy().into_owned());
        let bullpen = Bullpen::with_feed(config, feed as Arc<dyn RemoteFeed>)
            .await
            .unwrap();

        let enriched = bullpen.matchup(&MatchupQuery::new(10, 20)).await.unwrap();
        assert_eq!(enriched.result.head_to_head.tier, ResultTier::Live);
        assert_eq!(enriched.result.batter_season.tier, ResultTier::Mock);
        assert!(enriched.insight.is_none());

        let history = bullpen
            .store()
            .history(&StatKey::head_to_head(10, 20))
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_and_missing_insight_key_is_tolerated() {
        let mut config = BullpenConfig::default();
        config.tracker.poll_interval_secs = 5;
        let feed: Arc<dyn RemoteFeed> = Arc::new(ScriptedFeed::new());
        assert!(matches!(
            Bullpen::with_feed(config, Arc::clone(&feed)).await,
            Err(BullpenError::Configuration(_))
        ));

        let mut config = BullpenConfig::default();
        config.insight = Some(InsightConfig {
            endpoint: "http://127.0.0.1:9/v1/chat/completions".into(),
            model: "test".into(),
            api_key_env: "BULLPEN_TEST_KEY_THAT_IS_NEVER_SET".into(),
            timeout_ms: 100,
        });
        assert!(Bullpen::with_feed(config, feed).await.is_ok());
    }

    #[tokio::test]
    async fn journal_records_published_updates() {
        let dir = scratch_dir();
        ensure_data_dir(dir.to_str().unwrap()).unwrap();
        let feed = Arc::new(ScriptedFeed::new());
        feed.push_game_state(payload(1));
        let bullpen = Bullpen::with_feed(BullpenConfig::default(), feed as Arc<dyn RemoteFeed>)
            .await
            .unwrap();

        bullpen.tracker().track(778549).await;
        let journal = bullpen.spawn_journal(dir.clone());
        bullpen.tracker().poll(778549).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        journal.abort();

        let recorded = UpdateJournal::new(&dir).replay().await.unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].state.last_event_id, 1);
        std::fs::remove_dir_all(dir).ok();
    }
}
