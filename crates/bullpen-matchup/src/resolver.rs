use std::{sync::Arc, time::Duration};

use bullpen_coordinator::{FetchCoordinator, FetchKey};
use bullpen_feed::RemoteFeed;
use bullpen_store::{FreshnessPolicy, StatStore};
use bullpen_types::{
    config::ResolverConfig,
    matchup::{EnrichedMatchup, MatchupComponent, MatchupQuery, MatchupResult, ResultTier},
    stats::{PlayerRole, SourceTier, StatKey, StatKind, StatPayload, StatSnapshot},
    BullpenError, FeedError, Result,
};
use chrono::{DateTime, SubsecRound, Utc};
use tracing::{debug, info, warn};

use crate::{fallback, form, insight::InsightProvider, sabermetrics, LeagueConstants};

/// Fallback steps, tried in this order for every component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    FreshCache,
    LiveFetch,
    StaleCache,
    Placeholder,
}

const STEPS: [Step; 4] = [
    Step::FreshCache,
    Step::LiveFetch,
    Step::StaleCache,
    Step::Placeholder,
];

/// Answers matchup queries from cache, the live feed, or placeholders.
pub struct MatchupResolver {
    store: Arc<dyn StatStore>,
    feed: Arc<dyn RemoteFeed>,
    coordinator: Arc<FetchCoordinator>,
    policy: FreshnessPolicy,
    config: ResolverConfig,
    league: LeagueConstants,
    insight: Option<(Arc<dyn InsightProvider>, Duration)>,
}

impl MatchupResolver {
    pub fn new(
        store: Arc<dyn StatStore>,
        feed: Arc<dyn RemoteFeed>,
        coordinator: Arc<FetchCoordinator>,
        policy: FreshnessPolicy,
        config: ResolverConfig,
    ) -> Self {
        Self {
            store,
            feed,
            coordinator,
            policy,
            config,
            league: LeagueConstants::default(),
            insight: None,
        }
    }

    pub fn with_league(mut self, league: LeagueConstants) -> Self {
        self.league = league;
        self
    }

    /// Attach a summariser used by [`resolve_with_insight`](Self::resolve_with_insight).
    pub fn with_insight(mut self, provider: Arc<dyn InsightProvider>, timeout: Duration) -> Self {
        self.insight = Some((provider, timeout));
        self
    }

    /// Resolve all four components independently and combine them.
    ///
    /// With placeholders enabled (the default) this only fails on an invalid
    /// query. A query pinned with `as_of` is answered from stored rows and
    /// placeholders only, so it never writes today's upstream data.
    pub async fn resolve(&self, query: &MatchupQuery) -> Result<MatchupResult> {
        query.validate()?;
        let now = query.as_of.unwrap_or_else(Utc::now).trunc_subsecs(3);

        let (batter_season, pitcher_season, recent_form, head_to_head) = tokio::join!(
            self.resolve_component(
                StatKey::new(StatKind::Season(PlayerRole::Batter), query.batter_id),
                query,
                now
            ),
            self.resolve_component(
                StatKey::new(StatKind::Season(PlayerRole::Pitcher), query.pitcher_id),
                query,
                now
            ),
            self.resolve_component(StatKey::new(StatKind::RecentForm, query.batter_id), query, now),
            self.resolve_component(
                StatKey::head_to_head(query.batter_id, query.pitcher_id),
                query,
                now
            ),
        );
        let (batter_season, pitcher_season, recent_form, head_to_head) =
            (batter_season?, pitcher_season?, recent_form?, head_to_head?);

        let derived = sabermetrics::derive(
            &batter_season.snapshot.payload,
            &pitcher_season.snapshot.payload,
            &recent_form.snapshot.payload,
            &head_to_head.snapshot.payload,
            &self.league,
        );
        let tier = MatchupResult::weakest_tier(&[
            &batter_season,
            &pitcher_season,
            &recent_form,
            &head_to_head,
        ]);
        if tier.is_degraded() {
            warn!(
                batter_id = query.batter_id,
                pitcher_id = query.pitcher_id,
                ?tier,
                "matchup served from degraded data"
            );
        } else {
            info!(
                batter_id = query.batter_id,
                pitcher_id = query.pitcher_id,
                ?tier,
                "matchup resolved"
            );
        }

        Ok(MatchupResult {
            batter_id: query.batter_id,
            pitcher_id: query.pitcher_id,
            batter_season,
            pitcher_season,
            recent_form,
            head_to_head,
            derived,
            tier,
        })
    }

    /// Resolve, then ask the configured summariser for commentary.
    ///
    /// Summariser failures and timeouts only drop the insight.
    pub async fn resolve_with_insight(&self, query: &MatchupQuery) -> Result<EnrichedMatchup> {
        let result = self.resolve(query).await?;
        let insight = match &self.insight {
            Some((provider, timeout)) => {
                match tokio::time::timeout(*timeout, provider.summarize(&result)).await {
                    Ok(Ok(text)) => Some(text),
                    Ok(Err(err)) => {
                        warn!("insight unavailable: {err}");
                        None
                    }
                    Err(_) => {
                        warn!(?timeout, "insight timed out");
                        None
                    }
                }
            }
            None => None,
        };
        Ok(EnrichedMatchup { result, insight })
    }

    /// Walk [`STEPS`] for one component.
    async fn resolve_component(
        &self,
        key: StatKey,
        query: &MatchupQuery,
        now: DateTime<Utc>,
    ) -> Result<MatchupComponent> {
        let (cached, read_error) = match self.store.latest(&key, query.as_of).await {
            Ok(cached) => (cached, None),
            Err(err) => {
                warn!(key = %key, "store read failed: {err}");
                (None, Some(err))
            }
        };
        let mut live_error = None;

        for step in STEPS {
            let served = match step {
                Step::FreshCache => cached
                    .as_ref()
                    .filter(|snapshot| !self.policy.is_stale(snapshot, now))
                    .map(|snapshot| (snapshot.clone(), ResultTier::CacheFresh)),
                Step::LiveFetch if query.as_of.is_some() => None,
                Step::LiveFetch => match self.fetch_live(key).await {
                    Ok(snapshot) => Some((snapshot, ResultTier::Live)),
                    Err(err) => {
                        warn!(key = %key, "live fetch failed: {err}");
                        live_error = Some(err);
                        None
                    }
                },
                Step::StaleCache => cached
                    .as_ref()
                    .map(|snapshot| (snapshot.clone(), ResultTier::CacheStale)),
                Step::Placeholder => self.config.mock_fallback.then(|| {
                    let payload = fallback::placeholder(&key.kind);
                    (
                        StatSnapshot::new(key, payload, now, SourceTier::Mock),
                        ResultTier::Mock,
                    )
                }),
            };
            if let Some((snapshot, tier)) = served {
                debug!(key = %key, ?step, ?tier, "component resolved");
                return Ok(MatchupComponent { snapshot, tier });
            }
        }

        Err(read_error.unwrap_or_else(|| {
            BullpenError::RemoteUnavailable(
                live_error.unwrap_or_else(|| FeedError::NotFound(key.to_string())),
            )
        }))
    }

    /// Fetch, validate and persist one snapshot inside a single flight.
    ///
    /// Every concurrent waiter for the key receives the same snapshot, so it is
    /// written once. A failed write still serves the fetched data. The row is
    /// stamped with the time the payload arrived, at the millisecond precision
    /// the stores keep.
    async fn fetch_live(&self, key: StatKey) -> Result<StatSnapshot, FeedError> {
        let feed = Arc::clone(&self.feed);
        let store = Arc::clone(&self.store);
        let recent_games = self.config.recent_games;

        let fetch_key = match key.kind {
            StatKind::RecentForm => FetchKey::recent_games(key.subject_id, recent_games),
            _ => FetchKey::stat(key),
        };
        self.coordinator
            .run(fetch_key, move || async move {
                let payload = fetch_payload(feed.as_ref(), key, recent_games).await?;
                payload
                    .validate(&key.kind)
                    .map_err(|err| FeedError::Malformed(err.to_string()))?;
                let fetched_at = Utc::now().trunc_subsecs(3);
                let snapshot = StatSnapshot::new(key, payload, fetched_at, SourceTier::Live);
                if let Err(err) = store.put(snapshot.clone()).await {
                    warn!(key = %key, "failed to persist live snapshot: {err}");
                }
                Ok(snapshot)
            })
            .await
    }
}

async fn fetch_payload(
    feed: &dyn RemoteFeed,
    key: StatKey,
    recent_games: usize,
) -> Result<StatPayload, FeedError> {
    match key.kind {
        StatKind::Season(role) => feed.fetch_player_season_stats(key.subject_id, role).await,
        StatKind::RecentForm => {
            let lines = feed.fetch_recent_games(key.subject_id, recent_games).await?;
            Ok(form::aggregate(&lines))
        }
        StatKind::HeadToHead {
            batter_id,
            pitcher_id,
        } => feed.fetch_head_to_head(batter_id, pitcher_id).await,
    }
}
