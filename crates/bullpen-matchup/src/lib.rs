//! Matchup resolution with tiered fallback.
//!
//! Each component of a matchup (batter season, pitcher season, batter recent
//! form, head-to-head) walks the same ordered steps: fresh cache, live fetch,
//! stale cache, placeholder. The result carries the weakest tier served.

mod fallback;
mod form;
mod insight;
mod resolver;
pub mod sabermetrics;

pub use fallback::placeholder;
pub use form::aggregate as aggregate_recent_form;
pub use insight::{prompt as insight_prompt, ChatInsightProvider, InsightProvider};
pub use resolver::MatchupResolver;
pub use sabermetrics::LeagueConstants;

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, time::Duration};

    use async_trait::async_trait;
    use bullpen_coordinator::FetchCoordinator;
    use bullpen_feed::{RemoteFeed, ScriptedFeed};
    use bullpen_store::{FreshnessPolicy, MemoryStatStore, StatStore};
    use bullpen_types::{
        config::{FreshnessConfig, ResolverConfig},
        matchup::{MatchupQuery, MatchupResult, MetricValue, ResultTier},
        stats::{GameLogLine, Metric, PlayerRole, SourceTier, StatKey, StatPayload, StatSnapshot},
        BullpenError, FeedError, Result,
    };
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
    use futures::future::join_all;

    const BATTER: u64 = 660271;
    const PITCHER: u64 = 543037;

    fn batter_season() -> StatPayload {
        StatPayload::new()
            .with(Metric::PlateAppearances, 600.0)
            .with(Metric::AtBats, 520.0)
            .with(Metric::Hits, 150.0)
            .with(Metric::Doubles, 30.0)
            .with(Metric::Triples, 2.0)
            .with(Metric::HomeRuns, 25.0)
            .with(Metric::Walks, 60.0)
            .with(Metric::HitByPitch, 5.0)
            .with(Metric::SacFlies, 5.0)
            .with(Metric::Strikeouts, 110.0)
    }

    fn pitcher_season() -> StatPayload {
        StatPayload::new()
            .with(Metric::InningsPitched, 180.0)
            .with(Metric::Strikeouts, 200.0)
            .with(Metric::Walks, 50.0)
            .with(Metric::HitByPitch, 6.0)
            .with(Metric::HomeRuns, 20.0)
    }

    fn head_to_head(hits: f64) -> StatPayload {
        StatPayload::new()
            .with(Metric::PlateAppearances, 12.0)
            .with(Metric::AtBats, 11.0)
            .with(Metric::Hits, hits)
            .with(Metric::HomeRuns, 1.0)
            .with(Metric::Walks, 1.0)
            .with(Metric::Strikeouts, 4.0)
    }

    fn scripted_feed() -> Arc<ScriptedFeed> {
        let feed = ScriptedFeed::new();
        feed.set_season(BATTER, PlayerRole::Batter, batter_season());
        feed.set_season(PITCHER, PlayerRole::Pitcher, pitcher_season());
        feed.set_recent_games(
            BATTER,
            vec![
                GameLogLine {
                    at_bats: 4,
                    hits: 2,
                    total_bases: 3,
                    ..Default::default()
                };
                6
            ],
        );
        feed.set_head_to_head(BATTER, PITCHER, head_to_head(3.0));
        Arc::new(feed)
    }

    fn in_season() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 4, 19, 5, 0).unwrap()
    }

    struct Harness {
        feed: Arc<ScriptedFeed>,
        store: Arc<MemoryStatStore>,
        coordinator: Arc<FetchCoordinator>,
    }

    impl Harness {
        fn new(feed: Arc<ScriptedFeed>) -> Self {
            Self {
                feed,
                store: Arc::new(MemoryStatStore::new()),
                coordinator: Arc::new(FetchCoordinator::new(Duration::from_millis(200))),
            }
        }

        fn resolver(&self, config: ResolverConfig) -> MatchupResolver {
            MatchupResolver::new(
                Arc::clone(&self.store) as Arc<dyn StatStore>,
                Arc::clone(&self.feed) as Arc<dyn RemoteFeed>,
                Arc::clone(&self.coordinator),
                FreshnessPolicy::from_config(&FreshnessConfig::default()),
                config,
            )
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl StatStore for BrokenStore {
        async fn latest(
            &self,
            _key: &StatKey,
            _as_of: Option<DateTime<Utc>>,
        ) -> Result<Option<StatSnapshot>> {
            Err(BullpenError::StoreIo("disk unavailable".into()))
        }

        async fn put(&self, _snapshot: StatSnapshot) -> Result<()> {
            Err(BullpenError::StoreIo("disk unavailable".into()))
        }

        async fn history(&self, _key: &StatKey) -> Result<Vec<StatSnapshot>> {
            Err(BullpenError::StoreIo("disk unavailable".into()))
        }
    }

    #[tokio::test]
    async fn first_call_is_live_and_repeat_is_cached() {
        let harness = Harness::new(scripted_feed());
        let resolver = harness.resolver(ResolverConfig::default());
        let query = MatchupQuery::new(BATTER, PITCHER);

        let first = resolver.resolve(&query).await.unwrap();
        assert_eq!(first.tier, ResultTier::Live);
        assert!(first.components().iter().all(|c| c.tier == ResultTier::Live));

        let second = resolver.resolve(&query).await.unwrap();
        assert_eq!(second.tier, ResultTier::CacheFresh);
        for (a, b) in first.components().iter().zip(second.components()) {
            assert_eq!(a.snapshot, b.snapshot);
        }
        assert_eq!(first.derived, second.derived);

        let third = resolver.resolve(&query).await.unwrap();
        assert_eq!(second, third);
        // Served from cache, but the row still records where it came from.
        assert_eq!(third.head_to_head.snapshot.source_tier, SourceTier::Live);

        let calls = harness.feed.calls();
        assert_eq!(calls.season, 2);
        assert_eq!(calls.recent_games, 1);
        assert_eq!(calls.head_to_head, 1);
    }

    #[tokio::test]
    async fn recent_form_uses_configured_window() {
        let harness = Harness::new(scripted_feed());
        let resolver = harness.resolver(ResolverConfig {
            recent_games: 3,
            ..ResolverConfig::default()
        });
        let result = resolver
            .resolve(&MatchupQuery::new(BATTER, PITCHER))
            .await
            .unwrap();
        let recent = &result.recent_form.snapshot.payload;
        assert_eq!(recent.get(Metric::Games), Some(3.0));
        assert_eq!(recent.get(Metric::AtBats), Some(12.0));
        assert_eq!(recent.get(Metric::Avg), Some(0.5));
    }

    #[tokio::test]
    async fn concurrent_queries_share_one_head_to_head_fetch() {
        let feed = scripted_feed();
        feed.set_latency(Duration::from_millis(30));
        let harness = Harness::new(feed);
        let resolver = harness.resolver(ResolverConfig::default());
        let query = MatchupQuery::new(BATTER, PITCHER);

        let results = join_all((0..8).map(|_| resolver.resolve(&query))).await;
        assert!(results
            .iter()
            .all(|r| r.as_ref().unwrap().tier == ResultTier::Live));
        assert_eq!(harness.feed.calls().head_to_head, 1);
        assert_eq!(harness.feed.calls().season, 2);

        let key = StatKey::head_to_head(BATTER, PITCHER);
        assert_eq!(harness.store.history(&key).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn expired_cache_beats_placeholder_when_feed_fails() {
        let feed = scripted_feed();
        feed.fail_stats(Some(FeedError::RateLimited));
        let harness = Harness::new(feed);
        let seeded = StatSnapshot::new(
            StatKey::head_to_head(BATTER, PITCHER),
            head_to_head(5.0),
            Utc::now() - ChronoDuration::days(30),
            SourceTier::Live,
        );
        harness.store.put(seeded.clone()).await.unwrap();

        let result = harness
            .resolver(ResolverConfig::default())
            .resolve(&MatchupQuery::new(BATTER, PITCHER))
            .await
            .unwrap();
        assert_eq!(result.head_to_head.tier, ResultTier::CacheStale);
        assert_eq!(result.head_to_head.snapshot, seeded);
        assert_eq!(result.batter_season.tier, ResultTier::Mock);
        assert_eq!(result.tier, ResultTier::Mock);
    }

    #[tokio::test]
    async fn empty_store_and_dead_feed_yield_placeholders() {
        let feed = scripted_feed();
        feed.fail_stats(Some(FeedError::Upstream5xx(503)));
        let harness = Harness::new(feed);
        let result = harness
            .resolver(ResolverConfig::default())
            .resolve(&MatchupQuery::new(BATTER, PITCHER))
            .await
            .unwrap();

        assert_eq!(result.tier, ResultTier::Mock);
        for component in result.components() {
            assert_eq!(component.tier, ResultTier::Mock);
            assert_eq!(component.snapshot.source_tier, SourceTier::Mock);
            assert!(!component.snapshot.payload.is_empty());
        }
        assert_eq!(result.derived.head_to_head_ops, MetricValue::NotAvailable);
        assert!(result.derived.fip.is_available());
        assert_eq!(harness.store.len().await, 0);
    }

    #[tokio::test]
    async fn without_placeholders_failures_surface() {
        let feed = scripted_feed();
        feed.fail_stats(Some(FeedError::Timeout));
        let harness = Harness::new(Arc::clone(&feed));
        let config = ResolverConfig {
            mock_fallback: false,
            ..ResolverConfig::default()
        };
        let err = harness
            .resolver(config.clone())
            .resolve(&MatchupQuery::new(BATTER, PITCHER))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BullpenError::RemoteUnavailable(FeedError::Timeout)
        ));

        let broken = MatchupResolver::new(
            Arc::new(BrokenStore),
            feed as Arc<dyn RemoteFeed>,
            Arc::new(FetchCoordinator::new(Duration::from_millis(200))),
            FreshnessPolicy::default(),
            config,
        );
        assert!(matches!(
            broken.resolve(&MatchupQuery::new(BATTER, PITCHER)).await,
            Err(BullpenError::StoreIo(_))
        ));
    }

    #[tokio::test]
    async fn broken_store_still_serves_live_data() {
        let feed = scripted_feed();
        let resolver = MatchupResolver::new(
            Arc::new(BrokenStore),
            feed as Arc<dyn RemoteFeed>,
            Arc::new(FetchCoordinator::new(Duration::from_millis(200))),
            FreshnessPolicy::default(),
            ResolverConfig::default(),
        );
        let result = resolver
            .resolve(&MatchupQuery::new(BATTER, PITCHER))
            .await
            .unwrap();
        assert_eq!(result.tier, ResultTier::Live);
    }

    #[tokio::test]
    async fn invalid_query_never_reaches_the_feed() {
        let harness = Harness::new(scripted_feed());
        let resolver = harness.resolver(ResolverConfig::default());
        assert!(matches!(
            resolver.resolve(&MatchupQuery::new(BATTER, BATTER)).await,
            Err(BullpenError::Configuration(_))
        ));
        assert_eq!(harness.feed.calls(), Default::default());
    }

    #[tokio::test]
    async fn malformed_live_payload_is_not_stored() {
        let feed = scripted_feed();
        feed.set_head_to_head(
            BATTER,
            PITCHER,
            StatPayload::new().with(Metric::Hits, 2.0),
        );
        let harness = Harness::new(feed);
        let result = harness
            .resolver(ResolverConfig::default())
            .resolve(&MatchupQuery::new(BATTER, PITCHER))
            .await
            .unwrap();
        assert_eq!(result.head_to_head.tier, ResultTier::Mock);
        assert!(harness
            .store
            .get(&StatKey::head_to_head(BATTER, PITCHER))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn slow_feed_times_out_to_fallback() {
        let feed = scripted_feed();
        feed.set_latency(Duration::from_millis(500));
        let harness = Harness::new(feed);
        let result = harness
            .resolver(ResolverConfig::default())
            .resolve(&MatchupQuery::new(BATTER, PITCHER))
            .await
            .unwrap();
        assert_eq!(result.tier, ResultTier::Mock);
        assert_eq!(harness.coordinator.stats().timed_out, 4);
    }

    #[tokio::test]
    async fn as_of_pins_the_clock() {
        let harness = Harness::new(scripted_feed());
        let fetched_at = in_season();
        harness
            .store
            .put(StatSnapshot::new(
                StatKey::head_to_head(BATTER, PITCHER),
                head_to_head(4.0),
                fetched_at,
                SourceTier::Live,
            ))
            .await
            .unwrap();
        let resolver = harness.resolver(ResolverConfig::default());

        let pinned = MatchupQuery::new(BATTER, PITCHER).as_of(fetched_at + ChronoDuration::days(2));
        let result = resolver.resolve(&pinned).await.unwrap();
        assert_eq!(result.head_to_head.tier, ResultTier::CacheFresh);
        assert_eq!(result, resolver.resolve(&pinned).await.unwrap());

        // Nothing stored yet at that point in time, and no live fetch for a
        // pinned query.
        let before = MatchupQuery::new(BATTER, PITCHER).as_of(fetched_at - ChronoDuration::hours(1));
        let result = resolver.resolve(&before).await.unwrap();
        assert_eq!(result.head_to_head.tier, ResultTier::Mock);
        assert_eq!(harness.feed.calls(), Default::default());
    }

    #[tokio::test]
    async fn past_as_of_never_writes_backdated_rows() {
        let harness = Harness::new(scripted_feed());
        let resolver = harness.resolver(ResolverConfig::default());

        let last_year = Utc::now() - ChronoDuration::days(400);
        let result = resolver
            .resolve(&MatchupQuery::new(BATTER, PITCHER).as_of(last_year))
            .await
            .unwrap();
        assert_eq!(result.tier, ResultTier::Mock);
        assert_eq!(harness.feed.calls().head_to_head, 0);
        assert!(harness.store.is_empty().await);
    }

    #[tokio::test]
    async fn future_as_of_is_rejected_before_any_work() {
        let harness = Harness::new(scripted_feed());
        let resolver = harness.resolver(ResolverConfig::default());

        let next_year = Utc::now() + ChronoDuration::days(365);
        let err = resolver
            .resolve(&MatchupQuery::new(BATTER, PITCHER).as_of(next_year))
            .await
            .unwrap_err();
        assert!(matches!(err, BullpenError::Configuration(_)));
        assert_eq!(harness.feed.calls(), Default::default());
        assert!(harness.store.is_empty().await);

        // Later plain queries see fresh upstream data, not a future-dated row.
        harness
            .feed
            .set_head_to_head(BATTER, PITCHER, head_to_head(9.0));
        let result = resolver.resolve(&MatchupQuery::new(BATTER, PITCHER)).await.unwrap();
        assert_eq!(result.head_to_head.tier, ResultTier::Live);
        assert_eq!(
            result.head_to_head.snapshot.payload.get(Metric::Hits),
            Some(9.0)
        );
    }

    #[tokio::test]
    async fn live_rows_are_stamped_with_the_fetch_time() {
        let harness = Harness::new(scripted_feed());
        let resolver = harness.resolver(ResolverConfig::default());

        let before = Utc::now() - ChronoDuration::milliseconds(1);
        resolver
            .resolve(&MatchupQuery::new(BATTER, PITCHER))
            .await
            .unwrap();
        let after = Utc::now();

        let stored = harness
            .store
            .get(&StatKey::head_to_head(BATTER, PITCHER))
            .await
            .unwrap()
            .unwrap();
        assert!(stored.fetched_at >= before && stored.fetched_at <= after);
        assert_eq!(stored.fetched_at.timestamp_subsec_nanos() % 1_000_000, 0);
    }

    struct FixedInsight(&'static str);

    #[async_trait]
    impl InsightProvider for FixedInsight {
        async fn summarize(&self, _matchup: &MatchupResult) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct FailingInsight;

    #[async_trait]
    impl InsightProvider for FailingInsight {
        async fn summarize(&self, _matchup: &MatchupResult) -> Result<String> {
            Err(BullpenError::Ops("summariser offline".into()))
        }
    }

    struct SlowInsight;

    #[async_trait]
    impl InsightProvider for SlowInsight {
        async fn summarize(&self, _matchup: &MatchupResult) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".into())
        }
    }

    #[tokio::test]
    async fn insight_is_attached_when_available() {
        let harness = Harness::new(scripted_feed());
        let resolver = harness
            .resolver(ResolverConfig::default())
            .with_insight(Arc::new(FixedInsight("Edge: batter")), Duration::from_secs(1));
        let enriched = resolver
            .resolve_with_insight(&MatchupQuery::new(BATTER, PITCHER))
            .await
            .unwrap();
        assert_eq!(enriched.insight.as_deref(), Some("Edge: batter"));
        assert_eq!(enriched.result.tier, ResultTier::Live);
    }

    #[tokio::test]
    async fn insight_failures_leave_result_untouched() {
        let providers: [Arc<dyn InsightProvider>; 2] =
            [Arc::new(FailingInsight), Arc::new(SlowInsight)];
        for provider in providers {
            let harness = Harness::new(scripted_feed());
            let resolver = harness
                .resolver(ResolverConfig::default())
                .with_insight(provider, Duration::from_millis(50));
            let enriched = resolver
                .resolve_with_insight(&MatchupQuery::new(BATTER, PITCHER))
                .await
                .unwrap();
            assert!(enriched.insight.is_none());
            assert_eq!(enriched.result.tier, ResultTier::Live);
        }
    }

    #[tokio::test]
    async fn prompt_reports_values_and_provenance() {
        let harness = Harness::new(scripted_feed());
        let result = harness
            .resolver(ResolverConfig::default())
            .resolve(&MatchupQuery::new(BATTER, PITCHER))
            .await
            .unwrap();
        let text = insight_prompt(&result);
        assert!(text.contains(&format!("BATTER {BATTER} (data: Live)")));
        assert!(text.contains(&format!("- FIP: {}", result.derived.fip)));
        assert!(text.contains("win probability"));
    }
}
