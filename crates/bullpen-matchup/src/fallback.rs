//! Placeholder payloads served when neither the feed nor the store can answer.
//!
//! Season and recent-form placeholders describe a league-average player
//! (roughly the 2023 MLB totals scaled to 600 plate appearances, 180 innings
//! and five games). Head-to-head has no meaningful average, so its placeholder
//! is an empty history: every count is zero and every derived rate is N/A.
//! Results built from these carry [`ResultTier::Mock`](bullpen_types::matchup::ResultTier::Mock)
//! and are never written to the store.

use bullpen_types::stats::{GameLogLine, Metric, PlayerRole, StatKind, StatPayload};

use crate::form;

pub fn placeholder(kind: &StatKind) -> StatPayload {
    match kind {
        StatKind::Season(PlayerRole::Batter) => StatPayload::new()
            .with(Metric::PlateAppearances, 600.0)
            .with(Metric::AtBats, 535.0)
            .with(Metric::Hits, 133.0)
            .with(Metric::Doubles, 26.0)
            .with(Metric::Triples, 2.0)
            .with(Metric::HomeRuns, 19.0)
            .with(Metric::Walks, 50.0)
            .with(Metric::IntentionalWalks, 2.0)
            .with(Metric::HitByPitch, 7.0)
            .with(Metric::SacFlies, 4.0)
            .with(Metric::Strikeouts, 135.0),
        StatKind::Season(PlayerRole::Pitcher) => StatPayload::new()
            .with(Metric::InningsPitched, 180.0)
            .with(Metric::Strikeouts, 170.0)
            .with(Metric::Walks, 60.0)
            .with(Metric::HitByPitch, 8.0)
            .with(Metric::HomeRuns, 24.0)
            .with(Metric::Era, 4.33),
        StatKind::RecentForm => form::summarize(
            5,
            &GameLogLine {
                at_bats: 19,
                hits: 5,
                walks: 2,
                hit_by_pitch: 0,
                sac_flies: 0,
                total_bases: 8,
                home_runs: 1,
                strikeouts: 4,
            },
        ),
        StatKind::HeadToHead { .. } => kind
            .required_metrics()
            .iter()
            .map(|metric| (*metric, 0.0))
            .collect(),
    }
}
