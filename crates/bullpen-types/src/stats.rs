use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BullpenError, PlayerId, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerRole {
    Batter,
    Pitcher,
}

/// Which slice of a player's record a snapshot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatKind {
    Season(PlayerRole),
    RecentForm,
    HeadToHead {
        batter_id: PlayerId,
        pitcher_id: PlayerId,
    },
}

impl StatKind {
    /// Metrics a payload of this kind must carry.
    pub fn required_metrics(&self) -> &'static [Metric] {
        use Metric::*;
        match self {
            StatKind::Season(PlayerRole::Batter) => &[
                PlateAppearances,
                AtBats,
                Hits,
                Doubles,
                Triples,
                HomeRuns,
                Walks,
                HitByPitch,
                SacFlies,
                Strikeouts,
            ],
            StatKind::Season(PlayerRole::Pitcher) => {
                &[InningsPitched, Strikeouts, Walks, HitByPitch, HomeRuns]
            }
            StatKind::RecentForm => &[
                Games, AtBats, Hits, Walks, HitByPitch, SacFlies, TotalBases, Avg, Obp, Slg, Ops,
            ],
            StatKind::HeadToHead { .. } => {
                &[PlateAppearances, AtBats, Hits, HomeRuns, Walks, Strikeouts]
            }
        }
    }

    /// Metrics a payload of this kind may carry beyond the required set.
    pub fn optional_metrics(&self) -> &'static [Metric] {
        use Metric::*;
        match self {
            StatKind::Season(PlayerRole::Batter) => &[
                IntentionalWalks,
                TotalBases,
                Rbi,
                Games,
                Avg,
                Obp,
                Slg,
                Ops,
            ],
            StatKind::Season(PlayerRole::Pitcher) => &[
                Games,
                Hits,
                EarnedRuns,
                BattersFaced,
                IntentionalWalks,
                Era,
                Whip,
            ],
            StatKind::RecentForm => &[PlateAppearances, HomeRuns, Strikeouts],
            StatKind::HeadToHead { .. } => &[
                Doubles, Triples, HitByPitch, SacFlies, TotalBases, Rbi, Avg, Obp, Slg, Ops,
            ],
        }
    }

    pub fn allows(&self, metric: Metric) -> bool {
        self.required_metrics().contains(&metric) || self.optional_metrics().contains(&metric)
    }
}

/// Where a row's payload originally came from.
///
/// This is the origin of the data, not how a query was served: a row fetched
/// live and later read back from the store stays `Live`. The serving tier is
/// [`ResultTier`](crate::matchup::ResultTier) on each matchup component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceTier {
    Live,
    /// Copied from another cache rather than fetched upstream. The resolver
    /// never writes it.
    Cache,
    Mock,
}

/// Fixed vocabulary of raw metrics accepted into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Games,
    PlateAppearances,
    AtBats,
    Hits,
    Doubles,
    Triples,
    HomeRuns,
    Walks,
    IntentionalWalks,
    HitByPitch,
    SacFlies,
    Strikeouts,
    TotalBases,
    Rbi,
    Avg,
    Obp,
    Slg,
    Ops,
    InningsPitched,
    EarnedRuns,
    BattersFaced,
    Era,
    Whip,
}

/// Typed metric map. Ordered so serialisation is stable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatPayload(BTreeMap<Metric, f64>);

impl StatPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, metric: Metric, value: f64) -> Self {
        self.0.insert(metric, value);
        self
    }

    pub fn insert(&mut self, metric: Metric, value: f64) -> Option<f64> {
        self.0.insert(metric, value)
    }

    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.0.get(&metric).copied()
    }

    /// Missing metrics read as zero.
    pub fn get_or_zero(&self, metric: Metric) -> f64 {
        self.get(metric).unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        self.0.iter().map(|(m, v)| (*m, *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Rejects unknown keys, missing required keys and non-finite or negative values.
    pub fn validate(&self, kind: &StatKind) -> Result<()> {
        for (metric, value) in self.iter() {
            if !kind.allows(metric) {
                return Err(BullpenError::StoreIo(format!(
                    "metric {metric:?} is not valid for {kind:?}"
                )));
            }
            if !value.is_finite() || value < 0.0 {
                return Err(BullpenError::StoreIo(format!(
                    "metric {metric:?} has invalid value {value}"
                )));
            }
        }
        if let Some(missing) = kind
            .required_metrics()
            .iter()
            .find(|m| !self.0.contains_key(m))
        {
            return Err(BullpenError::StoreIo(format!(
                "payload for {kind:?} is missing {missing:?}"
            )));
        }
        Ok(())
    }
}

impl FromIterator<(Metric, f64)> for StatPayload {
    fn from_iter<I: IntoIterator<Item = (Metric, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Store key: one logical series of snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatKey {
    pub kind: StatKind,
    pub subject_id: PlayerId,
}

impl StatKey {
    pub fn new(kind: StatKind, subject_id: PlayerId) -> Self {
        Self { kind, subject_id }
    }

    pub fn head_to_head(batter_id: PlayerId, pitcher_id: PlayerId) -> Self {
        Self::new(
            StatKind::HeadToHead {
                batter_id,
                pitcher_id,
            },
            batter_id,
        )
    }
}

impl fmt::Display for StatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            StatKind::Season(PlayerRole::Batter) => write!(f, "season:batter:{}", self.subject_id),
            StatKind::Season(PlayerRole::Pitcher) => {
                write!(f, "season:pitcher:{}", self.subject_id)
            }
            StatKind::RecentForm => write!(f, "recent:{}", self.subject_id),
            StatKind::HeadToHead {
                batter_id,
                pitcher_id,
            } => write!(f, "headtohead:{batter_id}:{pitcher_id}"),
        }
    }
}

/// Immutable stat snapshot. Refreshing creates a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatSnapshot {
    pub subject_id: PlayerId,
    pub kind: StatKind,
    pub payload: StatPayload,
    pub fetched_at: DateTime<Utc>,
    /// Origin of the payload; see [`SourceTier`].
    pub source_tier: SourceTier,
}

impl StatSnapshot {
    pub fn new(
        key: StatKey,
        payload: StatPayload,
        fetched_at: DateTime<Utc>,
        source_tier: SourceTier,
    ) -> Self {
        Self {
            subject_id: key.subject_id,
            kind: key.kind,
            payload,
            fetched_at,
            source_tier,
        }
    }

    pub fn key(&self) -> StatKey {
        StatKey::new(self.kind, self.subject_id)
    }
}

/// One game line as returned by a player's game log.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GameLogLine {
    pub at_bats: u32,
    pub hits: u32,
    pub walks: u32,
    pub hit_by_pitch: u32,
    pub sac_flies: u32,
    pub total_bases: u32,
    pub home_runs: u32,
    pub strikeouts: u32,
}
