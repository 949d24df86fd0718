use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    stats::StatSnapshot,
    BullpenError, PlayerId, Result,
};

/// Per-request matchup question. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchupQuery {
    pub batter_id: PlayerId,
    pub pitcher_id: PlayerId,
    /// Pins the resolver clock for reproducible answers. Must not be in the
    /// future.
    pub as_of: Option<DateTime<Utc>>,
}

impl MatchupQuery {
    pub fn new(batter_id: PlayerId, pitcher_id: PlayerId) -> Self {
        Self {
            batter_id,
            pitcher_id,
            as_of: None,
        }
    }

    pub fn as_of(mut self, at: DateTime<Utc>) -> Self {
        self.as_of = Some(at);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.batter_id == 0 || self.pitcher_id == 0 {
            return Err(BullpenError::Configuration(format!(
                "player ids must be non-zero (batter {}, pitcher {})",
                self.batter_id, self.pitcher_id
            )));
        }
        if self.batter_id == self.pitcher_id {
            return Err(BullpenError::Configuration(format!(
                "batter and pitcher are the same player ({})",
                self.batter_id
            )));
        }
        if let Some(at) = self.as_of.filter(|at| *at > Utc::now()) {
            return Err(BullpenError::Configuration(format!(
                "as_of {} is in the future",
                at.to_rfc3339()
            )));
        }
        Ok(())
    }
}

/// How a resolved component was served, ordered worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResultTier {
    Mock,
    CacheStale,
    CacheFresh,
    Live,
}

impl ResultTier {
    /// Whether callers should warn that data is degraded.
    pub fn is_degraded(self) -> bool {
        self < ResultTier::CacheFresh
    }
}

/// A derived metric, or `N/A` when its inputs cannot support it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MetricValue {
    Value(f64),
    NotAvailable,
}

impl MetricValue {
    pub fn value(self) -> Option<f64> {
        match self {
            MetricValue::Value(v) => Some(v),
            MetricValue::NotAvailable => None,
        }
    }

    pub fn is_available(self) -> bool {
        matches!(self, MetricValue::Value(_))
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Value(v) => write!(f, "{v:.3}"),
            MetricValue::NotAvailable => f.write_str("N/A"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub babip: MetricValue,
    pub woba: MetricValue,
    pub wrc_plus: MetricValue,
    pub batter_war: MetricValue,
    pub fip: MetricValue,
    pub fip_minus: MetricValue,
    pub pitcher_war: MetricValue,
    pub recent_ops: MetricValue,
    pub head_to_head_ops: MetricValue,
}

/// One resolved snapshot and the tier that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchupComponent {
    pub snapshot: StatSnapshot,
    pub tier: ResultTier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchupResult {
    pub batter_id: PlayerId,
    pub pitcher_id: PlayerId,
    pub batter_season: MatchupComponent,
    pub pitcher_season: MatchupComponent,
    pub recent_form: MatchupComponent,
    pub head_to_head: MatchupComponent,
    pub derived: DerivedMetrics,
    /// Weakest tier among the components.
    pub tier: ResultTier,
}

impl MatchupResult {
    pub fn components(&self) -> [&MatchupComponent; 4] {
        [
            &self.batter_season,
            &self.pitcher_season,
            &self.recent_form,
            &self.head_to_head,
        ]
    }

    pub fn weakest_tier(components: &[&MatchupComponent]) -> ResultTier {
        components
            .iter()
            .map(|c| c.tier)
            .min()
            .unwrap_or(ResultTier::Mock)
    }
}

/// Matchup result with optional free-text insight from an external summariser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedMatchup {
    pub result: MatchupResult,
    pub insight: Option<String>,
}
