use bullpen_types::{
    config::FreshnessConfig,
    stats::{StatKind, StatSnapshot},
};
use chrono::{DateTime, Datelike, Duration, Utc};

/// Kind-specific freshness windows.
///
/// Staleness is a pure function of the snapshot timestamp and `now`.
#[derive(Debug, Clone)]
pub struct FreshnessPolicy {
    season: Duration,
    recent_form: Duration,
    head_to_head: Duration,
    season_start_month: u32,
    season_end_month: u32,
}

impl FreshnessPolicy {
    pub fn from_config(config: &FreshnessConfig) -> Self {
        Self {
            season: Duration::hours(config.season_hours),
            recent_form: Duration::minutes(config.recent_form_minutes),
            head_to_head: Duration::days(config.head_to_head_days),
            season_start_month: config.season_start_month,
            season_end_month: config.season_end_month,
        }
    }

    /// Whether `now` falls inside the configured season months. Ranges may
    /// wrap the new year (e.g. 10..=2 for a winter league).
    pub fn is_in_season(&self, now: DateTime<Utc>) -> bool {
        let month = now.month();
        if self.season_start_month <= self.season_end_month {
            (self.season_start_month..=self.season_end_month).contains(&month)
        } else {
            month >= self.season_start_month || month <= self.season_end_month
        }
    }

    /// Freshness window for `kind` at `now`. `None` means never stale.
    pub fn window(&self, kind: &StatKind, now: DateTime<Utc>) -> Option<Duration> {
        match kind {
            StatKind::Season(_) => Some(self.season),
            StatKind::RecentForm if self.is_in_season(now) => Some(self.recent_form),
            // No games are played, so recent form cannot change.
            StatKind::RecentForm => None,
            StatKind::HeadToHead { .. } => Some(self.head_to_head),
        }
    }

    pub fn is_stale(&self, snapshot: &StatSnapshot, now: DateTime<Utc>) -> bool {
        match self.window(&snapshot.kind, now) {
            Some(window) => now.signed_duration_since(snapshot.fetched_at) > window,
            None => false,
        }
    }
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self::from_config(&FreshnessConfig::default())
    }
}
