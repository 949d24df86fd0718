use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{BullpenError, GameId, Result};

pub const MIN_POLL_INTERVAL_SECS: u64 = 20;
pub const MAX_POLL_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "https://statsapi.mlb.com".into(),
            request_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub game_ids: Vec<GameId>,
    pub observer_capacity: usize,
}

impl TrackerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            game_ids: Vec::new(),
            observer_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    pub fetch_timeout_ms: u64,
    pub recent_games: usize,
    #[serde(default = "default_true")]
    pub mock_fallback: bool,
}

impl ResolverConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: 5_000,
            recent_games: 5,
            mock_fallback: true,
        }
    }
}

/// Per-kind freshness windows and the in-season month range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreshnessConfig {
    pub season_hours: i64,
    pub recent_form_minutes: i64,
    pub head_to_head_days: i64,
    pub season_start_month: u32,
    pub season_end_month: u32,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            season_hours: 24,
            recent_form_minutes: 60,
            head_to_head_days: 7,
            season_start_month: 3,
            season_end_month: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub sqlite_path: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            sqlite_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsConfig {
    pub log_level: String,
    pub data_dir: String,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            data_dir: "bullpen_data".into(),
        }
    }
}

/// Optional AI summariser endpoint (OpenAI-compatible chat completions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key_env: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BullpenConfig {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub freshness: FreshnessConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub ops: OpsConfig,
    pub insight: Option<InsightConfig>,
}

impl BullpenConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            BullpenError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            BullpenError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.feed.base_url.is_empty() {
            return Err(BullpenError::Configuration(
                "feed.base_url must not be empty".into(),
            ));
        }
        if !(MIN_POLL_INTERVAL_SECS..=MAX_POLL_INTERVAL_SECS)
            .contains(&self.tracker.poll_interval_secs)
        {
            return Err(BullpenError::Configuration(format!(
                "tracker.poll_interval_secs must be between {MIN_POLL_INTERVAL_SECS} and {MAX_POLL_INTERVAL_SECS}"
            )));
        }
        if self.tracker.game_ids.contains(&0) {
            return Err(BullpenError::Configuration(
                "tracker.game_ids must not contain 0".into(),
            ));
        }
        if self.tracker.observer_capacity == 0 {
            return Err(BullpenError::Configuration(
                "tracker.observer_capacity must be greater than zero".into(),
            ));
        }
        if self.resolver.fetch_timeout_ms == 0 {
            return Err(BullpenError::Configuration(
                "resolver.fetch_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.resolver.recent_games == 0 {
            return Err(BullpenError::Configuration(
                "resolver.recent_games must be greater than zero".into(),
            ));
        }
        let f = &self.freshness;
        if f.season_hours <= 0 || f.recent_form_minutes <= 0 || f.head_to_head_days <= 0 {
            return Err(BullpenError::Configuration(
                "freshness windows must be positive".into(),
            ));
        }
        if !(1..=12).contains(&f.season_start_month) || !(1..=12).contains(&f.season_end_month) {
            return Err(BullpenError::Configuration(
                "freshness season months must be between 1 and 12".into(),
            ));
        }
        if self.store.backend == StoreBackend::Sqlite && self.store.sqlite_path.is_none() {
            return Err(BullpenError::Configuration(
                "store.sqlite_path is required for the sqlite backend".into(),
            ));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}
