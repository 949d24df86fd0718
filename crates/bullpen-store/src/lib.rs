//! Persisted stat snapshot repository and staleness policy.

mod policy;
mod sqlite;

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bullpen_types::{
    stats::{SourceTier, StatKey, StatSnapshot},
    BullpenError, Result,
};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

pub use policy::FreshnessPolicy;
pub use sqlite::SqliteStatStore;

/// Append-only snapshot repository.
///
/// `put` always adds a row keyed by `(key, fetched_at)`; reads return the row
/// with the greatest `fetched_at`. Two writes with the same timestamp resolve
/// last-write-wins.
#[async_trait]
pub trait StatStore: Send + Sync {
    /// Latest snapshot for `key` fetched no later than `as_of` (unbounded when `None`).
    async fn latest(
        &self,
        key: &StatKey,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Option<StatSnapshot>>;

    async fn put(&self, snapshot: StatSnapshot) -> Result<()>;

    /// Every stored snapshot for `key`, oldest first.
    async fn history(&self, key: &StatKey) -> Result<Vec<StatSnapshot>>;

    async fn get(&self, key: &StatKey) -> Result<Option<StatSnapshot>> {
        self.latest(key, None).await
    }
}

/// Generate an error aligned with store semantics.
pub fn store_error(message: impl Into<String>) -> BullpenError {
    BullpenError::StoreIo(message.into())
}

/// Boundary check shared by every backend.
pub fn check_writable(snapshot: &StatSnapshot) -> Result<()> {
    if snapshot.source_tier == SourceTier::Mock {
        return Err(store_error(format!(
            "refusing to persist placeholder snapshot for {}",
            snapshot.key()
        )));
    }
    snapshot.payload.validate(&snapshot.kind)
}

/// In-memory store for tests and ephemeral runs.
#[derive(Clone, Default)]
pub struct MemoryStatStore {
    rows: Arc<Mutex<HashMap<StatKey, Vec<StatSnapshot>>>>,
}

impl MemoryStatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.values().all(Vec::is_empty)
    }
}

#[async_trait]
impl StatStore for MemoryStatStore {
    async fn latest(
        &self,
        key: &StatKey,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Option<StatSnapshot>> {
        let rows = self.rows.lock().await;
        Ok(rows.get(key).and_then(|series| {
            series
                .iter()
                .rev()
                .find(|s| as_of.map_or(true, |cutoff| s.fetched_at <= cutoff))
                .cloned()
        }))
    }

    async fn put(&self, snapshot: StatSnapshot) -> Result<()> {
        check_writable(&snapshot)?;
        let key = snapshot.key();
        let mut rows = self.rows.lock().await;
        let series = rows.entry(key).or_default();
        match series.binary_search_by(|s| s.fetched_at.cmp(&snapshot.fetched_at)) {
            Ok(idx) => series[idx] = snapshot,
            Err(idx) => series.insert(idx, snapshot),
        }
        debug!(key = %key, rows = series.len(), "stored snapshot");
        Ok(())
    }

    async fn history(&self, key: &StatKey) -> Result<Vec<StatSnapshot>> {
        Ok(self
            .rows
            .lock()
            .await
            .get(key)
            .cloned()
            .unwrap_or_default())
    }
}
