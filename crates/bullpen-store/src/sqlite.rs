use std::{path::Path, str::FromStr};

use async_trait::async_trait;
use bullpen_types::{
    stats::{StatKey, StatSnapshot},
    Result,
};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow},
    Row, SqlitePool,
};
use tracing::{debug, info};

use crate::{check_writable, store_error, StatStore};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS stat_snapshots (
    stat_key TEXT NOT NULL,
    subject_id INTEGER NOT NULL,
    kind TEXT NOT NULL,
    payload TEXT NOT NULL,
    fetched_at_ms INTEGER NOT NULL,
    source_tier TEXT NOT NULL,
    PRIMARY KEY (stat_key, fetched_at_ms)
)
"#;

/// SQLite-backed snapshot store. Timestamps are kept at millisecond precision.
#[derive(Clone)]
pub struct SqliteStatStore {
    pool: SqlitePool,
}

impl SqliteStatStore {
    /// Open (creating if needed) the database file at `path`.
    pub async fn open(path: &str) -> Result<Self> {
        info!(path, "opening stat store");
        if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| store_error(format!("create {parent:?}: {err}")))?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|err| store_error(format!("connect {path}: {err}")))?;
        Self::with_pool(pool).await
    }

    /// Private in-memory database, mostly for tests.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|err| store_error(err.to_string()))?;
        // Each connection would otherwise see its own empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|err| store_error(err.to_string()))?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|err| store_error(format!("initialise schema: {err}")))?;
        Ok(Self { pool })
    }

    fn decode(row: &SqliteRow) -> Result<StatSnapshot> {
        let column = |err: sqlx::Error| store_error(format!("read row: {err}"));
        let subject_id: i64 = row.try_get("subject_id").map_err(column)?;
        let kind: String = row.try_get("kind").map_err(column)?;
        let payload: String = row.try_get("payload").map_err(column)?;
        let fetched_at_ms: i64 = row.try_get("fetched_at_ms").map_err(column)?;
        let source_tier: String = row.try_get("source_tier").map_err(column)?;

        let json = |err: serde_json::Error| store_error(format!("decode row: {err}"));
        let fetched_at = DateTime::<Utc>::from_timestamp_millis(fetched_at_ms)
            .ok_or_else(|| store_error(format!("timestamp {fetched_at_ms} out of range")))?;
        Ok(StatSnapshot {
            subject_id: subject_id as u64,
            kind: serde_json::from_str(&kind).map_err(json)?,
            payload: serde_json::from_str(&payload).map_err(json)?,
            fetched_at,
            source_tier: serde_json::from_str(&source_tier).map_err(json)?,
        })
    }
}

#[async_trait]
impl StatStore for SqliteStatStore {
    async fn latest(
        &self,
        key: &StatKey,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Option<StatSnapshot>> {
        let cutoff = as_of.map_or(i64::MAX, |t| t.timestamp_millis());
        let row = sqlx::query(
            r#"
            SELECT subject_id, kind, payload, fetched_at_ms, source_tier
            FROM stat_snapshots
            WHERE stat_key = ? AND fetched_at_ms <= ?
            ORDER BY fetched_at_ms DESC
            LIMIT 1
            "#,
        )
        .bind(key.to_string())
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| store_error(format!("read {key}: {err}")))?;

        row.as_ref().map(Self::decode).transpose()
    }

    async fn put(&self, snapshot: StatSnapshot) -> Result<()> {
        check_writable(&snapshot)?;
        let key = snapshot.key();
        let encode = |err: serde_json::Error| store_error(format!("encode {key}: {err}"));
        let kind = serde_json::to_string(&snapshot.kind).map_err(encode)?;
        let payload = serde_json::to_string(&snapshot.payload).map_err(encode)?;
        let tier = serde_json::to_string(&snapshot.source_tier).map_err(encode)?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO stat_snapshots (
                stat_key, subject_id, kind, payload, fetched_at_ms, source_tier
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(key.to_string())
        .bind(snapshot.subject_id as i64)
        .bind(kind)
        .bind(payload)
        .bind(snapshot.fetched_at.timestamp_millis())
        .bind(tier)
        .execute(&self.pool)
        .await
        .map_err(|err| store_error(format!("write {key}: {err}")))?;

        debug!(key = %key, "stored snapshot");
        Ok(())
    }

    async fn history(&self, key: &StatKey) -> Result<Vec<StatSnapshot>> {
        let rows = sqlx::query(
            r#"
            SELECT subject_id, kind, payload, fetched_at_ms, source_tier
            FROM stat_snapshots
            WHERE stat_key = ?
            ORDER BY fetched_at_ms ASC
            "#,
        )
        .bind(key.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|err| store_error(format!("read {key}: {err}")))?;

        rows.iter().map(Self::decode).collect()
    }
}
