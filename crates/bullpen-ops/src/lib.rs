//! Operational helpers: logging, data directory, update journal.

use std::path::{Path, PathBuf};

use bullpen_types::{config::OpsConfig, events::GameUpdate, BullpenError, Result};
use futures::{stream::BoxStream, StreamExt};
use tokio::{
    fs::{self, OpenOptions},
    io::AsyncWriteExt,
    sync::Mutex,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

const JOURNAL_FILE: &str = "updates.jsonl";

pub fn init_tracing(config: &OpsConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.log_level.clone())
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| BullpenError::Ops(format!("failed to create log filter: {err}")))?;

    fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| BullpenError::Ops(format!("tracing init error: {err}")))?;
    Ok(())
}

pub fn ensure_data_dir(path: &str) -> Result<PathBuf> {
    let dir = PathBuf::from(path);
    std::fs::create_dir_all(&dir)
        .map_err(|err| BullpenError::Ops(format!("failed to create data dir: {err}")))?;
    info!("Data directory ready at {:?}", dir);
    Ok(dir)
}

/// Append-only JSON-lines record of accepted game updates.
pub struct UpdateJournal {
    path: PathBuf,
    write: Mutex<()>,
}

impl UpdateJournal {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(JOURNAL_FILE),
            write: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn record(&self, update: &GameUpdate) -> Result<()> {
        let mut line = serde_json::to_string(update)
            .map_err(|err| BullpenError::Ops(format!("encode update: {err}")))?;
        line.push('\n');

        let _guard = self.write.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|err| BullpenError::Ops(format!("open {:?}: {err}", self.path)))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|err| BullpenError::Ops(format!("append {:?}: {err}", self.path)))?;
        file.flush()
            .await
            .map_err(|err| BullpenError::Ops(format!("flush {:?}: {err}", self.path)))
    }

    /// Every recorded update in write order. A missing journal is empty.
    pub async fn replay(&self) -> Result<Vec<GameUpdate>> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(BullpenError::Ops(format!("read {:?}: {err}", self.path)));
            }
        };
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(idx, line)| {
                serde_json::from_str(line).map_err(|err| {
                    BullpenError::Ops(format!("journal line {}: {err}", idx + 1))
                })
            })
            .collect()
    }

    /// Record every update from `updates` until the stream ends.
    pub async fn follow(&self, mut updates: BoxStream<'static, GameUpdate>) {
        while let Some(update) = updates.next().await {
            if let Err(err) = self.record(&update).await {
                warn!(game_id = update.state.game_id, "journal write failed: {err}");
            }
        }
    }
}
