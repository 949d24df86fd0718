use std::{sync::Arc, time::Duration};

use bullpen_types::{BullpenError, GameId, Result};
use futures::future::join_all;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{info, warn};

use crate::{GameStateTracker, PollOutcome};

/// Timer task that polls every tracked game once per tick.
pub struct Poller {
    tracker: Arc<GameStateTracker>,
    period: Duration,
}

impl Poller {
    pub fn new(tracker: Arc<GameStateTracker>, period: Duration) -> Self {
        Self { tracker, period }
    }

    /// Poll all unfinished games concurrently.
    pub async fn tick(&self) -> Vec<(GameId, Result<PollOutcome>)> {
        let games = self.tracker.pollable_games().await;
        let outcomes = join_all(games.iter().map(|id| self.tracker.poll(*id))).await;
        games.into_iter().zip(outcomes).collect()
    }

    pub fn spawn(self) -> PollerHandle {
        let (shutdown, mut stop) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(period = ?self.period, "poller started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        for (game_id, outcome) in self.tick().await {
                            if let Err(err) = outcome {
                                warn!(game_id, "poll failed: {err}");
                            }
                        }
                    }
                    _ = stop.changed() => break,
                }
            }
            info!("poller stopped");
        });
        PollerHandle { shutdown, task }
    }
}

pub struct PollerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Stop after the current tick finishes.
    pub async fn shutdown(self) -> Result<()> {
        // A closed channel means the task already exited.
        let _ = self.shutdown.send(true);
        self.task
            .await
            .map_err(|err| BullpenError::Ops(format!("poller task failed: {err}")))
    }
}
