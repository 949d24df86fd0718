//! Fan-out of accepted game updates to downstream consumers.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use bullpen_types::{
    events::GameUpdate,
    game::{AtBatEvent, GameState},
};
use futures::{stream::BoxStream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, warn};

/// Receives every accepted tracker transition.
///
/// Called on the polling task after the tracker has released its state lock;
/// implementations must hand work off rather than block.
pub trait GameObserver: Send + Sync {
    fn on_game_update(&self, state: &GameState, events: &[AtBatEvent]);
}

/// Broadcast hub that turns observer callbacks into subscribable streams.
///
/// Delivery is at-most-once: a subscriber that falls more than `capacity`
/// updates behind loses the oldest ones.
#[derive(Clone)]
pub struct UpdateHub {
    tx: broadcast::Sender<GameUpdate>,
    published: Arc<AtomicU64>,
}

impl UpdateHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            published: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publish an update; returns how many subscribers were live to receive it.
    pub fn publish(&self, update: GameUpdate) -> usize {
        self.published.fetch_add(1, Ordering::SeqCst);
        // No receivers is not an error: nobody is watching yet.
        self.tx.send(update).unwrap_or(0)
    }

    pub fn subscribe(&self) -> BoxStream<'static, GameUpdate> {
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(|update| async move {
                match update {
                    Ok(update) => Some(update),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(skipped, "subscriber lagged; updates dropped");
                        None
                    }
                }
            })
            .boxed()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::SeqCst)
    }
}

impl GameObserver for UpdateHub {
    fn on_game_update(&self, state: &GameState, events: &[AtBatEvent]) {
        let receivers = self.publish(GameUpdate::new(state.clone(), events.to_vec()));
        debug!(
            game_id = state.game_id,
            last_event_id = state.last_event_id,
            events = events.len(),
            receivers,
            "published game update"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bullpen_types::game::{
        AtBatOutcome, Bases, Count, GameStatus, InningHalf, Score,
    };
    use chrono::Utc;

    fn state(last_event_id: u64) -> GameState {
        GameState {
            game_id: 778549,
            status: GameStatus::Live,
            inning: 4,
            inning_half: InningHalf::Top,
            outs: 1,
            bases: Bases::default(),
            count: Count::default(),
            score: Score::default(),
            current_batter_id: Some(1),
            current_pitcher_id: Some(2),
            last_event_id,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscribers_receive_observer_updates() {
        let hub = UpdateHub::new(8);
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);

        let event = AtBatEvent {
            game_id: 778549,
            event_id: 5,
            batter_id: 1,
            pitcher_id: 2,
            outcome: AtBatOutcome::Single,
            timestamp: Utc::now(),
        };
        hub.on_game_update(&state(5), &[event.clone()]);

        for stream in [&mut first, &mut second] {
            let update = stream.next().await.expect("update delivered");
            assert_eq!(update.state.last_event_id, 5);
            assert_eq!(update.events, vec![event.clone()]);
        }
        assert_eq!(hub.published(), 1);
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_harmless() {
        let hub = UpdateHub::new(4);
        assert_eq!(hub.publish(GameUpdate::new(state(1), Vec::new())), 0);
        assert_eq!(hub.published(), 1);
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_to_newest() {
        let hub = UpdateHub::new(2);
        let mut slow = hub.subscribe();
        for id in 1..=5 {
            hub.publish(GameUpdate::new(state(id), Vec::new()));
        }
        let next = slow.next().await.expect("newest updates retained");
        assert_eq!(next.state.last_event_id, 4);
    }
}
