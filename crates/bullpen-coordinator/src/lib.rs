//! Single-flight deduplication of remote fetches.
//!
//! At most one remote call runs per [`FetchKey`] at a time. Callers that
//! arrive while it is in flight wait on the same call and receive a clone of
//! its result. The deadline belongs to the call, not to any waiter: when it
//! expires every waiter sees [`FeedError::Timeout`] and the slot is released.

use std::{
    any::Any,
    collections::HashMap,
    fmt,
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use bullpen_types::{
    stats::{PlayerRole, StatKey, StatKind},
    FeedError, GameId, PlayerId, Result,
};
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, warn};

/// Deterministic identity of one remote operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchKey(String);

impl FetchKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn game_state(game_id: GameId) -> Self {
        Self(format!("game:{game_id}"))
    }

    pub fn season(player_id: PlayerId, role: PlayerRole) -> Self {
        Self::stat(StatKey::new(StatKind::Season(role), player_id))
    }

    pub fn recent_games(player_id: PlayerId, games: usize) -> Self {
        Self(format!("recent:{player_id}:{games}"))
    }

    pub fn head_to_head(batter_id: PlayerId, pitcher_id: PlayerId) -> Self {
        Self::stat(StatKey::head_to_head(batter_id, pitcher_id))
    }

    pub fn stat(key: StatKey) -> Self {
        Self(key.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FetchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

type Erased = Arc<dyn Any + Send + Sync>;
type InFlight = Shared<BoxFuture<'static, Result<Erased, FeedError>>>;

struct Slot {
    generation: u64,
    call: InFlight,
}

type Registry = Arc<Mutex<HashMap<FetchKey, Slot>>>;

/// Counters for observability and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    pub launched: u64,
    pub joined: u64,
    pub timed_out: u64,
}

#[derive(Default)]
struct Counters {
    launched: AtomicU64,
    joined: AtomicU64,
    timed_out: Arc<AtomicU64>,
}

/// Shared single-flight scheduler for all remote calls.
///
/// Calls are driven on the tokio runtime, so a waiter dropping out never
/// cancels the underlying request for the others.
pub struct FetchCoordinator {
    in_flight: Registry,
    timeout: Duration,
    generation: AtomicU64,
    counters: Counters,
}

impl FetchCoordinator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            timeout,
            generation: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of keys with a call currently in flight.
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    pub fn stats(&self) -> FetchStats {
        FetchStats {
            launched: self.counters.launched.load(Ordering::SeqCst),
            joined: self.counters.joined.load(Ordering::SeqCst),
            timed_out: self.counters.timed_out.load(Ordering::SeqCst),
        }
    }

    /// Run `call` for `key` unless a call for the same key is already in
    /// flight, in which case wait for that one instead.
    ///
    /// `call` is only invoked by the caller that starts the flight.
    pub async fn run<T, F, Fut>(&self, key: FetchKey, call: F) -> Result<T, FeedError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FeedError>> + Send + 'static,
    {
        let shared = {
            let mut in_flight = lock(&self.in_flight);
            match in_flight.get(&key) {
                Some(slot) => {
                    self.counters.joined.fetch_add(1, Ordering::SeqCst);
                    debug!(key = %key, "joining in-flight fetch");
                    slot.call.clone()
                }
                None => {
                    let generation = self.generation.fetch_add(1, Ordering::SeqCst);
                    let call = self.launch(key.clone(), generation, call());
                    in_flight.insert(
                        key.clone(),
                        Slot {
                            generation,
                            call: call.clone(),
                        },
                    );
                    call
                }
            }
        };

        let value = shared.await?;
        value.downcast_ref::<T>().cloned().ok_or_else(|| {
            FeedError::Malformed(format!("fetch {key} resolved to an unexpected type"))
        })
    }

    fn launch<T, Fut>(&self, key: FetchKey, generation: u64, fut: Fut) -> InFlight
    where
        T: Send + Sync + 'static,
        Fut: Future<Output = Result<T, FeedError>> + Send + 'static,
    {
        self.counters.launched.fetch_add(1, Ordering::SeqCst);
        debug!(key = %key, generation, "starting fetch");

        let registry = Arc::clone(&self.in_flight);
        let timed_out = Arc::clone(&self.counters.timed_out);
        let deadline = self.timeout;
        let handle = tokio::spawn(async move {
            let outcome = match tokio::time::timeout(deadline, fut).await {
                Ok(Ok(value)) => Ok(Arc::new(value) as Erased),
                Ok(Err(err)) => Err(err),
                Err(_) => {
                    timed_out.fetch_add(1, Ordering::SeqCst);
                    warn!(key = %key, ?deadline, "fetch timed out");
                    Err(FeedError::Timeout)
                }
            };
            release(&registry, &key, generation);
            outcome
        });

        async move {
            handle.await.unwrap_or_else(|err| {
                Err(FeedError::Transport(format!("fetch task failed: {err}")))
            })
        }
        .boxed()
        .shared()
    }
}

fn lock(registry: &Mutex<HashMap<FetchKey, Slot>>) -> MutexGuard<'_, HashMap<FetchKey, Slot>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Free the slot, unless a newer flight for the same key already owns it.
fn release(registry: &Mutex<HashMap<FetchKey, Slot>>, key: &FetchKey, generation: u64) {
    let mut in_flight = lock(registry);
    if in_flight.get(key).map(|slot| slot.generation) == Some(generation) {
        in_flight.remove(key);
    }
}
