//! The reconciling tile cache.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{watch, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::coalesce::{CoalesceResult, RequestCoalescer};
use super::snapshot::TileCacheSnapshot;
use super::stats::{CacheCounters, CacheStats};
use super::{BoxFuture, CacheError, FetchError, TileFetcher, DEFAULT_MAX_CONCURRENT_FETCHES};
use crate::coord::{TileData, TileKey};

/// Summary of one [`TileCache::reconcile`] call.
#[derive(Debug, Clone)]
pub struct ReconcileReport {
    /// The snapshot published when the reconciliation settled.
    pub snapshot: Arc<TileCacheSnapshot>,
    /// Distinct keys requested.
    pub required: usize,
    /// Keys that were already cached.
    pub cached: usize,
    /// Keys fetched by this reconciliation.
    pub fetched: usize,
    /// Keys delivered by a fetch another reconciliation started.
    pub coalesced: usize,
    /// Keys that could not be fetched, in key order.
    pub failed: Vec<TileKey>,
    /// Entries evicted while this reconciliation ran.
    pub evicted: usize,
}

impl ReconcileReport {
    /// True when every required key ended up cached.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// The failures as an error, if there were any.
    pub fn failure(&self) -> Option<CacheError> {
        if self.failed.is_empty() {
            return None;
        }
        Some(CacheError::FetchFailed {
            count: self.failed.len(),
            keys: self.failed.clone(),
        })
    }
}

struct CacheEntry {
    tile: TileData,
    last_used: u64,
}

struct CacheState {
    entries: HashMap<TileKey, CacheEntry>,
    /// Keys of the latest reconciliation; protected from eviction.
    required: HashSet<TileKey>,
    /// Logical clock, advanced once per reconciliation.
    clock: u64,
    /// Bumped by `clear`; fetches from an older epoch never commit.
    epoch: u64,
    cancellation: CancellationToken,
    sequence: u64,
    /// Total entries evicted so far.
    evictions: u64,
}

enum Role {
    Leader,
    Follower,
}

type Settled = (TileKey, Role, Result<(), FetchError>);

/// Bounded map from tile key to rendered tile.
///
/// [`reconcile`](Self::reconcile) makes the cache hold the required keys:
/// cached keys are hits, missing keys are fetched concurrently (at most
/// `max_concurrent_fetches` at a time, at most one fetch per key). Each
/// insertion that takes the cache past its capacity evicts right away: the
/// least recently required keys outside the current required set go first.
pub struct TileCache {
    capacity: usize,
    state: Mutex<CacheState>,
    coalescer: RequestCoalescer,
    limiter: Semaphore,
    published: watch::Sender<Arc<TileCacheSnapshot>>,
    counters: CacheCounters,
}

impl TileCache {
    pub fn new(capacity: usize) -> Self {
        Self::with_concurrency(capacity, DEFAULT_MAX_CONCURRENT_FETCHES)
    }

    /// Create a cache with an explicit fetch concurrency limit.
    ///
    /// Both values are raised to at least 1.
    pub fn with_concurrency(capacity: usize, max_concurrent_fetches: usize) -> Self {
        let (published, _) = watch::channel(Arc::new(TileCacheSnapshot::default()));
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                required: HashSet::new(),
                clock: 0,
                epoch: 0,
                cancellation: CancellationToken::new(),
                sequence: 0,
                evictions: 0,
            }),
            coalescer: RequestCoalescer::new(),
            limiter: Semaphore::new(max_concurrent_fetches.max(1)),
            published,
            counters: CacheCounters::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries currently held, published or not.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of fetches currently running.
    pub fn in_flight(&self) -> usize {
        self.coalescer.in_flight_count()
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> Arc<TileCacheSnapshot> {
        self.published.borrow().clone()
    }

    /// Receive every snapshot the cache publishes from now on.
    pub fn subscribe(&self) -> watch::Receiver<Arc<TileCacheSnapshot>> {
        self.published.subscribe()
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.len())
    }

    /// Bring the cache in line with `required` and publish the result.
    ///
    /// Missing keys are fetched on spawned tasks, so dropping this future
    /// does not abandon fetches already started: they still commit and
    /// still wake any other reconciliation waiting on them. Individual
    /// fetch failures are reported, never raised.
    pub async fn reconcile(
        self: &Arc<Self>,
        required: impl IntoIterator<Item = TileKey>,
        fetcher: Arc<dyn TileFetcher>,
    ) -> ReconcileReport {
        let mut required_set = HashSet::new();
        let required: Vec<TileKey> = required
            .into_iter()
            .filter(|key| required_set.insert(*key))
            .collect();

        let mut cached = 0;
        let evictions_before;
        let mut pending: FuturesUnordered<BoxFuture<'static, Settled>> = FuturesUnordered::new();

        {
            let mut state = self.state.lock();
            state.clock += 1;
            let now = state.clock;
            let epoch = state.epoch;
            let cancellation = state.cancellation.clone();
            state.required = required_set;
            evictions_before = state.evictions;

            for &key in &required {
                if let Some(entry) = state.entries.get_mut(&key) {
                    entry.last_used = now;
                    cached += 1;
                    self.counters.hit();
                    continue;
                }

                // Registration happens under the state lock, as does commit,
                // so a key is always either cached or in flight here.
                match self.coalescer.register(key) {
                    CoalesceResult::NewRequest => {
                        self.counters.fetch();
                        let task = tokio::spawn(Arc::clone(self).run_fetch(
                            key,
                            Arc::clone(&fetcher),
                            epoch,
                            cancellation.clone(),
                        ));
                        pending.push(Box::pin(async move {
                            let result = match task.await {
                                Ok(result) => result.map(drop),
                                Err(e) => Err(FetchError::Task(e.to_string())),
                            };
                            (key, Role::Leader, result)
                        }));
                    }
                    CoalesceResult::Coalesced(mut rx) => {
                        self.counters.coalesce();
                        pending.push(Box::pin(async move {
                            let result = match rx.recv().await {
                                Ok(Some(_)) => Ok(()),
                                _ => Err(FetchError::Shared(key)),
                            };
                            (key, Role::Follower, result)
                        }));
                    }
                }
            }
        }

        let mut fetched = 0;
        let mut coalesced = 0;
        let mut failed = Vec::new();
        while let Some((key, role, result)) = pending.next().await {
            match (role, result) {
                (Role::Leader, Ok(())) => fetched += 1,
                (Role::Follower, Ok(())) => coalesced += 1,
                (_, Err(error)) => {
                    debug!(tile = %key, error = %error, "Tile fetch failed");
                    self.counters.failure();
                    failed.push(key);
                }
            }
        }
        failed.sort_unstable();

        let (snapshot, evicted) = {
            let mut state = self.state.lock();
            let evicted = usize::try_from(state.evictions - evictions_before).unwrap_or(usize::MAX);
            (self.publish_locked(&mut state), evicted)
        };

        debug!(
            required = required.len(),
            cached,
            fetched,
            coalesced,
            failed = failed.len(),
            evicted,
            entries = snapshot.len(),
            "Reconciled tile cache"
        );

        ReconcileReport {
            snapshot,
            required: required.len(),
            cached,
            fetched,
            coalesced,
            failed,
            evicted,
        }
    }

    /// Drop every entry and cancel every running fetch.
    ///
    /// Fetches that finish afterwards are discarded, so nothing fetched
    /// before the clear can reappear in the cache.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.cancellation.cancel();
        state.cancellation = CancellationToken::new();
        state.epoch += 1;
        state.entries.clear();
        state.required.clear();
        self.coalescer.cancel_all();
        self.publish_locked(&mut state);
        debug!(epoch = state.epoch, "Tile cache cleared");
    }

    async fn run_fetch(
        self: Arc<Self>,
        key: TileKey,
        fetcher: Arc<dyn TileFetcher>,
        epoch: u64,
        cancellation: CancellationToken,
    ) -> Result<TileData, FetchError> {
        let pending = PendingCommit {
            cache: &self,
            key,
            epoch,
            committed: false,
        };
        let result = tokio::select! {
            biased;
            _ = cancellation.cancelled() => Err(FetchError::Cancelled),
            result = self.fetch_limited(key, fetcher.as_ref()) => result,
        };
        pending.finish(&result);
        result
    }

    async fn fetch_limited(
        &self,
        key: TileKey,
        fetcher: &dyn TileFetcher,
    ) -> Result<TileData, FetchError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| FetchError::Cancelled)?;
        trace!(tile = %key, "Fetching tile");
        fetcher.fetch(key).await
    }

    fn commit(&self, key: TileKey, epoch: u64, result: &Result<TileData, FetchError>) {
        let mut state = self.state.lock();
        if state.epoch != epoch {
            // The coalescer entry for this key, if any, belongs to the new epoch.
            trace!(tile = %key, "Discarding fetch from before clear");
            return;
        }
        match result {
            Ok(tile) => {
                let last_used = state.clock;
                state.entries.insert(
                    key,
                    CacheEntry {
                        tile: tile.clone(),
                        last_used,
                    },
                );
                self.coalescer.complete(key, Some(tile.clone()));
                self.evict_locked(&mut state);
            }
            Err(_) => self.coalescer.complete(key, None),
        }
    }

    fn evict_locked(&self, state: &mut CacheState) -> usize {
        let excess = state.entries.len().saturating_sub(self.capacity);
        if excess == 0 {
            return 0;
        }

        // Non-required before required, then least recently used, then key.
        let mut candidates: Vec<(bool, u64, TileKey)> = state
            .entries
            .iter()
            .map(|(key, entry)| (state.required.contains(key), entry.last_used, *key))
            .collect();
        candidates.sort_unstable();

        let victims = &candidates[..excess];
        if victims.iter().any(|(required, _, _)| *required) {
            warn!(
                required = state.required.len(),
                capacity = self.capacity,
                "Required tiles exceed cache capacity"
            );
        }
        for (_, _, key) in victims {
            state.entries.remove(key);
        }
        state.evictions += excess as u64;
        self.counters.evicted(excess);
        excess
    }

    fn publish_locked(&self, state: &mut CacheState) -> Arc<TileCacheSnapshot> {
        state.sequence += 1;
        let tiles = state
            .entries
            .iter()
            .map(|(key, entry)| (*key, entry.tile.clone()))
            .collect();
        let snapshot = Arc::new(TileCacheSnapshot::new(tiles, state.sequence));
        self.published.send_replace(Arc::clone(&snapshot));
        snapshot
    }
}

/// Commits a leader's fetch exactly once.
///
/// If the fetch never reaches [`finish`](Self::finish) (the fetcher panicked
/// or the task was aborted) the drop releases the key as failed, so waiters
/// wake up and the next reconciliation fetches it again.
struct PendingCommit<'a> {
    cache: &'a TileCache,
    key: TileKey,
    epoch: u64,
    committed: bool,
}

impl PendingCommit<'_> {
    fn finish(mut self, result: &Result<TileData, FetchError>) {
        self.cache.commit(self.key, self.epoch, result);
        self.committed = true;
    }
}

impl Drop for PendingCommit<'_> {
    fn drop(&mut self) {
        if !self.committed {
            debug!(tile = %self.key, "Fetch ended without a result");
            self.cache
                .commit(self.key, self.epoch, &Err(FetchError::Cancelled));
        }
    }
}

impl std::fmt::Debug for TileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileCache")
            .field("capacity", &self.capacity)
            .field("entries", &self.len())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
