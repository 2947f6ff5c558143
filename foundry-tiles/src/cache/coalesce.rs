//! In-flight fetch registry.
//!
//! The first caller to [`register`](RequestCoalescer::register) a key becomes
//! its leader and must eventually call [`complete`](RequestCoalescer::complete)
//! or [`cancel`](RequestCoalescer::cancel). Later callers get a broadcast
//! receiver and wait for the leader's result instead of fetching again.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::trace;

use crate::coord::{TileData, TileKey};

/// Outcome of registering interest in a key.
#[derive(Debug)]
pub enum CoalesceResult {
    /// No fetch was in flight; the caller now owns the fetch.
    NewRequest,
    /// A fetch is in flight; the receiver yields its result
    /// (`None` when it failed).
    Coalesced(broadcast::Receiver<Option<TileData>>),
}

/// Registry of tiles currently being fetched.
#[derive(Debug, Default)]
pub struct RequestCoalescer {
    in_flight: DashMap<TileKey, broadcast::Sender<Option<TileData>>>,
}

impl RequestCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the fetch of `key`, or subscribe to the fetch already running.
    pub fn register(&self, key: TileKey) -> CoalesceResult {
        match self.in_flight.entry(key) {
            Entry::Occupied(entry) => {
                trace!(tile = %key, "Joining in-flight fetch");
                CoalesceResult::Coalesced(entry.get().subscribe())
            }
            Entry::Vacant(entry) => {
                let (tx, _) = broadcast::channel(1);
                entry.insert(tx);
                CoalesceResult::NewRequest
            }
        }
    }

    /// Finish the fetch of `key` and hand the result to every waiter.
    pub fn complete(&self, key: TileKey, result: Option<TileData>) {
        if let Some((_, tx)) = self.in_flight.remove(&key) {
            // No receivers is fine: nobody joined this fetch.
            let _ = tx.send(result);
        }
    }

    /// Drop the fetch of `key`; waiters observe a closed channel.
    pub fn cancel(&self, key: TileKey) {
        self.in_flight.remove(&key);
    }

    /// Drop every in-flight fetch.
    pub fn cancel_all(&self) {
        self.in_flight.clear();
    }

    pub fn is_in_flight(&self, key: &TileKey) -> bool {
        self.in_flight.contains_key(key)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}
