//! Bounded, concurrently populated tile cache.
//!
//! The cache maps [`TileKey`]s to rendered [`TileData`] and is brought into
//! line with the visible tile set by [`TileCache::reconcile`]. Missing tiles
//! are fetched concurrently through a [`TileFetcher`]; a
//! [`RequestCoalescer`] makes sure each key has at most one fetch in flight,
//! however many reconciliations want it.
//!
//! # Architecture
//!
//! ```text
//! reconcile(required) ──► cached? ──► yes ──► hit
//!                            │ no
//!                            ▼
//!                       Coalescer ──► in flight ──► wait for leader
//!                            │ new
//!                            ▼
//!                  spawn fetch task ──► commit ──► complete waiters
//!                                                     │
//! all settled ──► evict over capacity ──► publish TileCacheSnapshot
//! ```
//!
//! Readers only ever see immutable [`TileCacheSnapshot`]s, swapped in whole
//! through a `watch` channel.

mod coalesce;
mod snapshot;
mod stats;
mod tile_cache;

pub use coalesce::{CoalesceResult, RequestCoalescer};
pub use snapshot::TileCacheSnapshot;
pub use stats::CacheStats;
pub use tile_cache::{ReconcileReport, TileCache};

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::coord::{TileData, TileDataError, TileKey};

/// Default maximum number of cached tiles.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Default number of tile fetches allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 8;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Why a single tile could not be fetched.
///
/// Fetch failures are never fatal: the tile stays absent and is retried by
/// the next reconciliation that needs it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The engine returned nothing for this tile.
    #[error("engine failed to render tile {0}")]
    Engine(TileKey),

    /// The engine returned a buffer of the wrong size.
    #[error(transparent)]
    InvalidTile(#[from] TileDataError),

    /// The session ended before the fetch finished.
    #[error("tile fetch cancelled")]
    Cancelled,

    /// Another reconciliation's fetch of this tile failed.
    #[error("shared fetch of tile {0} failed")]
    Shared(TileKey),

    /// The fetch task panicked or was aborted.
    #[error("tile fetch task failed: {0}")]
    Task(String),
}

/// Cache-level errors reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// Some tiles of a reconciliation could not be fetched.
    #[error("{count} tile fetch(es) failed")]
    FetchFailed { count: usize, keys: Vec<TileKey> },
}

/// Source of tile pixels for the cache.
///
/// The session implements this on top of the engine's render gate; tests
/// plug in counting fakes.
pub trait TileFetcher: Send + Sync + 'static {
    /// Produce the pixels of one tile.
    fn fetch(&self, key: TileKey) -> BoxFuture<'_, Result<TileData, FetchError>>;
}
