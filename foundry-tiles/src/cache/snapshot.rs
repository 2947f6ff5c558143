//! Immutable published view of the cache.

use std::collections::HashMap;

use crate::coord::{TileData, TileKey};

/// Point-in-time copy of the cached tiles.
///
/// Snapshots are never mutated after publication; a new one replaces the old
/// one as a whole. Tile pixels are shared, so a snapshot is cheap to build.
#[derive(Debug, Clone, Default)]
pub struct TileCacheSnapshot {
    tiles: HashMap<TileKey, TileData>,
    sequence: u64,
}

impl TileCacheSnapshot {
    pub(crate) fn new(tiles: HashMap<TileKey, TileData>, sequence: u64) -> Self {
        Self { tiles, sequence }
    }

    /// Publication counter; later snapshots have larger values.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn get(&self, key: &TileKey) -> Option<&TileData> {
        self.tiles.get(key)
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        self.tiles.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &TileKey> {
        self.tiles.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TileKey, &TileData)> {
        self.tiles.iter()
    }
}
