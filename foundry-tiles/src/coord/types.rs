//! Value types for tile addressing.

use std::fmt;

use bytes::Bytes;
use thiserror::Error;

use super::{tiles_per_side, MAX_ZOOM, TILE_BYTES};

/// Address of one 256×256 tile in the zoom pyramid.
///
/// Used as the cache key, so equality and hashing are structural.
/// `x` grows eastward, `y` grows southward, both from the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    /// Column within the zoom level (0 = west edge)
    pub x: u32,
    /// Row within the zoom level (0 = north edge)
    pub y: u32,
    /// Pyramid level (0 = whole world in one tile)
    pub zoom: u8,
}

impl TileKey {
    /// Create a tile key, checking it lies inside the pyramid.
    ///
    /// Returns `None` when `zoom > MAX_ZOOM` or when `x`/`y` are not
    /// below `2^zoom`.
    ///
    /// # Example
    ///
    /// ```
    /// use foundry_tiles::TileKey;
    ///
    /// assert!(TileKey::new(1, 1, 1).is_some());
    /// assert!(TileKey::new(2, 0, 1).is_none());
    /// ```
    pub fn new(x: u32, y: u32, zoom: u8) -> Option<Self> {
        if zoom > MAX_ZOOM {
            return None;
        }
        let side = tiles_per_side(zoom);
        if x >= side || y >= side {
            return None;
        }
        Some(Self { x, y, zoom })
    }

    /// Whether this key addresses a tile inside the pyramid.
    pub fn is_valid(&self) -> bool {
        Self::new(self.x, self.y, self.zoom).is_some()
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Errors building [`TileData`] from a raw engine buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TileDataError {
    /// The buffer is not exactly one 256×256 RGBA tile.
    #[error("tile {key} has {actual} bytes, expected {expected}")]
    InvalidLength {
        key: TileKey,
        expected: usize,
        actual: usize,
    },
}

/// Rendered pixels of one tile.
///
/// Pixels are 256×256 RGBA, 4 bytes per pixel, row-major with the origin at
/// the top-left. The buffer is reference counted, so cloning a `TileData`
/// (or a snapshot holding many of them) never copies pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileData {
    key: TileKey,
    pixels: Bytes,
}

impl TileData {
    /// Wrap an engine buffer, rejecting anything that is not exactly
    /// [`TILE_BYTES`] long.
    pub fn new(key: TileKey, pixels: impl Into<Bytes>) -> Result<Self, TileDataError> {
        let pixels = pixels.into();
        if pixels.len() != TILE_BYTES {
            return Err(TileDataError::InvalidLength {
                key,
                expected: TILE_BYTES,
                actual: pixels.len(),
            });
        }
        Ok(Self { key, pixels })
    }

    /// The tile this data belongs to.
    pub fn key(&self) -> TileKey {
        self.key
    }

    /// Raw RGBA bytes.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// RGBA value of the pixel at (`px`, `py`) within the tile.
    ///
    /// Returns `None` outside the 256×256 area.
    pub fn pixel(&self, px: u32, py: u32) -> Option<[u8; 4]> {
        let size = super::TILE_SIZE;
        if px >= size || py >= size {
            return None;
        }
        let offset = ((py * size + px) * 4) as usize;
        let rgba = self.pixels.get(offset..offset + 4)?;
        Some([rgba[0], rgba[1], rgba[2], rgba[3]])
    }
}
