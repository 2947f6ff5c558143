//! Tile pyramid coordinates and tile pixel data.
//!
//! The world is a quad pyramid: zoom level `z` splits the map into
//! `2^z × 2^z` tiles of 256×256 pixels. Zoom 0 is a single tile covering the
//! whole world, zoom [`MAX_ZOOM`] is the most detailed level the engine
//! renders.

mod types;

pub use types::{TileData, TileDataError, TileKey};

/// Edge length of a tile in pixels.
pub const TILE_SIZE: u32 = 256;

/// Bytes in one RGBA tile buffer (256 × 256 × 4).
pub const TILE_BYTES: usize = (TILE_SIZE * TILE_SIZE * 4) as usize;

/// Most zoomed-out pyramid level.
pub const MIN_ZOOM: u8 = 0;

/// Most zoomed-in pyramid level.
pub const MAX_ZOOM: u8 = 10;

/// Number of tiles along one side of the pyramid at `zoom`.
///
/// Zoom levels above [`MAX_ZOOM`] are clamped.
#[inline]
pub fn tiles_per_side(zoom: u8) -> u32 {
    1u32 << zoom.min(MAX_ZOOM)
}

/// Size of the whole world in pixels along one axis at `zoom`.
#[inline]
pub fn world_pixels(zoom: u8) -> f64 {
    f64::from(TILE_SIZE) * f64::from(tiles_per_side(zoom))
}
