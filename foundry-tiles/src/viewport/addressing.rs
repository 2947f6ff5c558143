//! Visible tile computation.
//!
//! Maps a [`ViewportState`] to the minimal rectangle of tiles at its zoom
//! level that intersect the on-screen area.

use std::collections::HashSet;
use std::ops::RangeInclusive;

use crate::coord::{tiles_per_side, world_pixels, TileKey};

use super::ViewportState;

/// Rectangular block of tiles visible in a viewport.
///
/// Iteration is row-major (y outer, x inner) so results are deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleTiles {
    zoom: u8,
    xs: RangeInclusive<u32>,
    ys: RangeInclusive<u32>,
}

impl VisibleTiles {
    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    /// Inclusive column range.
    pub fn x_range(&self) -> RangeInclusive<u32> {
        self.xs.clone()
    }

    /// Inclusive row range.
    pub fn y_range(&self) -> RangeInclusive<u32> {
        self.ys.clone()
    }

    pub fn len(&self) -> usize {
        let width = (self.xs.end() - self.xs.start() + 1) as usize;
        let height = (self.ys.end() - self.ys.start() + 1) as usize;
        width * height
    }

    /// Never true: a viewport always covers at least one tile.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        key.zoom == self.zoom && self.xs.contains(&key.x) && self.ys.contains(&key.y)
    }

    pub fn iter(&self) -> impl Iterator<Item = TileKey> + '_ {
        let zoom = self.zoom;
        self.ys
            .clone()
            .flat_map(move |y| self.xs.clone().map(move |x| TileKey { x, y, zoom }))
    }

    pub fn to_vec(&self) -> Vec<TileKey> {
        self.iter().collect()
    }

    pub fn to_set(&self) -> HashSet<TileKey> {
        self.iter().collect()
    }
}

/// Tiles intersecting the viewport at its current zoom.
///
/// The viewport rectangle is expressed in normalized world units around the
/// center, converted to tile indices (floor for the near edge, `ceil - 1` for
/// the far edge so an edge sitting exactly on a tile boundary does not pull in
/// a neighbour) and clamped to the pyramid.
///
/// # Example
///
/// ```
/// use foundry_tiles::viewport::{visible_tiles, ViewportState};
/// use foundry_tiles::TileKey;
///
/// let tiles = visible_tiles(&ViewportState::new(0.5, 0.5, 0, 256, 256));
/// assert_eq!(tiles.to_vec(), vec![TileKey { x: 0, y: 0, zoom: 0 }]);
/// ```
pub fn visible_tiles(state: &ViewportState) -> VisibleTiles {
    let zoom = state.zoom();
    let side = tiles_per_side(zoom);
    let world = world_pixels(zoom);

    let half_w = f64::from(state.viewport_width()) / 2.0 / world;
    let half_h = f64::from(state.viewport_height()) / 2.0 / world;

    let xs = index_range(state.center_x() - half_w, state.center_x() + half_w, side);
    let ys = index_range(state.center_y() - half_h, state.center_y() + half_h, side);

    VisibleTiles { zoom, xs, ys }
}

/// Tile indices covered by the normalized interval `[low, high]`.
fn index_range(low: f64, high: f64, side: u32) -> RangeInclusive<u32> {
    let last = f64::from(side - 1);
    let side = f64::from(side);

    let first = (low * side).floor().clamp(0.0, last);
    let end = ((high * side).ceil() - 1.0).clamp(first, last);

    // both values are clamped to [0, side - 1]
    (first as u32)..=(end as u32)
}
