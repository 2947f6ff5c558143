//! Viewport state and pan/zoom math.
//!
//! The viewport is a window into the normalized world: the center is a point
//! in `[0, 1] × [0, 1]`, the zoom is an integer pyramid level and the size is
//! the on-screen pixel extent. All mutations clamp, so a [`ViewportState`]
//! can never hold an out-of-range value.
//!
//! # Example
//!
//! ```
//! use foundry_tiles::viewport::ViewportModel;
//!
//! let mut model = ViewportModel::default();
//! model.zoom_by(2, 0.5, 0.5);
//! let state = model.pan(-64.0, 0.0);
//!
//! assert_eq!(state.zoom(), 2);
//! assert!(state.center_x() > 0.5);
//! ```

mod addressing;

pub use addressing::{visible_tiles, VisibleTiles};

use crate::coord::{world_pixels, MAX_ZOOM, MIN_ZOOM};

/// Default viewport width in pixels.
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1024;

/// Default viewport height in pixels.
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 768;

/// Immutable, always-valid viewport description.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportState {
    center_x: f64,
    center_y: f64,
    zoom: u8,
    viewport_width: u32,
    viewport_height: u32,
}

impl ViewportState {
    /// Build a state, clamping every field into its legal domain.
    ///
    /// Centers are clamped to `[0, 1]` (NaN becomes 0.5), zoom to
    /// `[0, MAX_ZOOM]` and sizes to at least one pixel.
    pub fn new(center_x: f64, center_y: f64, zoom: u8, width: u32, height: u32) -> Self {
        Self {
            center_x: clamp_unit(center_x),
            center_y: clamp_unit(center_y),
            zoom: zoom.clamp(MIN_ZOOM, MAX_ZOOM),
            viewport_width: width.max(1),
            viewport_height: height.max(1),
        }
    }

    /// Whole world centered at zoom 0 with the given viewport size.
    pub fn centered(width: u32, height: u32) -> Self {
        Self::new(0.5, 0.5, MIN_ZOOM, width, height)
    }

    pub fn center_x(&self) -> f64 {
        self.center_x
    }

    pub fn center_y(&self) -> f64 {
        self.center_y
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn viewport_width(&self) -> u32 {
        self.viewport_width
    }

    pub fn viewport_height(&self) -> u32 {
        self.viewport_height
    }

    /// State after dragging the map by a pixel offset.
    ///
    /// Dragging right (positive `dx`) moves the center west, matching how the
    /// content follows the pointer.
    pub fn panned(&self, dx: f64, dy: f64) -> Self {
        if !dx.is_finite() || !dy.is_finite() {
            return *self;
        }
        let world = world_pixels(self.zoom);
        Self {
            center_x: clamp_unit(self.center_x - dx / world),
            center_y: clamp_unit(self.center_y - dy / world),
            ..*self
        }
    }

    /// State after changing zoom by `delta` levels around a focus point.
    ///
    /// The focus is given in viewport-relative units (`0.5, 0.5` is the
    /// middle of the screen) and stays visually stationary. When the clamped
    /// zoom equals the current zoom nothing changes.
    pub fn zoomed(&self, delta: i32, focus_x: f64, focus_y: f64) -> Self {
        let target = i32::from(self.zoom)
            .saturating_add(delta)
            .clamp(i32::from(MIN_ZOOM), i32::from(MAX_ZOOM));
        if target == i32::from(self.zoom) {
            return *self;
        }
        // Beyond ±64 levels the shift is already 1 or far past the clamp;
        // bounding the exponent keeps it finite.
        let factor = 2f64.powi(delta.clamp(-ZOOM_SHIFT_LIMIT, ZOOM_SHIFT_LIMIT));
        let shift = 1.0 - 1.0 / factor;

        Self {
            center_x: clamp_unit(self.center_x + focus_offset(focus_x) * shift),
            center_y: clamp_unit(self.center_y + focus_offset(focus_y) * shift),
            // target is within [MIN_ZOOM, MAX_ZOOM] so it fits in u8
            zoom: target as u8,
            ..*self
        }
    }

    /// State with every provided field of `update` applied and clamped.
    pub fn with_update(&self, update: ViewportUpdate) -> Self {
        Self::new(
            update.center_x.unwrap_or(self.center_x),
            update.center_y.unwrap_or(self.center_y),
            update.zoom.unwrap_or(self.zoom),
            update.viewport_width.unwrap_or(self.viewport_width),
            update.viewport_height.unwrap_or(self.viewport_height),
        )
    }
}

impl Default for ViewportState {
    fn default() -> Self {
        Self::centered(DEFAULT_VIEWPORT_WIDTH, DEFAULT_VIEWPORT_HEIGHT)
    }
}

/// Partial viewport change; `None` fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ViewportUpdate {
    pub center_x: Option<f64>,
    pub center_y: Option<f64>,
    pub zoom: Option<u8>,
    pub viewport_width: Option<u32>,
    pub viewport_height: Option<u32>,
}

impl ViewportUpdate {
    pub fn center(x: f64, y: f64) -> Self {
        Self {
            center_x: Some(x),
            center_y: Some(y),
            ..Self::default()
        }
    }

    pub fn size(width: u32, height: u32) -> Self {
        Self {
            viewport_width: Some(width),
            viewport_height: Some(height),
            ..Self::default()
        }
    }

    pub fn with_zoom(mut self, zoom: u8) -> Self {
        self.zoom = Some(zoom);
        self
    }
}

/// Mutable owner of the current [`ViewportState`].
///
/// Every operation returns the new state so callers can publish it.
#[derive(Debug, Clone, Default)]
pub struct ViewportModel {
    state: ViewportState,
}

impl ViewportModel {
    pub fn new(state: ViewportState) -> Self {
        Self { state }
    }

    /// Current state.
    pub fn state(&self) -> ViewportState {
        self.state
    }

    /// Pan by a pixel offset. See [`ViewportState::panned`].
    pub fn pan(&mut self, dx: f64, dy: f64) -> ViewportState {
        self.state = self.state.panned(dx, dy);
        self.state
    }

    /// Zoom around a focus point. See [`ViewportState::zoomed`].
    pub fn zoom_by(&mut self, delta: i32, focus_x: f64, focus_y: f64) -> ViewportState {
        self.state = self.state.zoomed(delta, focus_x, focus_y);
        self.state
    }

    pub fn set_center(&mut self, center_x: f64, center_y: f64) -> ViewportState {
        self.apply(ViewportUpdate::center(center_x, center_y))
    }

    pub fn set_zoom(&mut self, zoom: u8) -> ViewportState {
        self.apply(ViewportUpdate::default().with_zoom(zoom))
    }

    pub fn resize(&mut self, width: u32, height: u32) -> ViewportState {
        self.apply(ViewportUpdate::size(width, height))
    }

    pub fn apply(&mut self, update: ViewportUpdate) -> ViewportState {
        self.state = self.state.with_update(update);
        self.state
    }

    /// Show the whole world again, keeping the current viewport size.
    pub fn reset(&mut self) -> ViewportState {
        self.state = ViewportState::centered(self.state.viewport_width, self.state.viewport_height);
        self.state
    }
}

const ZOOM_SHIFT_LIMIT: i32 = 64;

/// Distance of a viewport-relative focus from the middle, in `[-0.5, 0.5]`.
fn focus_offset(focus: f64) -> f64 {
    clamp_unit(focus) - 0.5
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.5
    } else {
        value.clamp(0.0, 1.0)
    }
}
