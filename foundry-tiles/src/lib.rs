//! foundry-tiles - Tile viewport and cache layer for World Foundry maps
//!
//! This library sits between a map UI and the native World Foundry rendering
//! engine. It keeps the viewport state, works out which 256×256 tiles are
//! visible, fetches missing tiles concurrently from the engine without
//! duplicating in-flight work, bounds the tile cache, and owns the engine
//! resource handles (context → project → renderer) of the loaded map.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     MapSessionController                          │
//! │                                                                   │
//! │  pan / zoom ──► ViewportModel ──► visible_tiles() ──┐             │
//! │                                                     ▼             │
//! │  load_map ──► ResourceLifecycleManager        TileCache           │
//! │                 └── RendererGuard ◄── RenderGate ◄─┘ (coalesced)  │
//! │                       └── ProjectGuard                            │
//! │                             └── ContextGuard                      │
//! │                                                                   │
//! │  watch channels ──► viewport / tiles / loading / error            │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use foundry_tiles::config::SessionConfig;
//! use foundry_tiles::engine;
//! use foundry_tiles::session::MapSessionController;
//!
//! let engine = engine::connect();
//! let controller = MapSessionController::new(engine, SessionConfig::default(), runtime.handle().clone());
//!
//! controller.load_map("worlds/azgaar.map").await?;
//! controller.pan(-120.0, 40.0);
//! controller.zoom_by(1, 0.25, 0.75);
//!
//! let tiles = controller.tiles();
//! ```

pub mod cache;
pub mod config;
pub mod coord;
pub mod engine;
pub mod lifecycle;
pub mod logging;
pub mod session;
pub mod viewport;

pub use cache::{ReconcileReport, TileCache, TileCacheSnapshot, TileFetcher};
pub use config::SessionConfig;
pub use coord::{TileData, TileKey, MAX_ZOOM, TILE_BYTES, TILE_SIZE};
pub use engine::{EngineClient, EngineInfo};
pub use lifecycle::{AcquisitionError, LifecycleState, ResourceLifecycleManager};
pub use session::{ExportError, MapSessionController};
pub use viewport::{visible_tiles, ViewportModel, ViewportState, ViewportUpdate, VisibleTiles};
