//! Map session orchestration.
//!
//! [`MapSessionController`] is the single entry point a UI talks to. It
//! composes the viewport model, the tile cache and the engine resource
//! lifecycle, and exposes the state the UI renders as `watch` observables:
//!
//! | Observable | Type                     | Changes on                      |
//! |------------|--------------------------|---------------------------------|
//! | viewport   | `ViewportState`          | pan, zoom, resize, load         |
//! | tiles      | `Arc<TileCacheSnapshot>` | every settled reconciliation    |
//! | loading    | `bool`                   | start and end of `load_map`     |
//! | error      | `Option<String>`         | failed load or export           |

mod controller;
mod fetcher;

pub use controller::MapSessionController;
pub use fetcher::EngineTileFetcher;

use std::path::PathBuf;

use thiserror::Error;

use crate::lifecycle::AcquisitionError;

/// Why a map could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error("map load task failed: {0}")]
    Task(String),
}

/// Why a PNG export did not happen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExportError {
    #[error("no map is loaded")]
    NoSession,

    #[error("engine rejected export to {}", path.display())]
    Rejected { path: PathBuf },

    #[error("export task failed: {0}")]
    Task(String),
}
