//! Rendering engine boundary.
//!
//! The World Foundry engine is an external native library that turns a map
//! file into 256×256 RGBA tiles and full-size PNG exports. This module defines
//! the [`EngineClient`] contract the rest of the crate talks to, and the
//! concrete implementations selected at build time:
//!
//! - [`NativeEngine`] (feature `native`) - binds the engine's C ABI
//! - [`UnavailableEngine`] - every operation fails; used when the native
//!   library is missing or failed to initialize
//!
//! Nothing outside this module depends on a concrete implementation.
//!
//! # Example
//!
//! ```
//! use foundry_tiles::engine;
//!
//! let engine = engine::connect();
//! let info = engine.engine_info();
//! println!("engine {} features={:?}", info.version, info.features);
//! ```

mod handle;
#[cfg(feature = "native")]
mod native;
#[cfg(test)]
pub(crate) mod testing;
mod unavailable;

pub use handle::{ContextHandle, ProjectHandle, RawHandle, RendererHandle};
#[cfg(feature = "native")]
pub use native::NativeEngine;
pub use unavailable::UnavailableEngine;

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

/// Features advertised by a working engine.
pub const ENGINE_FEATURES: &[&str] = &["import", "render", "export", "tiles", "azgaar"];

/// Feature advertised by an engine that cannot render.
pub const FALLBACK_FEATURE: &str = "fallback";

/// Description of the connected engine, for about boxes and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInfo {
    /// Engine version string.
    pub version: String,
    /// Build date reported by the engine, if it reports one.
    pub build_date: Option<String>,
    /// Capability names.
    pub features: Vec<String>,
}

/// Errors initializing a concrete engine.
#[derive(Debug, Clone, Error)]
pub enum EngineInitError {
    /// The crate was compiled without an engine binding.
    #[error("built without the `native` engine feature")]
    NotCompiled,

    /// The library answered with a null version string.
    #[error("engine library returned no version string")]
    MissingVersion,

    /// The version string was not valid UTF-8.
    #[error("engine version is not valid UTF-8: {0}")]
    InvalidVersion(String),
}

/// Contract for the external rendering engine.
///
/// Handles returned by `create_*` are opaque tokens owned by the caller, who
/// must pass each one to the matching `destroy_*` exactly once. The lifecycle
/// manager guarantees this, so implementations need not guard against
/// double destruction.
///
/// Every call may block for a non-trivial time; async callers should run
/// them on a blocking thread.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: tile renders for different keys are
/// issued concurrently against the same renderer handle.
pub trait EngineClient: Send + Sync {
    /// Engine version string.
    fn version(&self) -> String;

    /// Whether the engine is able to serve requests.
    fn is_initialized(&self) -> bool;

    /// Version and capabilities of the engine.
    fn engine_info(&self) -> EngineInfo {
        let features = if self.is_initialized() {
            ENGINE_FEATURES.iter().map(|f| f.to_string()).collect()
        } else {
            vec![FALLBACK_FEATURE.to_string()]
        };
        EngineInfo {
            version: self.version(),
            build_date: None,
            features,
        }
    }

    /// Create an engine context. `None` on failure.
    fn create_context(&self) -> Option<ContextHandle>;

    /// Destroy a context created by [`create_context`](Self::create_context).
    fn destroy_context(&self, context: ContextHandle);

    /// Open a map file within a context.
    ///
    /// `None` means the file was missing or could not be parsed; the context
    /// is left untouched.
    fn create_project(&self, context: ContextHandle, path: &Path) -> Option<ProjectHandle>;

    /// Close a project.
    fn destroy_project(&self, project: ProjectHandle);

    /// Create a tile renderer for a project. `None` on failure.
    fn create_renderer(&self, project: ProjectHandle) -> Option<RendererHandle>;

    /// Destroy a renderer.
    fn destroy_renderer(&self, renderer: RendererHandle);

    /// Render one tile as 256×256 RGBA bytes.
    ///
    /// `None` on any engine failure. The renderer stays valid either way.
    fn render_tile(&self, renderer: RendererHandle, x: u32, y: u32, zoom: u8) -> Option<Vec<u8>>;

    /// Export the whole project to a PNG file. Returns `true` on success.
    fn export_png(&self, project: ProjectHandle, path: &Path, width: u32, height: u32) -> bool;
}

/// Connect to the rendering engine available in this build.
///
/// With the `native` feature this binds the linked `world_foundry` library
/// and checks that it answers. Any failure, or a build without the feature,
/// yields an [`UnavailableEngine`] that reports the reason and fails every
/// operation.
pub fn connect() -> Arc<dyn EngineClient> {
    match connect_native() {
        Ok(engine) => {
            info!(version = %engine.version(), "Connected to rendering engine");
            engine
        }
        Err(e) => {
            warn!(reason = %e, "Rendering engine unavailable");
            Arc::new(UnavailableEngine::new(e.to_string()))
        }
    }
}

#[cfg(feature = "native")]
fn connect_native() -> Result<Arc<dyn EngineClient>, EngineInitError> {
    Ok(Arc::new(NativeEngine::new()?))
}

#[cfg(not(feature = "native"))]
fn connect_native() -> Result<Arc<dyn EngineClient>, EngineInitError> {
    Err(EngineInitError::NotCompiled)
}
