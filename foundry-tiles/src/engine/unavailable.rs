//! Engine stand-in used when no native engine could be initialized.

use std::path::Path;

use tracing::debug;

use super::{ContextHandle, EngineClient, ProjectHandle, RendererHandle};

/// Version reported when the engine is unavailable.
pub const UNAVAILABLE_VERSION: &str = "0.1.0-no-native";

/// Engine that fails every operation deterministically.
///
/// Constructed by [`connect`](super::connect) when the native library is
/// missing, so callers never need to check an "is loaded" flag: creating a
/// context simply fails and the load reports an acquisition error.
#[derive(Debug, Clone)]
pub struct UnavailableEngine {
    reason: String,
}

impl UnavailableEngine {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Why the engine could not be initialized.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl EngineClient for UnavailableEngine {
    fn version(&self) -> String {
        UNAVAILABLE_VERSION.to_string()
    }

    fn is_initialized(&self) -> bool {
        false
    }

    fn create_context(&self) -> Option<ContextHandle> {
        debug!(reason = %self.reason, "create_context on unavailable engine");
        None
    }

    // Nothing can ever have been created, so there is nothing to destroy.
    fn destroy_context(&self, _context: ContextHandle) {}

    fn create_project(&self, _context: ContextHandle, _path: &Path) -> Option<ProjectHandle> {
        None
    }

    fn destroy_project(&self, _project: ProjectHandle) {}

    fn create_renderer(&self, _project: ProjectHandle) -> Option<RendererHandle> {
        None
    }

    fn destroy_renderer(&self, _renderer: RendererHandle) {}

    fn render_tile(&self, _renderer: RendererHandle, _x: u32, _y: u32, _zoom: u8) -> Option<Vec<u8>> {
        None
    }

    fn export_png(&self, _project: ProjectHandle, _path: &Path, _width: u32, _height: u32) -> bool {
        false
    }
}
