//! Owning guards for engine handles.
//!
//! Each guard destroys its handle exactly once when dropped. A child guard
//! owns its parent guard, so the ownership chain
//! `RendererGuard → ProjectGuard → ContextGuard` is enforced by the type
//! system: a renderer cannot outlive its project, a project cannot outlive
//! its context, and dropping the outermost guard tears everything down in
//! reverse creation order. A failed `acquire` drops the parent it consumed,
//! which rolls back the partial chain.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::engine::{ContextHandle, EngineClient, ProjectHandle, RendererHandle};

/// Owns an engine context.
pub struct ContextGuard {
    engine: Arc<dyn EngineClient>,
    handle: ContextHandle,
}

impl ContextGuard {
    /// Create a context. `None` if the engine refuses.
    pub fn acquire(engine: &Arc<dyn EngineClient>) -> Option<Self> {
        let handle = engine.create_context()?;
        debug!(handle = ?handle.raw(), "Engine context created");
        Some(Self {
            engine: Arc::clone(engine),
            handle,
        })
    }

    pub fn handle(&self) -> ContextHandle {
        self.handle
    }

    fn engine(&self) -> &Arc<dyn EngineClient> {
        &self.engine
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        debug!(handle = ?self.handle.raw(), "Destroying engine context");
        self.engine.destroy_context(self.handle);
    }
}

/// Owns a project together with the context it was opened in.
pub struct ProjectGuard {
    handle: ProjectHandle,
    // Dropped after `Drop::drop` destroys the project.
    context: ContextGuard,
}

impl ProjectGuard {
    /// Open `path` in `context`.
    ///
    /// On failure the context is dropped (and destroyed) before returning.
    pub fn acquire(context: ContextGuard, path: &Path) -> Option<Self> {
        let handle = context.engine().create_project(context.handle(), path)?;
        debug!(handle = ?handle.raw(), path = %path.display(), "Project opened");
        Some(Self { handle, context })
    }

    pub fn handle(&self) -> ProjectHandle {
        self.handle
    }

    pub fn context(&self) -> &ContextGuard {
        &self.context
    }

    fn engine(&self) -> &Arc<dyn EngineClient> {
        self.context.engine()
    }
}

impl Drop for ProjectGuard {
    fn drop(&mut self) {
        debug!(handle = ?self.handle.raw(), "Closing project");
        self.engine().destroy_project(self.handle);
    }
}

/// Owns a renderer together with its project (and so its context).
pub struct RendererGuard {
    handle: RendererHandle,
    // Dropped after `Drop::drop` destroys the renderer.
    project: ProjectGuard,
}

impl RendererGuard {
    /// Create a renderer for `project`.
    ///
    /// On failure the project and its context are destroyed, in that order,
    /// before returning.
    pub fn acquire(project: ProjectGuard) -> Option<Self> {
        let handle = project.engine().create_renderer(project.handle())?;
        debug!(handle = ?handle.raw(), "Renderer created");
        Some(Self { handle, project })
    }

    pub fn handle(&self) -> RendererHandle {
        self.handle
    }

    pub fn project(&self) -> &ProjectGuard {
        &self.project
    }

    pub fn engine(&self) -> &Arc<dyn EngineClient> {
        self.project.engine()
    }
}

impl Drop for RendererGuard {
    fn drop(&mut self) {
        debug!(handle = ?self.handle.raw(), "Destroying renderer");
        self.engine().destroy_renderer(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{EngineCall, FailAt, RecordingEngine};

    fn engine(recording: &Arc<RecordingEngine>) -> Arc<dyn EngineClient> {
        Arc::clone(recording) as Arc<dyn EngineClient>
    }

    #[test]
    fn test_chain_drops_in_reverse_order() {
        let recording = Arc::new(RecordingEngine::new());
        let context = ContextGuard::acquire(&engine(&recording)).unwrap();
        let ctx = context.handle().raw();
        let project = ProjectGuard::acquire(context, Path::new("world.map")).unwrap();
        let proj = project.handle().raw();
        let renderer = RendererGuard::acquire(project).unwrap();
        let rend = renderer.handle().raw();

        assert_eq!(recording.live_handles(), 3);
        drop(renderer);

        let calls = recording.calls();
        assert_eq!(
            &calls[calls.len() - 3..],
            &[
                EngineCall::DestroyRenderer(rend),
                EngineCall::DestroyProject(proj),
                EngineCall::DestroyContext(ctx),
            ]
        );
        assert_eq!(recording.live_handles(), 0);
        assert!(recording.violations().is_empty());
    }

    #[test]
    fn test_failed_project_destroys_context() {
        let recording = Arc::new(RecordingEngine::failing_at(FailAt::Project));
        let context = ContextGuard::acquire(&engine(&recording)).unwrap();

        assert!(ProjectGuard::acquire(context, Path::new("missing.map")).is_none());
        assert_eq!(recording.count(|c| matches!(c, EngineCall::DestroyContext(_))), 1);
        assert_eq!(recording.live_handles(), 0);
    }

    #[test]
    fn test_failed_renderer_destroys_project_then_context() {
        let recording = Arc::new(RecordingEngine::failing_at(FailAt::Renderer));
        let context = ContextGuard::acquire(&engine(&recording)).unwrap();
        let project = ProjectGuard::acquire(context, Path::new("world.map")).unwrap();

        assert!(RendererGuard::acquire(project).is_none());

        let calls = recording.calls();
        let tail: Vec<_> = calls[calls.len() - 2..].to_vec();
        assert!(matches!(tail[0], EngineCall::DestroyProject(_)));
        assert!(matches!(tail[1], EngineCall::DestroyContext(_)));
        assert_eq!(recording.live_handles(), 0);
    }
}
