//! Engine resource lifecycle for the loaded map.
//!
//! [`ResourceLifecycleManager`] owns the engine handles of the current
//! session and is the only place they are created or destroyed.
//!
//! # State Machine
//!
//! ```text
//!            begin_load                 all three acquired
//!   Idle ───────────────► Acquiring ───────────────────────► Ready
//!    ▲                        │ any stage fails                │
//!    │                        ▼ (partial chain rolled back)    │ release / begin_load
//!    ├──────────────────── Idle                                ▼
//!    └────────────────────────────────────────────────── Releasing
//! ```
//!
//! Handles are acquired context → project → renderer and destroyed
//! renderer → project → context. Before the renderer is destroyed its
//! [`RenderGate`] is closed, so no tile fetch can touch it afterwards.

mod gate;
mod guard;

pub use gate::RenderGate;
pub use guard::{ContextGuard, ProjectGuard, RendererGuard};

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::engine::{EngineClient, ProjectHandle};

/// Lifecycle states of the engine handle chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No handles held.
    Idle,
    /// Creating context, project and renderer.
    Acquiring,
    /// All three handles held; tiles can be rendered.
    Ready,
    /// Tearing down the handle chain.
    Releasing,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Acquiring => "acquiring",
            LifecycleState::Ready => "ready",
            LifecycleState::Releasing => "releasing",
        };
        f.write_str(name)
    }
}

/// A stage of the handle chain failed to acquire.
///
/// The message is meant to be shown to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquisitionError {
    #[error("Failed to create engine context")]
    Context,

    #[error("Failed to load project from: {}", path.display())]
    Project { path: PathBuf },

    #[error("Failed to create renderer")]
    Renderer,
}

/// Handles and gate of the loaded map.
struct ActiveSession {
    // Closed in Drop before `renderer` is dropped.
    gate: Arc<RenderGate>,
    renderer: RendererGuard,
    path: PathBuf,
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.gate.close();
    }
}

/// Owner of the context → project → renderer chain.
pub struct ResourceLifecycleManager {
    engine: Arc<dyn EngineClient>,
    state: LifecycleState,
    session: Option<ActiveSession>,
    generation: u64,
}

impl ResourceLifecycleManager {
    pub fn new(engine: Arc<dyn EngineClient>) -> Self {
        Self {
            engine,
            state: LifecycleState::Idle,
            session: None,
            generation: 0,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == LifecycleState::Ready
    }

    /// Number of successful loads so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Render gate of the loaded session.
    pub fn render_gate(&self) -> Option<Arc<RenderGate>> {
        self.session.as_ref().map(|s| Arc::clone(&s.gate))
    }

    /// Project handle of the loaded session.
    pub fn project_handle(&self) -> Option<ProjectHandle> {
        self.session
            .as_ref()
            .map(|s| s.renderer.project().handle())
    }

    /// Path of the loaded map file.
    pub fn session_path(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.path.as_path())
    }

    pub fn engine(&self) -> &Arc<dyn EngineClient> {
        &self.engine
    }

    /// Load a map file, replacing any current session.
    ///
    /// The previous session is fully released first. On failure every handle
    /// acquired by this attempt has been destroyed and the manager is `Idle`.
    pub fn begin_load(&mut self, path: impl AsRef<Path>) -> Result<Arc<RenderGate>, AcquisitionError> {
        let path = path.as_ref();
        if self.state != LifecycleState::Idle {
            self.release();
        }

        self.state = LifecycleState::Acquiring;
        info!(path = %path.display(), "Acquiring engine resources");

        match self.acquire(path) {
            Ok(renderer) => {
                self.generation += 1;
                let gate = Arc::new(RenderGate::new(
                    Arc::clone(&self.engine),
                    renderer.handle(),
                    self.generation,
                ));
                self.session = Some(ActiveSession {
                    gate: Arc::clone(&gate),
                    renderer,
                    path: path.to_path_buf(),
                });
                self.state = LifecycleState::Ready;
                info!(
                    path = %path.display(),
                    generation = self.generation,
                    "Engine resources ready"
                );
                Ok(gate)
            }
            Err(e) => {
                self.state = LifecycleState::Idle;
                warn!(path = %path.display(), error = %e, "Engine resource acquisition failed");
                Err(e)
            }
        }
    }

    fn acquire(&self, path: &Path) -> Result<RendererGuard, AcquisitionError> {
        let context = ContextGuard::acquire(&self.engine).ok_or(AcquisitionError::Context)?;
        let project = ProjectGuard::acquire(context, path).ok_or_else(|| {
            AcquisitionError::Project {
                path: path.to_path_buf(),
            }
        })?;
        RendererGuard::acquire(project).ok_or(AcquisitionError::Renderer)
    }

    /// Tear down the session: close the render gate, then destroy renderer,
    /// project and context in that order.
    ///
    /// Safe to call any number of times. Returns `true` if a session was
    /// released.
    pub fn release(&mut self) -> bool {
        let Some(session) = self.session.take() else {
            self.state = LifecycleState::Idle;
            return false;
        };

        self.state = LifecycleState::Releasing;
        info!(
            path = %session.path.display(),
            generation = session.gate.generation(),
            "Releasing engine resources"
        );
        drop(session);
        self.state = LifecycleState::Idle;
        true
    }
}

impl Drop for ResourceLifecycleManager {
    fn drop(&mut self) {
        self.release();
    }
}
