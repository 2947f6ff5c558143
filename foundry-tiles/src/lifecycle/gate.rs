//! Synchronisation point between tile fetches and renderer teardown.
//!
//! Every render call goes through a [`RenderGate`]: the call holds a read
//! lock and checks the session's cancellation token first. Closing the gate
//! cancels the token and then takes the write lock, which waits out any call
//! already inside the engine. After `close` returns no fetch can reach the
//! renderer again, so the renderer handle is safe to destroy.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::FetchError;
use crate::coord::{TileData, TileKey};
use crate::engine::{EngineClient, RendererHandle};

/// Guarded access to the renderer of one loaded session.
pub struct RenderGate {
    engine: Arc<dyn EngineClient>,
    renderer: RwLock<Option<RendererHandle>>,
    cancellation: CancellationToken,
    generation: u64,
}

impl RenderGate {
    pub(crate) fn new(
        engine: Arc<dyn EngineClient>,
        renderer: RendererHandle,
        generation: u64,
    ) -> Self {
        Self {
            engine,
            renderer: RwLock::new(Some(renderer)),
            cancellation: CancellationToken::new(),
            generation,
        }
    }

    /// Session number this gate belongs to; increases with every load.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether renders are still accepted.
    pub fn is_open(&self) -> bool {
        !self.cancellation.is_cancelled()
    }

    /// Token cancelled when the session ends.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Render one tile, blocking the current thread.
    ///
    /// Fails with [`FetchError::Cancelled`] once the gate is closing, with
    /// [`FetchError::Engine`] when the engine returns nothing and with
    /// [`FetchError::InvalidTile`] when the buffer is not a 256×256 RGBA tile.
    pub fn render(&self, key: TileKey) -> Result<TileData, FetchError> {
        let renderer = self.renderer.read();
        if self.cancellation.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        let handle = (*renderer).ok_or(FetchError::Cancelled)?;

        let bytes = self
            .engine
            .render_tile(handle, key.x, key.y, key.zoom)
            .ok_or(FetchError::Engine(key))?;
        drop(renderer);

        Ok(TileData::new(key, bytes)?)
    }

    /// Refuse further renders and wait for in-flight ones to return.
    ///
    /// Idempotent.
    pub(crate) fn close(&self) {
        self.cancellation.cancel();
        let mut renderer = self.renderer.write();
        if renderer.take().is_some() {
            debug!(generation = self.generation, "Render gate closed");
        }
    }
}

impl std::fmt::Debug for RenderGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderGate")
            .field("generation", &self.generation)
            .field("open", &self.is_open())
            .finish()
    }
}
