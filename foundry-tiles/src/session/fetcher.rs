//! Tile fetcher backed by the engine renderer.

use std::sync::Arc;

use crate::cache::{BoxFuture, FetchError, TileFetcher};
use crate::coord::{TileData, TileKey};
use crate::lifecycle::RenderGate;

/// Renders tiles through a session's [`RenderGate`] on the blocking pool.
pub struct EngineTileFetcher {
    gate: Arc<RenderGate>,
}

impl EngineTileFetcher {
    pub fn new(gate: Arc<RenderGate>) -> Self {
        Self { gate }
    }

    pub fn gate(&self) -> &Arc<RenderGate> {
        &self.gate
    }
}

impl TileFetcher for EngineTileFetcher {
    fn fetch(&self, key: TileKey) -> BoxFuture<'_, Result<TileData, FetchError>> {
        let gate = Arc::clone(&self.gate);
        Box::pin(async move {
            let cancellation = gate.cancellation();
            if cancellation.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            // The blocking render keeps running after cancellation; closing
            // the gate waits for it before the renderer is destroyed.
            let render = tokio::task::spawn_blocking(move || gate.render(key));
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => Err(FetchError::Cancelled),
                joined = render => joined.map_err(|e| FetchError::Task(e.to_string()))?,
            }
        })
    }
}
