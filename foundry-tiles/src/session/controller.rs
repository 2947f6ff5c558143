//! The map session controller.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::fetcher::EngineTileFetcher;
use super::{ExportError, LoadError};
use crate::cache::{CacheStats, TileCache, TileCacheSnapshot, TileFetcher};
use crate::config::SessionConfig;
use crate::engine::{EngineClient, EngineInfo};
use crate::lifecycle::{RenderGate, ResourceLifecycleManager};
use crate::viewport::{visible_tiles, ViewportModel, ViewportState, ViewportUpdate};

/// Orchestrates one map session at a time.
///
/// Viewport changes are applied and published synchronously, in call order.
/// Each change then schedules a reconciliation of the tile cache on the
/// runtime; a newer reconciliation aborts the previous one, while the tile
/// fetches it started keep running and still land in the cache.
///
/// Loading a map tears the previous session down completely (fetches
/// cancelled, renderer → project → context destroyed) before the new one is
/// acquired. Dropping the controller disposes it.
pub struct MapSessionController {
    engine: Arc<dyn EngineClient>,
    config: SessionConfig,
    runtime: Handle,
    lifecycle: Arc<Mutex<ResourceLifecycleManager>>,
    /// Gate of the loaded session, readable without the lifecycle lock.
    gate: RwLock<Option<Arc<RenderGate>>>,
    viewport: Mutex<ViewportModel>,
    cache: Arc<TileCache>,
    reconcile_task: Mutex<Option<JoinHandle<()>>>,
    viewport_tx: watch::Sender<ViewportState>,
    loading_tx: watch::Sender<bool>,
    error_tx: watch::Sender<Option<String>>,
}

impl MapSessionController {
    /// Create an idle controller.
    ///
    /// Reconciliations and blocking engine calls are spawned on `runtime`.
    pub fn new(engine: Arc<dyn EngineClient>, config: SessionConfig, runtime: Handle) -> Self {
        let initial = ViewportState::centered(config.viewport_width, config.viewport_height);
        let (viewport_tx, _) = watch::channel(initial);
        let (loading_tx, _) = watch::channel(false);
        let (error_tx, _) = watch::channel(None);

        Self {
            lifecycle: Arc::new(Mutex::new(ResourceLifecycleManager::new(Arc::clone(&engine)))),
            cache: Arc::new(TileCache::with_concurrency(
                config.cache_capacity,
                config.max_concurrent_fetches,
            )),
            engine,
            config,
            runtime,
            gate: RwLock::new(None),
            viewport: Mutex::new(ViewportModel::new(initial)),
            reconcile_task: Mutex::new(None),
            viewport_tx,
            loading_tx,
            error_tx,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn engine_info(&self) -> EngineInfo {
        self.engine.engine_info()
    }

    pub fn viewport(&self) -> ViewportState {
        *self.viewport_tx.borrow()
    }

    pub fn subscribe_viewport(&self) -> watch::Receiver<ViewportState> {
        self.viewport_tx.subscribe()
    }

    pub fn tiles(&self) -> Arc<TileCacheSnapshot> {
        self.cache.snapshot()
    }

    pub fn subscribe_tiles(&self) -> watch::Receiver<Arc<TileCacheSnapshot>> {
        self.cache.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        *self.loading_tx.borrow()
    }

    pub fn subscribe_loading(&self) -> watch::Receiver<bool> {
        self.loading_tx.subscribe()
    }

    /// Message of the last failed load or export, cleared by the next load.
    pub fn error(&self) -> Option<String> {
        self.error_tx.borrow().clone()
    }

    pub fn subscribe_error(&self) -> watch::Receiver<Option<String>> {
        self.error_tx.subscribe()
    }

    /// Whether a map is loaded and rendering.
    pub fn is_loaded(&self) -> bool {
        self.gate.read().as_ref().is_some_and(|gate| gate.is_open())
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Load a map file, replacing the current session.
    ///
    /// On success the viewport is reset to the whole world and the first
    /// visible tiles have been fetched when this returns. On failure the
    /// message is published on the error observable and no session is
    /// active. The loading flag is raised for the duration either way, and
    /// is lowered again even if this future is dropped before it completes.
    pub async fn load_map(&self, path: impl AsRef<Path>) -> Result<(), LoadError> {
        let path = path.as_ref().to_path_buf();
        let _loading = LoadingFlag::raise(&self.loading_tx);
        self.error_tx.send_replace(None);
        info!(path = %path.display(), "Loading map");

        let result = self.load_session(path).await;
        if let Err(e) = &result {
            warn!(error = %e, "Map load failed");
            self.error_tx.send_replace(Some(e.to_string()));
        }
        result
    }

    async fn load_session(&self, path: PathBuf) -> Result<(), LoadError> {
        self.cancel_fetches();

        let lifecycle = Arc::clone(&self.lifecycle);
        let gate = self
            .runtime
            .spawn_blocking(move || lifecycle.lock().begin_load(&path))
            .await
            .map_err(|e| LoadError::Task(e.to_string()))??;

        *self.gate.write() = Some(Arc::clone(&gate));
        self.cache.clear();

        let state = {
            let mut viewport = self.viewport.lock();
            let state = viewport.reset();
            self.viewport_tx.send_replace(state);
            state
        };

        let fetcher: Arc<dyn TileFetcher> = Arc::new(EngineTileFetcher::new(gate));
        let report = self
            .cache
            .reconcile(visible_tiles(&state).to_vec(), fetcher)
            .await;

        info!(
            tiles = report.snapshot.len(),
            failed = report.failed.len(),
            "Map loaded"
        );
        Ok(())
    }

    /// Drag the map by a pixel offset.
    pub fn pan(&self, dx: f64, dy: f64) -> ViewportState {
        self.update_with(|model| model.pan(dx, dy))
    }

    /// Zoom by `delta` levels around a viewport-relative focus point.
    pub fn zoom_by(&self, delta: i32, focus_x: f64, focus_y: f64) -> ViewportState {
        self.update_with(|model| model.zoom_by(delta, focus_x, focus_y))
    }

    /// Report a new on-screen viewport size.
    pub fn resize(&self, width: u32, height: u32) -> ViewportState {
        self.update_with(|model| model.resize(width, height))
    }

    /// Apply a partial viewport change.
    pub fn update_viewport(&self, update: ViewportUpdate) -> ViewportState {
        self.update_with(|model| model.apply(update))
    }

    fn update_with(&self, change: impl FnOnce(&mut ViewportModel) -> ViewportState) -> ViewportState {
        // Held through scheduling so reconciliations start in call order.
        let mut viewport = self.viewport.lock();
        let before = viewport.state();
        let state = change(&mut *viewport);
        if state == before {
            return state;
        }

        self.viewport_tx.send_replace(state);
        self.schedule_reconcile(state);
        state
    }

    fn schedule_reconcile(&self, state: ViewportState) {
        let Some(gate) = self.gate.read().clone().filter(|gate| gate.is_open()) else {
            return;
        };

        let visible = visible_tiles(&state);
        let zoom = visible.zoom();
        let keys = visible.to_vec();
        let cache = Arc::clone(&self.cache);
        let fetcher: Arc<dyn TileFetcher> = Arc::new(EngineTileFetcher::new(gate));

        let mut slot = self.reconcile_task.lock();
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = Some(self.runtime.spawn(async move {
            let report = cache.reconcile(keys, fetcher).await;
            if let Some(failure) = report.failure() {
                debug!(zoom, error = %failure, "Reconciliation left tiles missing");
            }
        }));
    }

    /// Export the loaded map at the configured default size.
    pub async fn export_png(&self, path: impl AsRef<Path>) -> Result<(), ExportError> {
        self.export_png_with_size(path, self.config.export_width, self.config.export_height)
            .await
    }

    /// Export the loaded map to a PNG of the given size.
    ///
    /// Without a loaded map this fails with [`ExportError::NoSession`] and
    /// the engine is not called. Failures are also published on the error
    /// observable.
    pub async fn export_png_with_size(
        &self,
        path: impl AsRef<Path>,
        width: u32,
        height: u32,
    ) -> Result<(), ExportError> {
        let path = path.as_ref().to_path_buf();
        let lifecycle = Arc::clone(&self.lifecycle);
        let engine = Arc::clone(&self.engine);
        let target = path.clone();

        let result = self
            .runtime
            .spawn_blocking(move || {
                // The lifecycle lock keeps the project alive for the call.
                let lifecycle = lifecycle.lock();
                let project = lifecycle.project_handle().ok_or(ExportError::NoSession)?;
                if engine.export_png(project, &target, width, height) {
                    Ok(())
                } else {
                    Err(ExportError::Rejected { path: target })
                }
            })
            .await
            .map_err(|e| ExportError::Task(e.to_string()))
            .and_then(|result| result);

        match &result {
            Ok(()) => info!(path = %path.display(), width, height, "Exported map"),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Export failed");
                self.error_tx.send_replace(Some(format!("Export failed: {e}")));
            }
        }
        result
    }

    /// End the session: abort reconciliation, cancel fetches and release
    /// the engine handles.
    ///
    /// Idempotent; the controller can load another map afterwards.
    pub fn dispose(&self) {
        self.cancel_fetches();
        if self.lifecycle.lock().release() {
            info!("Map session disposed");
        }
        self.loading_tx.send_replace(false);
    }

    fn cancel_fetches(&self) {
        if let Some(task) = self.reconcile_task.lock().take() {
            task.abort();
        }
        self.gate.write().take();
        self.cache.clear();
    }
}

/// Holds the loading observable at `true` until dropped.
struct LoadingFlag<'a>(&'a watch::Sender<bool>);

impl<'a> LoadingFlag<'a> {
    fn raise(tx: &'a watch::Sender<bool>) -> Self {
        tx.send_replace(true);
        Self(tx)
    }
}

impl Drop for LoadingFlag<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

impl Drop for MapSessionController {
    fn drop(&mut self) {
        self.dispose();
    }
}
