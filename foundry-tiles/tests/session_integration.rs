//! Integration tests for the map session.
//!
//! These tests drive [`MapSessionController`] through its public API against
//! an in-memory engine and verify:
//! - load → visible tiles → pan/zoom → reconciled tiles
//! - handle discipline across reloads, failures and disposal
//! - bounded cache and single-flight fetching under rapid viewport changes
//!
//! Run with: `cargo test --test session_integration`

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;

use foundry_tiles::engine::{ContextHandle, ProjectHandle, RawHandle, RendererHandle};
use foundry_tiles::session::LoadError;
use foundry_tiles::{
    visible_tiles, AcquisitionError, EngineClient, MapSessionController, SessionConfig,
    TileCacheSnapshot, TileKey, TILE_BYTES,
};

// ============================================================================
// Mock Engine
// ============================================================================

/// Engine double that hands out unique handles and counts what it renders.
///
/// A map path containing "broken" fails at project creation. Every call on a
/// handle that is not live is recorded as a violation.
struct MockEngine {
    next: AtomicUsize,
    live: Mutex<HashSet<usize>>,
    renders: Mutex<HashMap<TileKey, usize>>,
    destroyed: Mutex<Vec<&'static str>>,
    violations: Mutex<Vec<String>>,
    render_delay: Duration,
}

impl MockEngine {
    fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    fn with_delay(render_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            next: AtomicUsize::new(1),
            live: Mutex::new(HashSet::new()),
            renders: Mutex::new(HashMap::new()),
            destroyed: Mutex::new(Vec::new()),
            violations: Mutex::new(Vec::new()),
            render_delay,
        })
    }

    fn issue(&self) -> RawHandle {
        let value = self.next.fetch_add(1, Ordering::SeqCst);
        self.live.lock().insert(value);
        RawHandle::new(value).expect("handle counter starts at one")
    }

    fn retire(&self, raw: RawHandle, kind: &'static str) {
        if !self.live.lock().remove(&raw.get()) {
            self.violations
                .lock()
                .push(format!("{kind} destroyed twice"));
        }
        self.destroyed.lock().push(kind);
    }

    fn renders_of(&self, key: TileKey) -> usize {
        self.renders.lock().get(&key).copied().unwrap_or(0)
    }

    fn total_renders(&self) -> usize {
        self.renders.lock().values().sum()
    }

    fn live(&self) -> usize {
        self.live.lock().len()
    }

    fn violations(&self) -> Vec<String> {
        self.violations.lock().clone()
    }

    fn destroyed(&self) -> Vec<&'static str> {
        self.destroyed.lock().clone()
    }
}

impl EngineClient for MockEngine {
    fn version(&self) -> String {
        "mock-1.0".to_string()
    }

    fn is_initialized(&self) -> bool {
        true
    }

    fn create_context(&self) -> Option<ContextHandle> {
        Some(ContextHandle::from_raw(self.issue()))
    }

    fn destroy_context(&self, context: ContextHandle) {
        self.retire(context.raw(), "context");
    }

    fn create_project(&self, _context: ContextHandle, path: &Path) -> Option<ProjectHandle> {
        if path.to_string_lossy().contains("broken") {
            return None;
        }
        Some(ProjectHandle::from_raw(self.issue()))
    }

    fn destroy_project(&self, project: ProjectHandle) {
        self.retire(project.raw(), "project");
    }

    fn create_renderer(&self, _project: ProjectHandle) -> Option<RendererHandle> {
        Some(RendererHandle::from_raw(self.issue()))
    }

    fn destroy_renderer(&self, renderer: RendererHandle) {
        self.retire(renderer.raw(), "renderer");
    }

    fn render_tile(&self, renderer: RendererHandle, x: u32, y: u32, zoom: u8) -> Option<Vec<u8>> {
        if !self.render_delay.is_zero() {
            std::thread::sleep(self.render_delay);
        }
        if !self.live.lock().contains(&renderer.raw().get()) {
            self.violations
                .lock()
                .push(format!("render on dead renderer {zoom}/{x}/{y}"));
            return None;
        }
        *self
            .renders
            .lock()
            .entry(TileKey { x, y, zoom })
            .or_insert(0) += 1;
        Some(vec![zoom; TILE_BYTES])
    }

    fn export_png(&self, _project: ProjectHandle, _path: &Path, _width: u32, _height: u32) -> bool {
        true
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn make_controller(engine: &Arc<MockEngine>, config: SessionConfig) -> MapSessionController {
    MapSessionController::new(
        Arc::clone(engine) as Arc<dyn EngineClient>,
        config,
        Handle::current(),
    )
}

/// Wait until every currently visible tile is in the published snapshot.
async fn settle(controller: &MapSessionController) -> Arc<TileCacheSnapshot> {
    let visible = visible_tiles(&controller.viewport());
    let mut rx = controller.subscribe_tiles();
    let snapshot = tokio::time::timeout(
        Duration::from_secs(10),
        rx.wait_for(|snapshot| visible.iter().all(|key| snapshot.contains(&key))),
    )
    .await
    .expect("Visible tiles should arrive")
    .expect("Cache should outlive the test")
    .clone();
    snapshot
}

// ============================================================================
// Integration Tests
// ============================================================================

/// Load a map, zoom in and pan around; every visible tile ends up cached and
/// every published tile carries the pixels of its own zoom level.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_load_zoom_pan_flow() {
    let engine = MockEngine::new();
    let controller = make_controller(&engine, SessionConfig::default());

    controller.load_map("worlds/azgaar.map").await.unwrap();
    assert_eq!(controller.tiles().len(), 1);

    controller.zoom_by(2, 0.5, 0.5);
    let snapshot = settle(&controller).await;
    assert!(snapshot.len() >= 4);

    controller.pan(-300.0, 120.0);
    let snapshot = settle(&controller).await;

    for (key, tile) in snapshot.iter() {
        assert_eq!(tile.key(), *key);
        assert_eq!(tile.pixels()[0], key.zoom);
    }
    assert!(engine.violations().is_empty());
}

/// Rapid viewport changes supersede each other but never render a tile
/// twice and never grow the cache past its capacity.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rapid_changes_stay_bounded_and_single_flight() {
    let engine = MockEngine::with_delay(Duration::from_millis(2));
    let config = SessionConfig::default().with_cache_capacity(100);
    let controller = make_controller(&engine, config);
    controller.load_map("worlds/azgaar.map").await.unwrap();

    controller.zoom_by(4, 0.5, 0.5);
    for step in 0..20 {
        let dx = if step % 2 == 0 { 200.0 } else { -150.0 };
        controller.pan(dx, 10.0);
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    let snapshot = settle(&controller).await;

    assert!(snapshot.len() <= 100);
    for key in visible_tiles(&controller.viewport()).iter() {
        assert!(snapshot.contains(&key));
        assert_eq!(engine.renders_of(key), 1, "tile {key} rendered twice");
    }
    assert!(engine.violations().is_empty());
}

/// A failed load leaves nothing alive and reports which stage failed.
#[tokio::test]
async fn test_failed_load_rolls_back() {
    let engine = MockEngine::new();
    let controller = make_controller(&engine, SessionConfig::default());

    let err = controller.load_map("worlds/broken.map").await.unwrap_err();

    assert!(matches!(
        err,
        LoadError::Acquisition(AcquisitionError::Project { .. })
    ));
    assert_eq!(engine.live(), 0);
    assert_eq!(engine.destroyed(), vec!["context"]);
    assert_eq!(
        controller.error().as_deref(),
        Some("Failed to load project from: worlds/broken.map")
    );
}

/// Reloading destroys the previous chain in reverse order before the new
/// chain is created.
#[tokio::test]
async fn test_reload_tears_down_in_reverse_order() {
    let engine = MockEngine::new();
    let controller = make_controller(&engine, SessionConfig::default());

    controller.load_map("worlds/first.map").await.unwrap();
    controller.load_map("worlds/second.map").await.unwrap();

    assert_eq!(engine.destroyed(), vec!["renderer", "project", "context"]);
    assert_eq!(engine.live(), 3);
    assert_eq!(controller.viewport().zoom(), 0);
}

/// Disposing while renders are running waits for them; no render ever sees
/// a destroyed renderer.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dispose_with_renders_in_flight() {
    let engine = MockEngine::with_delay(Duration::from_millis(20));
    let controller = make_controller(&engine, SessionConfig::default());
    controller.load_map("worlds/azgaar.map").await.unwrap();

    controller.zoom_by(3, 0.5, 0.5);
    tokio::time::sleep(Duration::from_millis(5)).await;
    controller.dispose();
    let rendered = engine.total_renders();

    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(engine.live(), 0);
    assert_eq!(engine.total_renders(), rendered);
    assert!(engine.violations().is_empty());
    assert!(controller.tiles().is_empty());
}

/// Reloading while renders are running tears the old chain down only after
/// they return, and the new session renders normally.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reload_with_renders_in_flight() {
    let engine = MockEngine::with_delay(Duration::from_millis(20));
    let controller = make_controller(&engine, SessionConfig::default());
    controller.load_map("worlds/first.map").await.unwrap();

    controller.zoom_by(3, 0.5, 0.5);
    tokio::time::sleep(Duration::from_millis(5)).await;
    controller.load_map("worlds/second.map").await.unwrap();

    assert_eq!(engine.destroyed(), vec!["renderer", "project", "context"]);
    assert_eq!(engine.live(), 3);
    assert_eq!(controller.viewport().zoom(), 0);
    let snapshot = settle(&controller).await;
    assert_eq!(snapshot.len(), 1);

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(engine.violations().is_empty());
    assert!(controller.tiles().keys().all(|key| key.zoom == 0));
}

/// Export goes through the live project; after disposal it is refused.
#[tokio::test]
async fn test_export_follows_session() {
    let engine = MockEngine::new();
    let controller = make_controller(&engine, SessionConfig::default());

    controller.load_map("worlds/azgaar.map").await.unwrap();
    controller.export_png("out/map.png").await.unwrap();

    controller.dispose();
    assert!(controller.export_png("out/map.png").await.is_err());
    assert!(controller.error().is_some());
}

/// Engine info passes straight through.
#[tokio::test]
async fn test_engine_info() {
    let engine = MockEngine::new();
    let controller = make_controller(&engine, SessionConfig::default());

    let info = controller.engine_info();
    assert_eq!(info.version, "mock-1.0");
    assert!(info.features.iter().any(|f| f == "render"));
}
