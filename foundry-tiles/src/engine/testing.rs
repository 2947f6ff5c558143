//! Recording engine for unit tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::{ContextHandle, EngineClient, ProjectHandle, RawHandle, RendererHandle};
use crate::coord::{TileKey, TILE_BYTES};

/// One call made against the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    CreateContext,
    DestroyContext(RawHandle),
    CreateProject(PathBuf),
    DestroyProject(RawHandle),
    CreateRenderer,
    DestroyRenderer(RawHandle),
    RenderTile(TileKey),
    ExportPng(PathBuf),
}

/// Stage at which the engine should refuse to create a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Context,
    Project,
    Renderer,
}

/// In-memory engine that records every call and checks handle discipline.
pub struct RecordingEngine {
    next_handle: AtomicUsize,
    fail_at: Mutex<Option<FailAt>>,
    failing_tiles: Mutex<HashSet<TileKey>>,
    short_tiles: Mutex<HashSet<TileKey>>,
    render_delay: Mutex<Duration>,
    export_result: Mutex<bool>,
    live: Mutex<HashSet<RawHandle>>,
    calls: Mutex<Vec<EngineCall>>,
    renders: Mutex<HashMap<TileKey, usize>>,
    violations: Mutex<Vec<String>>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self {
            next_handle: AtomicUsize::new(0x1000),
            fail_at: Mutex::new(None),
            failing_tiles: Mutex::new(HashSet::new()),
            short_tiles: Mutex::new(HashSet::new()),
            render_delay: Mutex::new(Duration::ZERO),
            export_result: Mutex::new(true),
            live: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            renders: Mutex::new(HashMap::new()),
            violations: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_at(stage: FailAt) -> Self {
        let engine = Self::new();
        engine.fail_at(Some(stage));
        engine
    }

    pub fn fail_at(&self, stage: Option<FailAt>) {
        *self.fail_at.lock() = stage;
    }

    pub fn fail_tile(&self, key: TileKey) {
        self.failing_tiles.lock().insert(key);
    }

    pub fn short_tile(&self, key: TileKey) {
        self.short_tiles.lock().insert(key);
    }

    pub fn set_render_delay(&self, delay: Duration) {
        *self.render_delay.lock() = delay;
    }

    pub fn set_export_result(&self, ok: bool) {
        *self.export_result.lock() = ok;
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&EngineCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| predicate(c)).count()
    }

    pub fn render_count(&self, key: TileKey) -> usize {
        self.renders.lock().get(&key).copied().unwrap_or(0)
    }

    pub fn live_handles(&self) -> usize {
        self.live.lock().len()
    }

    pub fn violations(&self) -> Vec<String> {
        self.violations.lock().clone()
    }

    fn issue(&self) -> RawHandle {
        let raw = RawHandle::new(self.next_handle.fetch_add(0x10, Ordering::SeqCst))
            .expect("handle counter starts above zero");
        self.live.lock().insert(raw);
        raw
    }

    fn retire(&self, raw: RawHandle, kind: &str) {
        if !self.live.lock().remove(&raw) {
            self.violations
                .lock()
                .push(format!("destroy_{kind} on stale handle {raw:?}"));
        }
    }

    fn check_live(&self, raw: RawHandle, what: &str) -> bool {
        let live = self.live.lock().contains(&raw);
        if !live {
            self.violations
                .lock()
                .push(format!("{what} used stale handle {raw:?}"));
        }
        live
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().push(call);
    }
}

impl EngineClient for RecordingEngine {
    fn version(&self) -> String {
        "test-engine".to_string()
    }

    fn is_initialized(&self) -> bool {
        true
    }

    fn create_context(&self) -> Option<ContextHandle> {
        self.record(EngineCall::CreateContext);
        if *self.fail_at.lock() == Some(FailAt::Context) {
            return None;
        }
        Some(ContextHandle::from_raw(self.issue()))
    }

    fn destroy_context(&self, context: ContextHandle) {
        self.record(EngineCall::DestroyContext(context.raw()));
        self.retire(context.raw(), "context");
    }

    fn create_project(&self, context: ContextHandle, path: &Path) -> Option<ProjectHandle> {
        self.record(EngineCall::CreateProject(path.to_path_buf()));
        if !self.check_live(context.raw(), "create_project") {
            return None;
        }
        if *self.fail_at.lock() == Some(FailAt::Project) {
            return None;
        }
        Some(ProjectHandle::from_raw(self.issue()))
    }

    fn destroy_project(&self, project: ProjectHandle) {
        self.record(EngineCall::DestroyProject(project.raw()));
        self.retire(project.raw(), "project");
    }

    fn create_renderer(&self, project: ProjectHandle) -> Option<RendererHandle> {
        self.record(EngineCall::CreateRenderer);
        if !self.check_live(project.raw(), "create_renderer") {
            return None;
        }
        if *self.fail_at.lock() == Some(FailAt::Renderer) {
            return None;
        }
        Some(RendererHandle::from_raw(self.issue()))
    }

    fn destroy_renderer(&self, renderer: RendererHandle) {
        self.record(EngineCall::DestroyRenderer(renderer.raw()));
        self.retire(renderer.raw(), "renderer");
    }

    fn render_tile(&self, renderer: RendererHandle, x: u32, y: u32, zoom: u8) -> Option<Vec<u8>> {
        let key = TileKey { x, y, zoom };
        self.record(EngineCall::RenderTile(key));
        *self.renders.lock().entry(key).or_insert(0) += 1;
        if !self.check_live(renderer.raw(), "render_tile") {
            return None;
        }

        let delay = *self.render_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        // Destruction must not have started while the call was running.
        if !self.check_live(renderer.raw(), "render_tile (after render)") {
            return None;
        }

        if self.failing_tiles.lock().contains(&key) {
            return None;
        }
        if self.short_tiles.lock().contains(&key) {
            return Some(vec![0u8; 16]);
        }
        Some(vec![zoom; TILE_BYTES])
    }

    fn export_png(&self, project: ProjectHandle, path: &Path, _width: u32, _height: u32) -> bool {
        self.record(EngineCall::ExportPng(path.to_path_buf()));
        self.check_live(project.raw(), "export_png") && *self.export_result.lock()
    }
}
