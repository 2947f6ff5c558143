//! Binding to the `world_foundry` engine through its C ABI.
//!
//! Only compiled with the `native` feature, which links the engine library.
//! Handles are the engine's own pointers carried as [`RawHandle`] tokens.

use std::ffi::{CStr, CString};
use std::path::Path;
use std::ptr;

use dashmap::DashMap;
use libc::{c_char, c_int};
use tracing::{debug, warn};

use super::{
    ContextHandle, EngineClient, EngineInitError, ProjectHandle, RawHandle, RendererHandle,
};
use crate::coord::{TILE_BYTES, TILE_SIZE};

/// `wf_err` success value.
const WF_OK: c_int = 0;

#[repr(C)]
struct WfCtx {
    _private: [u8; 0],
}

#[repr(C)]
struct WfProject {
    _private: [u8; 0],
}

#[repr(C)]
struct WfRender {
    _private: [u8; 0],
}

#[link(name = "world_foundry")]
extern "C" {
    fn wf_version() -> *const c_char;
    fn wf_create(out: *mut *mut WfCtx) -> c_int;
    fn wf_destroy(ctx: *mut WfCtx);
    fn wf_project_open(ctx: *mut WfCtx, path: *const c_char, out: *mut *mut WfProject) -> c_int;
    fn wf_project_close(project: *mut WfProject);
    fn wf_render_create(
        ctx: *mut WfCtx,
        project: *mut WfProject,
        out: *mut *mut WfRender,
    ) -> c_int;
    fn wf_render_destroy(render: *mut WfRender);
    fn wf_render_tile(
        render: *mut WfRender,
        zoom: c_int,
        tx: c_int,
        ty: c_int,
        out_rgba: *mut u8,
        stride: c_int,
        w: c_int,
        h: c_int,
    ) -> c_int;
    fn wf_export_png(
        project: *mut WfProject,
        out_path: *const c_char,
        width: c_int,
        height: c_int,
        style_json: *const c_char,
    ) -> c_int;
}

/// Engine backed by the linked `world_foundry` library.
pub struct NativeEngine {
    version: String,
    /// Context each open project was created in; `wf_render_create` needs both.
    project_contexts: DashMap<RawHandle, ContextHandle>,
}

impl NativeEngine {
    /// Bind the library, checking it reports a version.
    pub fn new() -> Result<Self, EngineInitError> {
        // SAFETY: wf_version takes no arguments and returns either null or a
        // pointer to a static NUL-terminated string.
        let raw = unsafe { wf_version() };
        if raw.is_null() {
            return Err(EngineInitError::MissingVersion);
        }
        // SAFETY: checked non-null above; the string is static.
        let version = unsafe { CStr::from_ptr(raw) }
            .to_str()
            .map_err(|e| EngineInitError::InvalidVersion(e.to_string()))?
            .to_string();

        Ok(Self {
            version,
            project_contexts: DashMap::new(),
        })
    }
}

fn c_path(path: &Path) -> Option<CString> {
    CString::new(path.to_str()?).ok()
}

impl EngineClient for NativeEngine {
    fn version(&self) -> String {
        self.version.clone()
    }

    fn is_initialized(&self) -> bool {
        true
    }

    fn create_context(&self) -> Option<ContextHandle> {
        let mut out: *mut WfCtx = ptr::null_mut();
        // SAFETY: `out` is a valid location for the engine to write into.
        let err = unsafe { wf_create(&mut out) };
        if err != WF_OK {
            warn!(code = err, "wf_create failed");
            return None;
        }
        RawHandle::from_ptr(out).map(ContextHandle::from_raw)
    }

    fn destroy_context(&self, context: ContextHandle) {
        // SAFETY: the handle came from wf_create and is destroyed once.
        unsafe { wf_destroy(context.raw().as_ptr()) }
    }

    fn create_project(&self, context: ContextHandle, path: &Path) -> Option<ProjectHandle> {
        let Some(c_path) = c_path(path) else {
            warn!(path = %path.display(), "Project path is not representable as a C string");
            return None;
        };
        let mut out: *mut WfProject = ptr::null_mut();
        // SAFETY: live context, NUL-terminated path, valid out pointer.
        let err = unsafe { wf_project_open(context.raw().as_ptr(), c_path.as_ptr(), &mut out) };
        if err != WF_OK {
            warn!(code = err, path = %path.display(), "wf_project_open failed");
            return None;
        }
        let raw = RawHandle::from_ptr(out)?;
        self.project_contexts.insert(raw, context);
        Some(ProjectHandle::from_raw(raw))
    }

    fn destroy_project(&self, project: ProjectHandle) {
        self.project_contexts.remove(&project.raw());
        // SAFETY: the handle came from wf_project_open and is destroyed once.
        unsafe { wf_project_close(project.raw().as_ptr()) }
    }

    fn create_renderer(&self, project: ProjectHandle) -> Option<RendererHandle> {
        let context = *self.project_contexts.get(&project.raw())?;
        let mut out: *mut WfRender = ptr::null_mut();
        // SAFETY: context and project are live; out is a valid location.
        let err = unsafe {
            wf_render_create(context.raw().as_ptr(), project.raw().as_ptr(), &mut out)
        };
        if err != WF_OK {
            warn!(code = err, "wf_render_create failed");
            return None;
        }
        RawHandle::from_ptr(out).map(RendererHandle::from_raw)
    }

    fn destroy_renderer(&self, renderer: RendererHandle) {
        // SAFETY: the handle came from wf_render_create and is destroyed once.
        unsafe { wf_render_destroy(renderer.raw().as_ptr()) }
    }

    fn render_tile(&self, renderer: RendererHandle, x: u32, y: u32, zoom: u8) -> Option<Vec<u8>> {
        let tx = c_int::try_from(x).ok()?;
        let ty = c_int::try_from(y).ok()?;
        let size = TILE_SIZE as c_int;
        let mut buf = vec![0u8; TILE_BYTES];

        // SAFETY: buf holds exactly stride * h bytes for a 256×256 RGBA tile.
        let err = unsafe {
            wf_render_tile(
                renderer.raw().as_ptr(),
                c_int::from(zoom),
                tx,
                ty,
                buf.as_mut_ptr(),
                size * 4,
                size,
                size,
            )
        };
        if err != WF_OK {
            debug!(code = err, x, y, zoom, "wf_render_tile failed");
            return None;
        }
        Some(buf)
    }

    fn export_png(&self, project: ProjectHandle, path: &Path, width: u32, height: u32) -> bool {
        let (Some(c_path), Ok(w), Ok(h)) = (
            c_path(path),
            c_int::try_from(width),
            c_int::try_from(height),
        ) else {
            return false;
        };
        // SAFETY: live project, NUL-terminated path; null style selects defaults.
        let err = unsafe {
            wf_export_png(project.raw().as_ptr(), c_path.as_ptr(), w, h, ptr::null())
        };
        if err != WF_OK {
            warn!(code = err, path = %path.display(), "wf_export_png failed");
        }
        err == WF_OK
    }
}
