//! Opaque engine handle tokens.
//!
//! The engine hands out pointer-sized tokens for its contexts, projects and
//! renderers. They are never interpreted here, only passed back. Each kind
//! gets its own newtype so a project token cannot be handed to a renderer
//! call by mistake.

use std::fmt;
use std::num::NonZeroUsize;

/// Pointer-sized, non-null engine token.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(NonZeroUsize);

impl RawHandle {
    /// Wrap a token; `None` for the null token.
    pub fn new(value: usize) -> Option<Self> {
        NonZeroUsize::new(value).map(Self)
    }

    /// Wrap a pointer returned by the engine; `None` for null.
    pub fn from_ptr<T>(ptr: *mut T) -> Option<Self> {
        Self::new(ptr as usize)
    }

    pub fn get(self) -> usize {
        self.0.get()
    }

    /// The token as the pointer the engine issued.
    pub fn as_ptr<T>(self) -> *mut T {
        self.0.get() as *mut T
    }
}

impl fmt::Debug for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

macro_rules! engine_handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(RawHandle);

        impl $name {
            pub fn from_raw(raw: RawHandle) -> Self {
                Self(raw)
            }

            pub fn raw(self) -> RawHandle {
                self.0
            }
        }
    };
}

engine_handle!(
    /// Token for an engine context.
    ContextHandle
);

engine_handle!(
    /// Token for a loaded map project.
    ProjectHandle
);

engine_handle!(
    /// Token for a tile renderer bound to a project.
    RendererHandle
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_is_rejected() {
        assert!(RawHandle::new(0).is_none());
        assert!(RawHandle::from_ptr(std::ptr::null_mut::<u8>()).is_none());
    }

    #[test]
    fn test_round_trip_token() {
        let raw = RawHandle::new(0xdead_beef).unwrap();
        assert_eq!(raw.get(), 0xdead_beef);
        assert_eq!(ContextHandle::from_raw(raw).raw(), raw);
        assert_eq!(format!("{:?}", raw), "0xdeadbeef");
    }

    #[test]
    fn test_pointer_conversion() {
        let mut value = 5u32;
        let ptr: *mut u32 = &mut value;
        let raw = RawHandle::from_ptr(ptr).unwrap();
        assert_eq!(raw.as_ptr::<u32>(), ptr);
    }
}
