//! Pluggable memory allocation.
//!
//! Buffers obtain region payload through an [`Allocator`] so that hosts
//! can substitute arenas, slabs or instrumented allocators. The
//! [`AllocKind`] hint distinguishes short-lived struct metadata from
//! long-lived payload bytes; implementations are free to segregate the
//! two.

use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::rc::Rc;

/// The intent of an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocKind {
    /// Metadata tied to a struct lifetime. Zero-filled on allocation and
    /// zeroed again before the underlying memory is released.
    Struct,
    /// Region payload bytes. Not initialised.
    Region,
}

/// Allocation callbacks consumed by buffers and regions.
///
/// Allocators are shared through [`AllocRef`] and must carry no
/// per-caller state: many regions and buffers may hold the same handle
/// at once.
pub trait Allocator {
    /// Allocate `size` bytes for the given intent, or `None` when the
    /// request cannot be satisfied. Callers surface a `None` as a short
    /// byte count, never as a panic.
    fn alloc(&self, kind: AllocKind, size: usize) -> Option<NonNull<u8>>;

    /// Release an allocation.
    ///
    /// # Safety
    ///
    /// `ptr` must come from a prior [`Allocator::alloc`] on this same
    /// allocator with exactly the same `kind` and `size`, and must not
    /// be used afterwards.
    unsafe fn free(&self, kind: AllocKind, ptr: NonNull<u8>, size: usize);
}

/// Shared allocator handle.
pub type AllocRef = Rc<dyn Allocator>;

/// Built-in allocator over the platform heap.
#[derive(Debug, Default)]
pub struct TrivialAllocator;

impl TrivialAllocator {
    /// The platform heap as a shared handle.
    pub fn shared() -> AllocRef {
        Rc::new(TrivialAllocator)
    }
}

impl Allocator for TrivialAllocator {
    fn alloc(&self, kind: AllocKind, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        let layout = Layout::from_size_align(size, 1).ok()?;
        let ptr = match kind {
            AllocKind::Struct => unsafe { alloc::alloc_zeroed(layout) },
            AllocKind::Region => unsafe { alloc::alloc(layout) },
        };
        NonNull::new(ptr)
    }

    unsafe fn free(&self, kind: AllocKind, ptr: NonNull<u8>, size: usize) {
        debug_assert!(size > 0);
        if kind == AllocKind::Struct {
            std::ptr::write_bytes(ptr.as_ptr(), 0, size);
        }
        let layout = Layout::from_size_align_unchecked(size, 1);
        alloc::dealloc(ptr.as_ptr(), layout);
    }
}
