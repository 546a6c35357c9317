//! Page windows over regions.
//!
//! A page is a mutable window into a region plus the list links its
//! buffer gives it. The window is always a subrange of the region's full
//! extent, and each page holds exactly one region reference.

use std::rc::Rc;

use crate::region::{RegionRef, Responsibility};

/// A mutable window into a region, owned by exactly one buffer.
pub(crate) struct Page {
    region: RegionRef,
    off: usize,
    len: usize,
}

impl Page {
    /// Page windowing the region's full extent.
    pub fn new(region: RegionRef) -> Page {
        let len = region.len();
        Page { region, off: 0, len }
    }

    /// Page windowing `[off, off + len)` of the region.
    pub fn with_window(region: RegionRef, off: usize, len: usize) -> Page {
        debug_assert!(off + len <= region.len());
        Page { region, off, len }
    }

    /// New page sharing this page's region, windowed to a subrange of
    /// this page's window. Bumps the region refcount.
    pub fn transfer(&self, off: usize, len: usize) -> Page {
        debug_assert!(off + len <= self.len);
        Page {
            region: Rc::clone(&self.region),
            off: self.off + off,
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn region(&self) -> &RegionRef {
        &self.region
    }

    /// File offset of the window's first byte, for mapped regions.
    pub fn file_offset(&self) -> Option<usize> {
        self.region.file_offset().map(|base| base + self.off)
    }

    /// The window contents.
    pub fn bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.region.base().as_ptr().add(self.off), self.len) }
    }

    /// Copy `src` into the window starting at `at`.
    pub fn write(&mut self, at: usize, src: &[u8]) {
        debug_assert!(at + src.len() <= self.len);
        debug_assert!(self.region.responsibility() != Responsibility::Referenced);
        unsafe {
            std::ptr::copy_nonoverlapping(
                src.as_ptr(),
                self.region.base().as_ptr().add(self.off + at),
                src.len(),
            );
        }
    }

    /// Advance the window start, shrinking it from the front.
    pub fn consume_front(&mut self, n: usize) {
        debug_assert!(n <= self.len);
        self.off += n;
        self.len -= n;
    }

    /// Shrink the window from the back.
    pub fn trim_back(&mut self, n: usize) {
        debug_assert!(n <= self.len);
        self.len -= n;
    }

    /// A view of the window that keeps the region alive on its own.
    pub fn slice(&self) -> PageSlice {
        PageSlice {
            region: Rc::clone(&self.region),
            off: self.off,
            len: self.len,
        }
    }
}

/// A read view of one page's window.
///
/// The slice holds its own region reference, so its bytes remain valid
/// even if the owning buffer unlinks, splits or shrinks the page
/// afterwards.
#[derive(Clone)]
pub struct PageSlice {
    region: RegionRef,
    off: usize,
    len: usize,
}

impl PageSlice {
    /// Window length, in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the window is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The window contents.
    pub fn bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.region.base().as_ptr().add(self.off), self.len) }
    }

    pub(crate) fn region(&self) -> &RegionRef {
        &self.region
    }

    /// Window start relative to the region base.
    pub(crate) fn region_offset(&self) -> usize {
        self.off
    }

    pub(crate) fn as_ptr(&self) -> *const u8 {
        self.bytes().as_ptr()
    }

    /// The same view shortened to `len` bytes.
    pub(crate) fn truncated(&self, len: usize) -> PageSlice {
        debug_assert!(len <= self.len);
        PageSlice {
            region: Rc::clone(&self.region),
            off: self.off,
            len,
        }
    }
}

impl std::fmt::Debug for PageSlice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PageSlice({} bytes)", self.len)
    }
}
