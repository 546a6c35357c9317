//! Reference-counted memory regions.
//!
//! A region describes one contiguous byte range. The description is
//! immutable: `base` and `len` never change after creation and the range
//! stays valid for the region's whole lifetime. All mutability lives in
//! the pages that window into a region, which is what makes cheap
//! cross-buffer sharing possible.
//!
//! Sharing is `Rc`-based: the strong count is the region refcount, and
//! the backing-specific teardown runs exactly once when the last handle
//! drops. `Rc` being `!Send + !Sync` is deliberate: the crate is
//! single-threaded by contract, and misuse across threads fails to
//! compile instead of racing.

use std::ptr::NonNull;
use std::rc::Rc;

use crate::alloc::{AllocKind, AllocRef};

/// A `(base, len)` descriptor of a contiguous byte range.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ByteSpan {
    base: NonNull<u8>,
    len: usize,
}

impl ByteSpan {
    pub fn new(base: NonNull<u8>, len: usize) -> ByteSpan {
        ByteSpan { base, len }
    }

    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

/// Who is responsible for the bytes a region describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Responsibility {
    /// The bytes were obtained from the region's allocator at
    /// construction and are released through it on teardown.
    Owned,
    /// The bytes are externally owned; the region merely describes them.
    Referenced,
    /// The bytes are a file-backed map window, unmapped on teardown.
    #[cfg(unix)]
    Mapped,
}

enum Backing {
    Owned { alloc: AllocRef },
    Referenced,
    #[cfg(unix)]
    Mapped { file_offset: usize },
}

/// A reference-counted contiguous byte range.
pub struct Region {
    span: ByteSpan,
    backing: Backing,
}

/// Shared region handle; the strong count is the region refcount.
pub(crate) type RegionRef = Rc<Region>;

impl Region {
    /// Region whose payload comes from `alloc`. `None` when the
    /// allocator cannot satisfy the request.
    pub(crate) fn new_owned(alloc: &AllocRef, size: usize) -> Option<RegionRef> {
        let base = alloc.alloc(AllocKind::Region, size)?;
        Some(Rc::new(Region {
            span: ByteSpan::new(base, size),
            backing: Backing::Owned {
                alloc: Rc::clone(alloc),
            },
        }))
    }

    /// Describe externally owned bytes without copying them.
    ///
    /// Referenced regions are never written through: a buffer that needs
    /// to overwrite one replaces it with an owned copy first.
    pub fn new_referenced(bytes: &'static [u8]) -> RegionRef {
        // A slice pointer is never null, even for an empty slice.
        let base = NonNull::new(bytes.as_ptr() as *mut u8).unwrap();
        Rc::new(Region {
            span: ByteSpan::new(base, bytes.len()),
            backing: Backing::Referenced,
        })
    }

    /// Describe an arbitrary externally owned range.
    ///
    /// # Safety
    ///
    /// `[base, base + len)` must stay valid, and must not be written
    /// through other aliases, for the whole lifetime of the region and
    /// every page windowing into it.
    pub unsafe fn from_raw_parts(base: NonNull<u8>, len: usize) -> RegionRef {
        Rc::new(Region {
            span: ByteSpan::new(base, len),
            backing: Backing::Referenced,
        })
    }

    /// Region over an established map window at `file_offset`.
    #[cfg(unix)]
    pub(crate) fn new_mapped(base: NonNull<u8>, len: usize, file_offset: usize) -> RegionRef {
        Rc::new(Region {
            span: ByteSpan::new(base, len),
            backing: Backing::Mapped { file_offset },
        })
    }

    /// Length of the described range, in bytes.
    pub fn len(&self) -> usize {
        self.span.len()
    }

    /// Whether the described range is empty.
    pub fn is_empty(&self) -> bool {
        self.span.len() == 0
    }

    /// Who is responsible for the bytes.
    pub fn responsibility(&self) -> Responsibility {
        match self.backing {
            Backing::Owned { .. } => Responsibility::Owned,
            Backing::Referenced => Responsibility::Referenced,
            #[cfg(unix)]
            Backing::Mapped { .. } => Responsibility::Mapped,
        }
    }

    /// Aligned file offset of a mapped region.
    pub(crate) fn file_offset(&self) -> Option<usize> {
        match self.backing {
            #[cfg(unix)]
            Backing::Mapped { file_offset } => Some(file_offset),
            _ => None,
        }
    }

    pub(crate) fn base(&self) -> NonNull<u8> {
        self.span.base()
    }

    /// Whether more than one handle (page or cache entry) references
    /// this region.
    pub(crate) fn is_shared(this: &RegionRef) -> bool {
        Rc::strong_count(this) > 1
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        match &self.backing {
            Backing::Owned { alloc } => unsafe {
                alloc.free(AllocKind::Region, self.span.base(), self.span.len());
            },
            Backing::Referenced => {}
            #[cfg(unix)]
            Backing::Mapped { file_offset } => {
                trace!(
                    "unmapping {} byte window at file offset {}",
                    self.span.len(),
                    file_offset
                );
                if let Err(e) = unsafe { crate::mmap::sys::unmap(self.span.base(), self.span.len()) } {
                    warn!("munmap of {} bytes failed: {}", self.span.len(), e);
                }
            }
        }
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("len", &self.span.len())
            .field("responsibility", &self.responsibility())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::TrivialAllocator;

    #[test]
    fn owned_region_releases_through_allocator() {
        let alloc = TrivialAllocator::shared();
        let region = Region::new_owned(&alloc, 128).unwrap();
        assert_eq!(region.len(), 128);
        assert_eq!(region.responsibility(), Responsibility::Owned);
        assert!(!Region::is_shared(&region));

        let second = Rc::clone(&region);
        assert!(Region::is_shared(&region));
        drop(second);
        assert!(!Region::is_shared(&region));
    }

    #[test]
    fn referenced_region_describes_static_bytes() {
        static PAYLOAD: &[u8] = b"payload";
        let region = Region::new_referenced(PAYLOAD);
        assert_eq!(region.len(), 7);
        assert_eq!(region.responsibility(), Responsibility::Referenced);
        assert!(region.file_offset().is_none());
    }
}
