//! The buffer capability set.
//!
//! [`Buffer`] is the contract shared by the heap and file-backed
//! implementations: append, head/tail shrink, insert, overwrite,
//! non-destructive read, and bidirectional page/byte cursors. Both
//! variants compose the same [`BufferCore`] (page list, strategy,
//! allocator handle, revision counter, cached size); variant-specific
//! state lives beside it, never in a layout-dependent prefix.

mod heap;

pub use heap::HeapBuffer;

use downcast_rs::{impl_downcast, Downcast};

use crate::alloc::AllocRef;
use crate::list::{NodeId, PageList, SENTINEL};
use crate::page::{Page, PageSlice};
use crate::region::Region;
use crate::strategy::Strategy;

/// Position of one page within a buffer, or END.
///
/// Cursors are invalidated by any structural mutation of the owning
/// buffer; a stale cursor snaps to END rather than dangling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub(crate) node: NodeId,
}

impl PageCursor {
    /// The position one past the last page.
    pub fn end() -> PageCursor {
        PageCursor { node: SENTINEL }
    }

    /// Whether this cursor is at END.
    pub fn is_end(&self) -> bool {
        self.node == SENTINEL
    }

    pub(crate) fn at(node: NodeId) -> PageCursor {
        PageCursor { node }
    }
}

/// Position of one byte within a buffer: a page plus an offset into its
/// window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteCursor {
    page: PageCursor,
    offset: usize,
}

impl ByteCursor {
    /// Cursor at `offset` within the window of `page`.
    pub fn new(page: PageCursor, offset: usize) -> ByteCursor {
        ByteCursor { page, offset }
    }

    /// The byte position one past the last byte.
    pub fn end() -> ByteCursor {
        ByteCursor {
            page: PageCursor::end(),
            offset: 0,
        }
    }

    /// Whether this cursor is at END.
    pub fn is_end(&self) -> bool {
        self.page.is_end()
    }

    /// The page this cursor sits in.
    pub fn page(&self) -> PageCursor {
        self.page
    }

    /// Offset within that page's window.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// The FIFO byte-container contract.
///
/// Every operation returns the byte count it actually processed.
/// Allocation failure, I/O failure and strategy rejection all surface as
/// short (possibly zero) counts; nothing here panics on them. Pure
/// append never changes `data_revision`; operations that alter bytes
/// already in the buffer always do.
pub trait Buffer: Downcast {
    /// The strategy this buffer was built with.
    fn strategy(&self) -> &Strategy;

    /// Total bytes currently held.
    fn data_size(&self) -> usize;

    /// Monotonic counter readers use to detect intrusive mutation.
    fn data_revision(&self) -> u64;

    /// Append `len` bytes of fresh, uninitialised capacity at the tail.
    fn extend(&mut self, len: usize) -> usize;

    /// Grow the buffer so it holds at least `size` bytes.
    fn reserve(&mut self, size: usize) -> usize {
        let need = size.saturating_sub(self.data_size());
        if need == 0 {
            0
        } else {
            self.extend(need)
        }
    }

    /// Prepend `len` bytes of fresh capacity at the head.
    fn rewind(&mut self, len: usize) -> usize;

    /// Consume up to `len` bytes from the head.
    fn seek(&mut self, len: usize) -> usize;

    /// Drop up to `len` bytes from the tail.
    fn trim(&mut self, len: usize) -> usize;

    /// Append a copy of `data`.
    fn write(&mut self, data: &[u8]) -> usize;

    /// Append up to `len` bytes from another buffer, sharing or cloning
    /// regions per this buffer's strategy.
    fn write_buffer(&mut self, src: &mut dyn Buffer, len: usize) -> usize;

    /// Overwrite existing bytes from the head. Never grows the buffer.
    fn overwrite(&mut self, data: &[u8]) -> usize;

    /// Overwrite existing bytes with up to `len` bytes from another
    /// buffer.
    fn overwrite_buffer(&mut self, src: &mut dyn Buffer, len: usize) -> usize;

    /// Insert a copy of `data` at `at`. An END anchor appends; an
    /// anchor inside a page window splits the page zero-copy.
    fn insert_data(&mut self, at: ByteCursor, data: &[u8]) -> usize;

    /// Insert externally owned bytes at `at` without copying them.
    fn insert_ref(&mut self, at: ByteCursor, data: &'static [u8]) -> usize;

    /// Insert up to `len` bytes from another buffer at `at`.
    fn insert_buffer(&mut self, at: ByteCursor, src: &mut dyn Buffer, len: usize) -> usize;

    /// Copy up to `out.len()` bytes from the head into `out` without
    /// consuming them.
    fn read(&mut self, out: &mut [u8]) -> usize {
        let mut copied = 0;
        let mut cur = self.begin();
        while copied < out.len() && !cur.is_end() {
            let Some(slice) = self.page(cur) else { break };
            let bytes = slice.bytes();
            let n = bytes.len().min(out.len() - copied);
            out[copied..copied + n].copy_from_slice(&bytes[..n]);
            copied += n;
            cur = self.next_page(cur);
        }
        copied
    }

    /// Cursor at the first page, or END when empty.
    fn begin(&mut self) -> PageCursor;

    /// The END cursor.
    fn end(&self) -> PageCursor {
        PageCursor::end()
    }

    /// The page after `at`. END is stable under advancement.
    fn next_page(&mut self, at: PageCursor) -> PageCursor;

    /// The page before `at`. `prev(END)` is the last page; `prev` of the
    /// first page is END.
    fn prev_page(&mut self, at: PageCursor) -> PageCursor;

    /// View of the page at `at`. The slice keeps its bytes alive
    /// independently of later structural mutation.
    fn page(&self, at: PageCursor) -> Option<PageSlice>;

    /// Byte cursor at the first byte, or END when empty.
    fn begin_bytes(&mut self) -> ByteCursor {
        ByteCursor::new(self.begin(), 0)
    }

    /// The byte after `at`, crossing into the next page on window
    /// overflow. END is stable.
    fn next_byte(&mut self, at: ByteCursor) -> ByteCursor {
        if at.is_end() {
            return at;
        }
        let len = self.page(at.page()).map(|s| s.len()).unwrap_or(0);
        if at.offset() + 1 < len {
            ByteCursor::new(at.page(), at.offset() + 1)
        } else {
            ByteCursor::new(self.next_page(at.page()), 0)
        }
    }

    /// The byte before `at`, crossing to the previous page's last byte
    /// on window underflow. Retreating past the first byte yields END.
    fn prev_byte(&mut self, at: ByteCursor) -> ByteCursor {
        if !at.is_end() && at.offset() > 0 {
            return ByteCursor::new(at.page(), at.offset() - 1);
        }
        let prev = self.prev_page(at.page());
        if prev.is_end() {
            return ByteCursor::end();
        }
        let len = self.page(prev).map(|s| s.len()).unwrap_or(0);
        ByteCursor::new(prev, len.saturating_sub(1))
    }

    /// The byte under `at`.
    fn byte(&self, at: ByteCursor) -> Option<u8> {
        self.page(at.page())
            .and_then(|s| s.bytes().get(at.offset()).copied())
    }

    /// Destroy every page and reset to empty.
    fn clear(&mut self);
}

impl_downcast!(Buffer);

/// State shared by the buffer implementations.
pub(crate) struct BufferCore {
    pub strategy: Strategy,
    pub alloc: AllocRef,
    pub list: PageList,
    pub data_size: usize,
    pub data_revision: u64,
}

impl BufferCore {
    pub fn new(strategy: Strategy, alloc: AllocRef) -> BufferCore {
        BufferCore {
            strategy,
            alloc,
            list: PageList::new(),
            data_size: 0,
            data_revision: 0,
        }
    }

    pub fn bump_revision(&mut self) {
        self.data_revision += 1;
    }

    /// Allocate fresh owned pages totalling up to `len` bytes, in
    /// `page_size` granules (`page_size` 0 means one region for the
    /// whole request). Stops at the first allocation failure; the second
    /// element is the bytes actually obtained.
    pub fn alloc_pages(&self, len: usize) -> (Vec<Page>, usize) {
        let mut pages = Vec::new();
        let mut added = 0;
        while added < len {
            let want = if self.strategy.page_size == 0 {
                len - added
            } else {
                self.strategy.page_size.min(len - added)
            };
            match Region::new_owned(&self.alloc, want) {
                Some(region) => {
                    pages.push(Page::new(region));
                    added += want;
                }
                None => {
                    debug!(
                        "region allocation of {} bytes failed after {} of {} bytes",
                        want, added, len
                    );
                    break;
                }
            }
        }
        (pages, added)
    }

    /// Append fresh capacity at the tail. Returns bytes added.
    pub fn extend_tail(&mut self, len: usize) -> usize {
        let (pages, added) = self.alloc_pages(len);
        for page in pages {
            self.list.push_back(page);
        }
        self.data_size += added;
        added
    }

    /// Prepend fresh capacity at the head, first allocated page first.
    pub fn prepend_head(&mut self, len: usize) -> usize {
        let (pages, added) = self.alloc_pages(len);
        for page in pages.into_iter().rev() {
            self.list.push_front(page);
        }
        self.data_size += added;
        added
    }

    /// Consume up to `len` bytes from the head, destroying drained
    /// pages and advancing the window of a partially drained one.
    pub fn seek_head(&mut self, len: usize) -> usize {
        let mut remaining = len;
        while remaining > 0 {
            let head = self.list.head();
            if head == SENTINEL {
                break;
            }
            let page_len = self.list.get(head).map(|p| p.len()).unwrap_or(0);
            if page_len <= remaining {
                self.list.unlink(head);
                self.data_size -= page_len;
                remaining -= page_len;
            } else {
                self.list.get_mut(head).unwrap().consume_front(remaining);
                self.data_size -= remaining;
                remaining = 0;
            }
        }
        len - remaining
    }

    /// Drop up to `len` bytes from the tail.
    pub fn trim_tail(&mut self, len: usize) -> usize {
        let mut remaining = len;
        while remaining > 0 {
            let tail = self.list.tail();
            if tail == SENTINEL {
                break;
            }
            let page_len = self.list.get(tail).map(|p| p.len()).unwrap_or(0);
            if page_len <= remaining {
                self.list.unlink(tail);
                self.data_size -= page_len;
                remaining -= page_len;
            } else {
                self.list.get_mut(tail).unwrap().trim_back(remaining);
                self.data_size -= remaining;
                remaining = 0;
            }
        }
        len - remaining
    }

    /// Copy `data` into page windows starting at `node`.
    pub fn fill_from(&mut self, mut node: NodeId, data: &[u8]) {
        let mut copied = 0;
        while copied < data.len() && node != SENTINEL {
            let page = self.list.get_mut(node).unwrap();
            let n = page.len().min(data.len() - copied);
            page.write(0, &data[copied..copied + n]);
            copied += n;
            node = self.list.next(node);
        }
        debug_assert_eq!(copied, data.len());
    }

    /// Drop every page.
    pub fn clear_pages(&mut self) {
        self.list.clear();
        self.data_size = 0;
    }
}
