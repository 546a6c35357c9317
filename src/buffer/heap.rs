//! Heap-backed buffer.

use std::rc::Rc;

use crate::alloc::{AllocRef, TrivialAllocator};
use crate::list::{NodeId, SENTINEL};
use crate::page::Page;
use crate::region::{Region, Responsibility};
use crate::strategy::Strategy;

use super::{Buffer, BufferCore, ByteCursor, PageCursor};

/// FIFO byte buffer over heap-allocated regions.
///
/// The trivial, fully capable buffer variant: every operation of the
/// [`Buffer`] contract is available unless the strategy gates it.
pub struct HeapBuffer {
    core: BufferCore,
}

impl HeapBuffer {
    /// Default strategy, built-in allocator.
    pub fn new() -> HeapBuffer {
        Self::with_strategy_and_alloc(Strategy::default(), TrivialAllocator::shared())
    }

    /// Default allocator, caller-chosen strategy.
    pub fn with_strategy(strategy: Strategy) -> HeapBuffer {
        Self::with_strategy_and_alloc(strategy, TrivialAllocator::shared())
    }

    /// Default strategy, caller-chosen allocator.
    pub fn with_alloc(alloc: AllocRef) -> HeapBuffer {
        Self::with_strategy_and_alloc(Strategy::default(), alloc)
    }

    /// Caller-chosen strategy and allocator.
    pub fn with_strategy_and_alloc(strategy: Strategy, alloc: AllocRef) -> HeapBuffer {
        HeapBuffer {
            core: BufferCore::new(strategy, alloc),
        }
    }

    /// Resolve an insert anchor to the node new content links before
    /// (END means append), splitting the anchor page zero-copy when the
    /// offset falls inside its window. The second element reports
    /// whether a split happened.
    fn resolve_insert_point(&mut self, at: ByteCursor) -> (NodeId, bool) {
        if at.is_end() {
            return (SENTINEL, false);
        }
        let node = at.page().node;
        if !self.core.list.is_live(node) {
            return (SENTINEL, false);
        }
        let len = self.core.list.get(node).unwrap().len();
        let offset = at.offset().min(len);
        if offset == 0 {
            return (node, false);
        }
        if offset == len {
            return (self.core.list.next(node), false);
        }
        // Both halves window the same region.
        let tail_half = self.core.list.get(node).unwrap().transfer(offset, len - offset);
        let tail_node = self.core.list.link_after(node, tail_half);
        self.core.list.get_mut(node).unwrap().trim_back(len - offset);
        (tail_node, true)
    }

    /// Collect pages carrying up to `len` bytes from `src`, honouring
    /// this buffer's clone and fragmentation strategy. Shared pages bump
    /// the source region counts; cloned pages stop early on allocation
    /// failure.
    fn import_pages(&mut self, src: &mut dyn Buffer, len: usize) -> Vec<Page> {
        let cow = self.core.strategy.clone_on_write;
        let fat = self.core.strategy.fragment_as_target;
        let page_size = self.core.strategy.page_size;

        if cow && fat {
            return self.copy_bulk(src, len);
        }

        let mut out = Vec::new();
        let mut remaining = len;
        let mut cur = src.begin();
        while remaining > 0 && !cur.is_end() {
            let Some(slice) = src.page(cur) else { break };
            let take = slice.len().min(remaining);
            if take == 0 {
                cur = src.next_page(cur);
                continue;
            }
            if !cow {
                // Share the source region, window trimmed to the take.
                let bound = if fat && page_size > 0 { page_size } else { take };
                let off = slice.region_offset();
                let mut done = 0;
                while done < take {
                    let n = bound.min(take - done);
                    out.push(Page::with_window(Rc::clone(slice.region()), off + done, n));
                    done += n;
                }
            } else {
                // Clone preserving source fragmentation.
                let Some(region) = Region::new_owned(&self.core.alloc, take) else {
                    debug!("cross-buffer clone of {} bytes failed", take);
                    break;
                };
                let mut page = Page::new(region);
                page.write(0, &slice.bytes()[..take]);
                out.push(page);
            }
            remaining -= take;
            cur = src.next_page(cur);
        }
        out
    }

    /// Clone up to `len` bytes from `src` into fresh pages bounded by
    /// this buffer's `page_size`, coalescing source fragments.
    fn copy_bulk(&mut self, src: &mut dyn Buffer, len: usize) -> Vec<Page> {
        let total = src.data_size().min(len);
        let (mut pages, added) = self.core.alloc_pages(total);

        let mut cur = src.begin();
        let mut src_off = 0;
        let mut want = added;
        'fill: for page in pages.iter_mut() {
            let mut page_off = 0;
            while page_off < page.len() && want > 0 {
                if cur.is_end() {
                    break 'fill;
                }
                let Some(slice) = src.page(cur) else { break 'fill };
                let bytes = slice.bytes();
                if src_off >= bytes.len() {
                    cur = src.next_page(cur);
                    src_off = 0;
                    continue;
                }
                let n = (bytes.len() - src_off)
                    .min(page.len() - page_off)
                    .min(want);
                page.write(page_off, &bytes[src_off..src_off + n]);
                page_off += n;
                src_off += n;
                want -= n;
            }
        }
        pages
    }

    /// Link imported pages before `anchor` in order, accounting their
    /// bytes. Returns the byte total.
    fn link_pages_before(&mut self, anchor: NodeId, pages: Vec<Page>) -> usize {
        let mut total = 0;
        for page in pages {
            total += page.len();
            self.core.list.link_before(anchor, page);
        }
        self.core.data_size += total;
        total
    }

    /// Replace a shared or non-owned region with a fresh owned copy of
    /// the window, so aliased consumers keep their bytes.
    fn make_exclusive(&mut self, node: NodeId) -> bool {
        let (needs_copy, len) = {
            let page = self.core.list.get(node).unwrap();
            let region = page.region();
            (
                Region::is_shared(region) || region.responsibility() != Responsibility::Owned,
                page.len(),
            )
        };
        if !needs_copy {
            return true;
        }
        let Some(region) = Region::new_owned(&self.core.alloc, len) else {
            debug!("copy-before-write allocation of {} bytes failed", len);
            return false;
        };
        let mut fresh = Page::new(region);
        let page = self.core.list.get_mut(node).unwrap();
        fresh.write(0, page.bytes());
        *page = fresh;
        true
    }
}

impl Default for HeapBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Buffer for HeapBuffer {
    fn strategy(&self) -> &Strategy {
        &self.core.strategy
    }

    fn data_size(&self) -> usize {
        self.core.data_size
    }

    fn data_revision(&self) -> u64 {
        self.core.data_revision
    }

    fn extend(&mut self, len: usize) -> usize {
        if self.core.strategy.rejects_extend || len == 0 {
            return 0;
        }
        self.core.extend_tail(len)
    }

    fn rewind(&mut self, len: usize) -> usize {
        if self.core.strategy.rejects_rewind || len == 0 {
            return 0;
        }
        let added = self.core.prepend_head(len);
        if added > 0 {
            self.core.bump_revision();
        }
        added
    }

    fn seek(&mut self, len: usize) -> usize {
        if self.core.strategy.rejects_seek || len == 0 {
            return 0;
        }
        let consumed = self.core.seek_head(len);
        if consumed > 0 {
            self.core.bump_revision();
        }
        consumed
    }

    fn trim(&mut self, len: usize) -> usize {
        if self.core.strategy.rejects_trim || len == 0 {
            return 0;
        }
        let dropped = self.core.trim_tail(len);
        if dropped > 0 {
            self.core.bump_revision();
        }
        dropped
    }

    fn write(&mut self, data: &[u8]) -> usize {
        if self.core.strategy.rejects_write || data.is_empty() {
            return 0;
        }
        let old_tail = self.core.list.tail();
        let added = self.core.extend_tail(data.len());
        let start = if old_tail == SENTINEL {
            self.core.list.head()
        } else {
            self.core.list.next(old_tail)
        };
        self.core.fill_from(start, &data[..added]);
        added
    }

    fn write_buffer(&mut self, src: &mut dyn Buffer, len: usize) -> usize {
        if self.core.strategy.rejects_write || len == 0 {
            return 0;
        }
        let pages = self.import_pages(src, len);
        self.link_pages_before(SENTINEL, pages)
    }

    fn overwrite(&mut self, data: &[u8]) -> usize {
        if self.core.strategy.rejects_overwrite || data.is_empty() {
            return 0;
        }
        let mut written = 0;
        let mut node = self.core.list.head();
        while written < data.len() && node != SENTINEL {
            if !self.make_exclusive(node) {
                break;
            }
            let page = self.core.list.get_mut(node).unwrap();
            let n = page.len().min(data.len() - written);
            page.write(0, &data[written..written + n]);
            written += n;
            node = self.core.list.next(node);
        }
        if written > 0 {
            self.core.bump_revision();
        }
        written
    }

    fn overwrite_buffer(&mut self, src: &mut dyn Buffer, len: usize) -> usize {
        if self.core.strategy.rejects_overwrite || len == 0 {
            return 0;
        }
        let mut written = 0;
        let mut node = self.core.list.head();
        let mut page_off = 0;
        let mut cur = src.begin();
        let mut src_off = 0;
        while written < len && node != SENTINEL && !cur.is_end() {
            let Some(slice) = src.page(cur) else { break };
            let bytes = slice.bytes();
            if src_off >= bytes.len() {
                cur = src.next_page(cur);
                src_off = 0;
                continue;
            }
            if !self.make_exclusive(node) {
                break;
            }
            let page = self.core.list.get_mut(node).unwrap();
            if page_off >= page.len() {
                node = self.core.list.next(node);
                page_off = 0;
                continue;
            }
            let n = (bytes.len() - src_off)
                .min(page.len() - page_off)
                .min(len - written);
            page.write(page_off, &bytes[src_off..src_off + n]);
            written += n;
            page_off += n;
            src_off += n;
        }
        if written > 0 {
            self.core.bump_revision();
        }
        written
    }

    fn insert_data(&mut self, at: ByteCursor, data: &[u8]) -> usize {
        if self.core.strategy.rejects_insert || data.is_empty() {
            return 0;
        }
        let (anchor, split) = self.resolve_insert_point(at);
        let (pages, added) = self.core.alloc_pages(data.len());
        let mut copied = 0;
        for mut page in pages {
            let n = page.len();
            page.write(0, &data[copied..copied + n]);
            copied += n;
            self.core.data_size += n;
            self.core.list.link_before(anchor, page);
        }
        debug_assert_eq!(copied, added);
        if added > 0 || split {
            self.core.bump_revision();
        }
        added
    }

    fn insert_ref(&mut self, at: ByteCursor, data: &'static [u8]) -> usize {
        if self.core.strategy.rejects_insert || data.is_empty() {
            return 0;
        }
        let (anchor, _) = self.resolve_insert_point(at);
        let page = Page::new(Region::new_referenced(data));
        self.core.data_size += data.len();
        self.core.list.link_before(anchor, page);
        self.core.bump_revision();
        data.len()
    }

    fn insert_buffer(&mut self, at: ByteCursor, src: &mut dyn Buffer, len: usize) -> usize {
        if self.core.strategy.rejects_insert || len == 0 {
            return 0;
        }
        let (anchor, split) = self.resolve_insert_point(at);
        let pages = self.import_pages(src, len);
        let added = self.link_pages_before(anchor, pages);
        if added > 0 || split {
            self.core.bump_revision();
        }
        added
    }

    fn begin(&mut self) -> PageCursor {
        PageCursor::at(self.core.list.head())
    }

    fn next_page(&mut self, at: PageCursor) -> PageCursor {
        if at.is_end() {
            return at;
        }
        PageCursor::at(self.core.list.next(at.node))
    }

    fn prev_page(&mut self, at: PageCursor) -> PageCursor {
        PageCursor::at(self.core.list.prev(at.node))
    }

    fn page(&self, at: PageCursor) -> Option<crate::page::PageSlice> {
        self.core.list.get(at.node).map(|p| p.slice())
    }

    fn clear(&mut self) {
        self.core.clear_pages();
        self.core.bump_revision();
    }
}
