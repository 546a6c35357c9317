//! File-backed buffer.

use std::io;
use std::path::Path;

use crate::alloc::{AllocRef, TrivialAllocator};
use crate::list::SENTINEL;
use crate::page::PageSlice;
use crate::strategy::Strategy;

use super::store::{CloseAction, MmapStore, OpenMode};
use crate::buffer::{Buffer, BufferCore, ByteCursor, PageCursor};

/// FIFO byte buffer whose bytes live in a file, exposed through lazily
/// materialised granule-aligned map windows.
///
/// The page cache always covers one contiguous file range; iteration
/// extends it page by page in either direction. Head and tail
/// operations update the file state first, then drop the whole cache;
/// the next cursor re-materialises on demand. The strategy is fixed:
/// granule page size, clone-on-write, target-bounded fragmentation,
/// inserts rejected.
pub struct MmapBuffer {
    // Declared before the store so cached pages unmap before the file
    // closes.
    core: BufferCore,
    store: MmapStore,
    cache_start: usize,
    cache_end: usize,
}

impl MmapBuffer {
    /// Open `path` with the given mode and close action.
    pub fn open(path: &Path, mode: OpenMode, close_action: CloseAction) -> io::Result<MmapBuffer> {
        Self::open_with_alloc(path, mode, close_action, TrivialAllocator::shared())
    }

    /// Open with a caller-chosen allocator for auxiliary pages.
    pub fn open_with_alloc(
        path: &Path,
        mode: OpenMode,
        close_action: CloseAction,
        alloc: AllocRef,
    ) -> io::Result<MmapBuffer> {
        let store = MmapStore::open(path, mode, close_action)?;
        let head = store.head_offset();
        Ok(MmapBuffer {
            core: BufferCore::new(Strategy::mapped(), alloc),
            store,
            cache_start: head,
            cache_end: head,
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Raw descriptor of the backing file; -1 once closed.
    pub fn fd(&self) -> i32 {
        self.store.fd()
    }

    /// The mode the file was opened with.
    pub fn open_mode(&self) -> OpenMode {
        self.store.mode()
    }

    /// What happens to the file when the buffer goes away.
    pub fn close_action(&self) -> CloseAction {
        self.store.close_action()
    }

    /// Change the close action after construction.
    pub fn set_close_action(&mut self, action: CloseAction) {
        self.store.set_close_action(action);
    }

    /// The generic buffer handle.
    pub fn as_buffer(&mut self) -> &mut dyn Buffer {
        self
    }

    fn purge_pages(&mut self) {
        self.core.clear_pages();
        self.cache_start = self.store.head_offset();
        self.cache_end = self.cache_start;
    }

    /// Materialise the page after the cached range. Returns its node or
    /// the sentinel at EOF.
    fn materialize_back(&mut self) -> u32 {
        match self.store.page_at(self.cache_end) {
            Some(page) => {
                debug_assert_eq!(page.file_offset(), Some(self.cache_end));
                self.cache_end += page.len();
                self.core.list.push_back(page)
            }
            None => SENTINEL,
        }
    }

    /// Materialise the page ending where the cached range begins.
    fn materialize_front(&mut self) -> u32 {
        match self.store.page_before(self.cache_start) {
            Some(page) => {
                debug_assert_eq!(
                    page.file_offset().map(|off| off + page.len()),
                    Some(self.cache_start)
                );
                self.cache_start -= page.len();
                self.core.list.push_front(page)
            }
            None => SENTINEL,
        }
    }

    /// Collect up to `len` bytes of source windows for a gather write.
    fn gather_slices(src: &mut dyn Buffer, len: usize) -> Vec<PageSlice> {
        let mut slices = Vec::new();
        let mut remaining = len;
        let mut cur = src.begin();
        while remaining > 0 && !cur.is_end() {
            let Some(slice) = src.page(cur) else { break };
            let take = slice.len().min(remaining);
            if take > 0 {
                slices.push(slice.truncated(take));
                remaining -= take;
            }
            cur = src.next_page(cur);
        }
        slices
    }
}

impl Buffer for MmapBuffer {
    fn strategy(&self) -> &Strategy {
        &self.core.strategy
    }

    fn data_size(&self) -> usize {
        self.store.data_size()
    }

    fn data_revision(&self) -> u64 {
        self.core.data_revision
    }

    fn extend(&mut self, len: usize) -> usize {
        if self.core.strategy.rejects_extend || len == 0 {
            return 0;
        }
        self.store.grow(len)
    }

    fn rewind(&mut self, len: usize) -> usize {
        if self.core.strategy.rejects_rewind || len == 0 {
            return 0;
        }
        let n = self.store.rewind_head(len);
        if n > 0 {
            self.purge_pages();
            self.core.bump_revision();
        }
        n
    }

    fn seek(&mut self, len: usize) -> usize {
        if self.core.strategy.rejects_seek || len == 0 {
            return 0;
        }
        let n = self.store.advance_head(len);
        if n > 0 {
            self.purge_pages();
            self.core.bump_revision();
        }
        n
    }

    fn trim(&mut self, len: usize) -> usize {
        if self.core.strategy.rejects_trim || len == 0 {
            return 0;
        }
        let n = self.store.truncate_tail(len);
        if n > 0 {
            self.purge_pages();
            self.core.bump_revision();
        }
        n
    }

    fn write(&mut self, data: &[u8]) -> usize {
        if self.core.strategy.rejects_write || data.is_empty() {
            return 0;
        }
        let was_empty = self.store.data_size() == 0;
        let n = self.store.append(data);
        if n > 0 && was_empty {
            // First bytes became visible.
            self.core.bump_revision();
        }
        n
    }

    fn write_buffer(&mut self, src: &mut dyn Buffer, len: usize) -> usize {
        if self.core.strategy.rejects_write || len == 0 {
            return 0;
        }
        let slices = Self::gather_slices(src, len);
        let was_empty = self.store.data_size() == 0;
        let n = self.store.append_gather(&slices);
        if n > 0 && was_empty {
            self.core.bump_revision();
        }
        n
    }

    fn overwrite(&mut self, data: &[u8]) -> usize {
        if self.core.strategy.rejects_overwrite || data.is_empty() || !self.store.writable() {
            return 0;
        }
        // Write through the shared map windows in place.
        let mut written = 0;
        let mut cur = self.begin();
        while written < data.len() && !cur.is_end() {
            let node = cur.node;
            let n = {
                let page = match self.core.list.get_mut(node) {
                    Some(page) => page,
                    None => break,
                };
                let n = page.len().min(data.len() - written);
                page.write(0, &data[written..written + n]);
                n
            };
            written += n;
            cur = self.next_page(cur);
        }
        if written > 0 {
            self.core.bump_revision();
        }
        written
    }

    fn overwrite_buffer(&mut self, src: &mut dyn Buffer, len: usize) -> usize {
        if self.core.strategy.rejects_overwrite || len == 0 || !self.store.writable() {
            return 0;
        }
        let mut written = 0;
        let mut cur = self.begin();
        let mut page_off = 0;
        let mut src_cur = src.begin();
        let mut src_off = 0;
        while written < len && !cur.is_end() && !src_cur.is_end() {
            let Some(slice) = src.page(src_cur) else { break };
            let bytes = slice.bytes();
            if src_off >= bytes.len() {
                src_cur = src.next_page(src_cur);
                src_off = 0;
                continue;
            }
            let page_len = match self.core.list.get(cur.node) {
                Some(page) => page.len(),
                None => break,
            };
            if page_off >= page_len {
                cur = self.next_page(cur);
                page_off = 0;
                continue;
            }
            let n = (bytes.len() - src_off)
                .min(page_len - page_off)
                .min(len - written);
            self.core
                .list
                .get_mut(cur.node)
                .unwrap()
                .write(page_off, &bytes[src_off..src_off + n]);
            written += n;
            page_off += n;
            src_off += n;
        }
        if written > 0 {
            self.core.bump_revision();
        }
        written
    }

    fn insert_data(&mut self, _at: ByteCursor, _data: &[u8]) -> usize {
        // rejects_insert is fixed for this variant
        0
    }

    fn insert_ref(&mut self, _at: ByteCursor, _data: &'static [u8]) -> usize {
        0
    }

    fn insert_buffer(&mut self, _at: ByteCursor, _src: &mut dyn Buffer, _len: usize) -> usize {
        0
    }

    fn begin(&mut self) -> PageCursor {
        // Fill any gap a reverse walk left between the cache and the
        // logical head.
        while self.cache_start > self.store.head_offset() {
            if self.materialize_front() == SENTINEL {
                break;
            }
        }
        if self.core.list.is_empty() {
            return PageCursor::at(self.materialize_back());
        }
        PageCursor::at(self.core.list.head())
    }

    fn next_page(&mut self, at: PageCursor) -> PageCursor {
        if at.is_end() {
            return at;
        }
        if !self.core.list.is_live(at.node) {
            return PageCursor::end();
        }
        let next = self.core.list.next(at.node);
        if next != SENTINEL {
            return PageCursor::at(next);
        }
        PageCursor::at(self.materialize_back())
    }

    fn prev_page(&mut self, at: PageCursor) -> PageCursor {
        if at.is_end() {
            if self.core.list.is_empty() {
                // Seed the cache from the file end for a reverse walk.
                let end = self.store.file_size().max(self.store.head_offset());
                self.cache_start = end;
                self.cache_end = end;
                return PageCursor::at(self.materialize_front());
            }
            return PageCursor::at(self.core.list.tail());
        }
        if !self.core.list.is_live(at.node) {
            return PageCursor::end();
        }
        let prev = self.core.list.prev(at.node);
        if prev != SENTINEL {
            return PageCursor::at(prev);
        }
        PageCursor::at(self.materialize_front())
    }

    fn page(&self, at: PageCursor) -> Option<PageSlice> {
        self.core.list.get(at.node).map(|p| p.slice())
    }

    fn clear(&mut self) {
        let held = self.store.data_size();
        if held > 0 {
            self.store.advance_head(held);
        }
        self.purge_pages();
        self.core.bump_revision();
    }
}
