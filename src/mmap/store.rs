//! File-backed region store.
//!
//! The store owns one file and a cache of granule-aligned map windows
//! over it, keyed by aligned file offset. Windows are materialised
//! lazily and shared as regions; a window the file has outgrown is
//! retired from the cache but stays mapped until the last page
//! referencing it drops, so outstanding views keep their bytes.
//!
//! The `head_offset` is the logical seek point: bytes in front of it
//! have been consumed and are no longer part of the buffer, although
//! they remain in the file until it is truncated or removed.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::constants::{MAP_GRANULE, MAX_GATHER_RANGES};
use crate::page::{Page, PageSlice};
use crate::region::{Region, RegionRef};

use super::sys;

/// How the backing file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read-only. Map windows are read-only and writes are rejected.
    Read,
    /// Read-write, preserving existing bytes. Writes append.
    Append,
    /// Read-write, truncating the file to zero on open.
    Overwrite,
}

/// What happens to the backing file when the buffer goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    /// Leave the file on disk.
    Retain,
    /// Unlink the file before closing the descriptor.
    Remove,
}

const CLOSED: i32 = -1;

fn granule_floor(offset: usize) -> usize {
    offset & !(MAP_GRANULE - 1)
}

pub(crate) struct MmapStore {
    path: PathBuf,
    fd: i32,
    head_offset: usize,
    map: HashMap<usize, RegionRef>,
    mode: OpenMode,
    close_action: CloseAction,
}

impl MmapStore {
    pub fn open(path: &Path, mode: OpenMode, close_action: CloseAction) -> io::Result<MmapStore> {
        let flags = match mode {
            OpenMode::Read => libc::O_RDONLY,
            OpenMode::Append => libc::O_RDWR | libc::O_CREAT | libc::O_APPEND,
            OpenMode::Overwrite => {
                libc::O_RDWR | libc::O_CREAT | libc::O_APPEND | libc::O_TRUNC
            }
        };
        let fd = sys::open(path, flags, 0o660)?;
        trace!("opened {} ({:?}) as fd {}", path.display(), mode, fd);
        Ok(MmapStore {
            path: path.to_path_buf(),
            fd,
            head_offset: 0,
            map: HashMap::new(),
            mode,
            close_action,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fd(&self) -> i32 {
        self.fd
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn close_action(&self) -> CloseAction {
        self.close_action
    }

    pub fn set_close_action(&mut self, action: CloseAction) {
        self.close_action = action;
    }

    pub fn is_open(&self) -> bool {
        self.fd != CLOSED
    }

    pub fn writable(&self) -> bool {
        self.is_open() && self.mode != OpenMode::Read
    }

    pub fn head_offset(&self) -> usize {
        self.head_offset
    }

    /// File length as the filesystem reports it; 0 when closed or on
    /// error.
    pub fn file_size(&self) -> usize {
        if !self.is_open() {
            return 0;
        }
        match sys::file_size(self.fd) {
            Ok(size) => size,
            Err(e) => {
                debug!("fstat of {} failed: {}", self.path.display(), e);
                0
            }
        }
    }

    /// Bytes the buffer logically holds.
    pub fn data_size(&self) -> usize {
        self.file_size().saturating_sub(self.head_offset)
    }

    /// The current mapping for the granule at `aligned`, creating or
    /// refreshing it as needed. A short mapping the file has outgrown is
    /// retired from the cache; its refcount-driven teardown still unmaps
    /// it once the last page drops.
    fn region_at(&mut self, aligned: usize, file_size: usize) -> Option<RegionRef> {
        debug_assert_eq!(aligned % MAP_GRANULE, 0);
        let avail = file_size.checked_sub(aligned)?.min(MAP_GRANULE);
        if avail == 0 {
            return None;
        }
        if let Some(region) = self.map.get(&aligned) {
            if region.len() >= avail {
                return Some(Rc::clone(region));
            }
            trace!(
                "retiring short window at offset {}: {} < {} bytes",
                aligned,
                region.len(),
                avail
            );
            self.map.remove(&aligned);
        }
        let base = match sys::map(self.fd, aligned, avail, self.mode != OpenMode::Read) {
            Ok(base) => base,
            Err(e) => {
                debug!("mmap of {} bytes at offset {} failed: {}", avail, aligned, e);
                return None;
            }
        };
        trace!("mapped {} byte window at offset {}", avail, aligned);
        let region = Region::new_mapped(base, avail, aligned);
        self.map.insert(aligned, Rc::clone(&region));
        Some(region)
    }

    /// Page covering the file bytes from `file_offset` to the end of
    /// its granule window, or `None` at EOF.
    pub fn page_at(&mut self, file_offset: usize) -> Option<Page> {
        if !self.is_open() {
            return None;
        }
        let file_size = self.file_size();
        if file_offset >= file_size {
            return None;
        }
        let aligned = granule_floor(file_offset);
        let region = self.region_at(aligned, file_size)?;
        let off = file_offset - aligned;
        let len = region.len() - off;
        Some(Page::with_window(region, off, len))
    }

    /// Page ending exactly at `file_end`, or `None` when no unconsumed
    /// bytes precede it.
    pub fn page_before(&mut self, file_end: usize) -> Option<Page> {
        if !self.is_open() {
            return None;
        }
        let file_end = file_end.min(self.file_size());
        if file_end <= self.head_offset {
            return None;
        }
        let file_size = self.file_size();
        let aligned = granule_floor(file_end - 1);
        let region = self.region_at(aligned, file_size)?;
        let start = aligned.max(self.head_offset);
        Some(Page::with_window(region, start - aligned, file_end - start))
    }

    /// Grow the file by `len` bytes of zero fill.
    pub fn grow(&mut self, len: usize) -> usize {
        if !self.writable() || len == 0 {
            return 0;
        }
        let size = self.file_size();
        match sys::truncate(self.fd, size + len) {
            Ok(()) => len,
            Err(e) => {
                debug!("growing {} by {} bytes failed: {}", self.path.display(), len, e);
                0
            }
        }
    }

    /// Truncate up to `len` bytes off the file tail, retiring every
    /// window that would reach past the new end first.
    pub fn truncate_tail(&mut self, len: usize) -> usize {
        if !self.writable() || len == 0 {
            return 0;
        }
        let n = len.min(self.data_size());
        if n == 0 {
            return 0;
        }
        let new_size = self.file_size() - n;
        self.map
            .retain(|aligned, region| aligned + region.len() <= new_size);
        match sys::truncate(self.fd, new_size) {
            Ok(()) => n,
            Err(e) => {
                debug!(
                    "truncating {} to {} bytes failed: {}",
                    self.path.display(),
                    new_size,
                    e
                );
                0
            }
        }
    }

    /// Consume up to `len` bytes from the logical head, dropping fully
    /// consumed windows from the cache.
    pub fn advance_head(&mut self, len: usize) -> usize {
        let n = len.min(self.data_size());
        if n == 0 {
            return 0;
        }
        self.head_offset += n;
        let head = self.head_offset;
        self.map.retain(|aligned, region| aligned + region.len() > head);
        n
    }

    /// Move the logical head back towards the file start, re-exposing
    /// previously consumed bytes.
    pub fn rewind_head(&mut self, len: usize) -> usize {
        let n = len.min(self.head_offset);
        self.head_offset -= n;
        n
    }

    /// Append through `write(2)`; the descriptor is in append mode.
    pub fn append(&mut self, data: &[u8]) -> usize {
        if !self.writable() || data.is_empty() {
            return 0;
        }
        let mut written = 0;
        while written < data.len() {
            match sys::write(self.fd, &data[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(e) => {
                    debug!(
                        "append of {} bytes failed after {}: {}",
                        data.len(),
                        written,
                        e
                    );
                    break;
                }
            }
        }
        written
    }

    /// Append a batch of page windows through one scatter write per
    /// 1024 ranges.
    pub fn append_gather(&mut self, slices: &[PageSlice]) -> usize {
        if !self.writable() || slices.is_empty() {
            return 0;
        }
        let mut written = 0;
        for batch in slices.chunks(MAX_GATHER_RANGES) {
            let mut ranges = Vec::with_capacity(batch.len());
            let mut total = 0;
            for slice in batch {
                ranges.push(libc::iovec {
                    iov_base: slice.as_ptr() as *mut libc::c_void,
                    iov_len: slice.len(),
                });
                total += slice.len();
            }
            match sys::write_gather(self.fd, &ranges) {
                Ok(n) => {
                    written += n;
                    if n < total {
                        break;
                    }
                }
                Err(e) => {
                    debug!("gather write failed after {} bytes: {}", written, e);
                    break;
                }
            }
        }
        written
    }

    /// Unlink if configured, then close the descriptor. Idempotent.
    pub fn close(&mut self) {
        if !self.is_open() {
            return;
        }
        self.map.clear();
        if self.close_action == CloseAction::Remove {
            if let Err(e) = sys::unlink(&self.path) {
                warn!("unlink of {} failed: {}", self.path.display(), e);
            }
        }
        if let Err(e) = sys::close(self.fd) {
            warn!("close of fd {} failed: {}", self.fd, e);
        }
        self.fd = CLOSED;
    }
}

impl Drop for MmapStore {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{temp_path, with_cleanup};

    #[test]
    fn windows_are_cached_per_granule() {
        let path = temp_path("store-cache");
        let cleanup_path = path.clone();
        with_cleanup(
            move || {
                let mut store =
                    MmapStore::open(&path, OpenMode::Overwrite, CloseAction::Retain).unwrap();
                store.append(&[7u8; MAP_GRANULE + 16]);

                let first = store.page_at(0).unwrap();
                let again = store.page_at(16).unwrap();
                assert!(Rc::ptr_eq(first.region(), again.region()));
                assert_eq!(first.len(), MAP_GRANULE);
                assert_eq!(again.len(), MAP_GRANULE - 16);

                let second = store.page_at(MAP_GRANULE).unwrap();
                assert!(!Rc::ptr_eq(first.region(), second.region()));
                assert_eq!(second.len(), 16);
            },
            move || {
                let _ = std::fs::remove_file(&cleanup_path);
            },
        );
    }

    #[test]
    fn short_window_is_refreshed_when_the_file_grows() {
        let path = temp_path("store-grow");
        let cleanup_path = path.clone();
        with_cleanup(
            move || {
                let mut store =
                    MmapStore::open(&path, OpenMode::Overwrite, CloseAction::Retain).unwrap();
                store.append(&[1u8; 100]);

                let short = store.page_at(0).unwrap();
                assert_eq!(short.len(), 100);
                let stale_region = Rc::clone(short.region());

                store.append(&[2u8; 100]);
                let fresh = store.page_at(0).unwrap();
                assert_eq!(fresh.len(), 200);
                assert!(!Rc::ptr_eq(fresh.region(), &stale_region));

                // The retired window keeps serving its old bytes.
                assert_eq!(short.bytes(), &[1u8; 100][..]);
            },
            move || {
                let _ = std::fs::remove_file(&cleanup_path);
            },
        );
    }

    #[test]
    fn head_advance_is_monotone_and_bounded() {
        let path = temp_path("store-head");
        let cleanup_path = path.clone();
        with_cleanup(
            move || {
                let mut store =
                    MmapStore::open(&path, OpenMode::Overwrite, CloseAction::Retain).unwrap();
                store.append(&[0u8; 64]);

                assert_eq!(store.advance_head(40), 40);
                assert_eq!(store.data_size(), 24);
                assert_eq!(store.advance_head(100), 24);
                assert_eq!(store.data_size(), 0);
                assert_eq!(store.rewind_head(1000), 64);
                assert_eq!(store.data_size(), 64);
            },
            move || {
                let _ = std::fs::remove_file(&cleanup_path);
            },
        );
    }

    #[test]
    fn read_mode_rejects_mutation() {
        let path = temp_path("store-rdonly");
        let cleanup_path = path.clone();
        with_cleanup(
            move || {
                std::fs::write(&path, b"fixed content").unwrap();
                let mut store =
                    MmapStore::open(&path, OpenMode::Read, CloseAction::Retain).unwrap();

                assert_eq!(store.append(b"nope"), 0);
                assert_eq!(store.grow(16), 0);
                assert_eq!(store.truncate_tail(4), 0);
                assert_eq!(store.data_size(), 13);
                assert_eq!(store.page_at(0).unwrap().bytes(), b"fixed content");
            },
            move || {
                let _ = std::fs::remove_file(&cleanup_path);
            },
        );
    }

    #[test]
    fn closed_store_reads_as_empty() {
        let path = temp_path("store-closed");
        let cleanup_path = path.clone();
        with_cleanup(
            move || {
                let mut store =
                    MmapStore::open(&path, OpenMode::Overwrite, CloseAction::Retain).unwrap();
                store.append(b"bytes");
                store.close();

                assert!(!store.is_open());
                assert_eq!(store.data_size(), 0);
                assert_eq!(store.append(b"more"), 0);
                assert!(store.page_at(0).is_none());
            },
            move || {
                let _ = std::fs::remove_file(&cleanup_path);
            },
        );
    }

    #[test]
    fn remove_action_unlinks_on_close() {
        let path = temp_path("store-remove");
        let cleanup_path = path.clone();
        with_cleanup(
            move || {
                let mut store =
                    MmapStore::open(&path, OpenMode::Overwrite, CloseAction::Remove).unwrap();
                store.append(b"temporary");
                assert!(path.exists());
                store.close();
                assert!(!path.exists());
            },
            move || {
                let _ = std::fs::remove_file(&cleanup_path);
            },
        );
    }
}
