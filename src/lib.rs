//! Fragment-tolerant byte buffers for non-blocking, event-driven I/O.
//!
//! `pagebuf` presents an arbitrarily fragmented sequence of bytes, as
//! produced piecewise by network reads or similar sources, as a single
//! contiguous FIFO byte stream, while minimising copies, preserving
//! zero-copy semantics across buffers, and permitting in-place
//! structural edits.
//!
//! The crate is built from these parts:
//! * [Regions](Region): reference-counted contiguous byte ranges, either
//!   owned through a pluggable [allocator](Allocator), borrowed from the
//!   caller, or windowed over a memory-mapped file.
//! * Pages: mutable windows into regions, linked into a buffer's page
//!   list. Splitting and cross-buffer sharing are region-refcount
//!   operations, never copies.
//! * [Buffers](Buffer): the FIFO contract
//!   (write/insert/overwrite/read/seek/trim/rewind/extend/reserve plus
//!   bidirectional page and byte cursors) with a heap-backed
//!   implementation ([`HeapBuffer`]) and, on Unix, a file-backed one
//!   (`MmapBuffer`) over lazily materialised granule-aligned map
//!   windows.
//! * Readers: a sequential [`DataReader`] and an incremental
//!   [`LineReader`], both detecting intrusive buffer mutation through
//!   the buffer's revision counter.
//!
//! A buffer is owned by one thread at a time; region sharing uses
//! non-atomic refcounts and is `!Send` by construction.

#[macro_use]
extern crate log;

pub mod alloc;
mod buffer;
pub mod constants;
mod list;
mod page;
mod reader;
mod region;
mod strategy;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod mmap;
        pub use crate::mmap::{CloseAction, MmapBuffer, OpenMode};
    }
}

#[cfg(all(test, unix))]
mod test_util;

pub use crate::alloc::{AllocKind, AllocRef, Allocator, TrivialAllocator};
pub use crate::buffer::{Buffer, ByteCursor, HeapBuffer, PageCursor};
pub use crate::page::PageSlice;
pub use crate::reader::{DataReader, LineReader};
pub use crate::region::{Region, Responsibility};
pub use crate::strategy::Strategy;
