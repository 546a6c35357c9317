//! Heap buffer behaviour across the public contract.

use pagebuf::{Buffer, ByteCursor, HeapBuffer, Strategy};

fn page_windows(buf: &mut HeapBuffer) -> Vec<Vec<u8>> {
    let mut windows = Vec::new();
    let mut cur = buf.begin();
    while !cur.is_end() {
        windows.push(buf.page(cur).unwrap().bytes().to_vec());
        cur = buf.next_page(cur);
    }
    windows
}

fn page_size_sum(buf: &mut HeapBuffer) -> usize {
    let mut total = 0;
    let mut cur = buf.begin();
    while !cur.is_end() {
        total += buf.page(cur).unwrap().len();
        cur = buf.next_page(cur);
    }
    total
}

#[test]
fn basic_fifo() {
    let mut buf = HeapBuffer::new();
    assert_eq!(buf.write(b"abcd"), 4);
    assert_eq!(buf.data_size(), 4);

    let mut out = [0u8; 4];
    assert_eq!(buf.read(&mut out), 4);
    assert_eq!(&out, b"abcd");
    // read is non-destructive
    assert_eq!(buf.data_size(), 4);

    assert_eq!(buf.seek(2), 2);
    assert_eq!(buf.data_size(), 2);
    let mut out = [0u8; 2];
    assert_eq!(buf.read(&mut out), 2);
    assert_eq!(&out, b"cd");
}

#[test]
fn fragmented_write_bounds_page_windows() {
    let mut buf = HeapBuffer::with_strategy(Strategy::default().page_size(2));
    assert_eq!(buf.write(b"helloworld"), 10);
    assert_eq!(buf.data_size(), 10);
    assert_eq!(
        page_windows(&mut buf),
        vec![
            b"he".to_vec(),
            b"ll".to_vec(),
            b"ow".to_vec(),
            b"or".to_vec(),
            b"ld".to_vec()
        ]
    );
}

#[test]
fn data_size_always_equals_window_sum() {
    let mut buf = HeapBuffer::with_strategy(Strategy::default().page_size(3));
    buf.write(b"0123456789");
    assert_eq!(page_size_sum(&mut buf), buf.data_size());
    buf.seek(4);
    assert_eq!(page_size_sum(&mut buf), buf.data_size());
    buf.trim(2);
    assert_eq!(page_size_sum(&mut buf), buf.data_size());
    buf.insert_data(ByteCursor::end(), b"xy");
    assert_eq!(page_size_sum(&mut buf), buf.data_size());
    buf.clear();
    assert_eq!(page_size_sum(&mut buf), 0);
    assert_eq!(buf.data_size(), 0);
}

#[test]
fn pure_append_never_changes_the_revision() {
    let mut buf = HeapBuffer::new();
    let rev = buf.data_revision();
    buf.write(b"one");
    buf.write(b"two");
    buf.extend(16);
    let mut out = [0u8; 6];
    buf.read(&mut out);
    assert_eq!(buf.data_revision(), rev);
}

#[test]
fn intrusive_mutation_strictly_increases_the_revision() {
    let mut buf = HeapBuffer::new();
    buf.write(b"0123456789");

    let mut last = buf.data_revision();
    assert_eq!(buf.seek(1), 1);
    assert!(buf.data_revision() > last);
    last = buf.data_revision();

    assert_eq!(buf.trim(1), 1);
    assert!(buf.data_revision() > last);
    last = buf.data_revision();

    assert!(buf.rewind(4) > 0);
    assert!(buf.data_revision() > last);
    last = buf.data_revision();

    assert_eq!(buf.overwrite(b"zz"), 2);
    assert!(buf.data_revision() > last);
    last = buf.data_revision();

    buf.clear();
    assert!(buf.data_revision() > last);
}

#[test]
fn zero_length_shrinks_do_not_bump_the_revision() {
    let mut buf = HeapBuffer::new();
    buf.write(b"abc");
    let rev = buf.data_revision();
    assert_eq!(buf.seek(0), 0);
    assert_eq!(buf.trim(0), 0);
    assert_eq!(buf.rewind(0), 0);
    assert_eq!(buf.data_revision(), rev);
}

#[test]
fn zero_copy_cross_buffer_write() {
    let mut src = HeapBuffer::new();
    let mut dst = HeapBuffer::new();
    src.write(b"ZZZZ");

    assert_eq!(dst.write_buffer(&mut src, 4), 4);
    assert_eq!(src.data_size(), 4);
    assert_eq!(dst.data_size(), 4);

    // Overwriting the source replaces its aliased region first, so the
    // destination keeps the original bytes.
    assert_eq!(src.overwrite(b"AAAA"), 4);
    let mut out = [0u8; 4];
    src.read(&mut out);
    assert_eq!(&out, b"AAAA");
    dst.read(&mut out);
    assert_eq!(&out, b"ZZZZ");
}

#[test]
fn cross_buffer_write_respects_the_length_cap() {
    let mut src = HeapBuffer::with_strategy(Strategy::default().page_size(2));
    let mut dst = HeapBuffer::new();
    src.write(b"abcdef");

    assert_eq!(dst.write_buffer(&mut src, 3), 3);
    assert_eq!(dst.data_size(), 3);
    let mut out = [0u8; 3];
    dst.read(&mut out);
    assert_eq!(&out, b"abc");
    // source untouched
    assert_eq!(src.data_size(), 6);
}

#[test]
fn fragment_as_target_rebounds_shared_windows() {
    let mut src = HeapBuffer::new();
    src.write(b"0123456789");

    let strategy = Strategy::default().page_size(3).fragment_as_target(true);
    let mut dst = HeapBuffer::with_strategy(strategy);
    assert_eq!(dst.write_buffer(&mut src, 10), 10);
    assert_eq!(
        page_windows(&mut dst),
        vec![
            b"012".to_vec(),
            b"345".to_vec(),
            b"678".to_vec(),
            b"9".to_vec()
        ]
    );
}

#[test]
fn clone_on_write_copies_instead_of_sharing() {
    let mut src = HeapBuffer::new();
    src.write(b"shared?");

    let mut dst = HeapBuffer::with_strategy(Strategy::default().clone_on_write(true));
    assert_eq!(dst.write_buffer(&mut src, 7), 7);

    // The clone is independent: overwriting the source in place leaves
    // the destination alone even without a copy-before-write.
    src.overwrite(b"changed");
    let mut out = [0u8; 7];
    dst.read(&mut out);
    assert_eq!(&out, b"shared?");
}

#[test]
fn insert_at_a_page_split() {
    let mut buf = HeapBuffer::new();
    buf.write(b"ABEF");

    let first = buf.begin();
    assert_eq!(buf.insert_data(ByteCursor::new(first, 2), b"CD"), 2);
    assert_eq!(buf.data_size(), 6);

    let mut out = [0u8; 6];
    assert_eq!(buf.read(&mut out), 6);
    assert_eq!(&out, b"ABCDEF");
}

#[test]
fn insert_at_end_appends() {
    let mut buf = HeapBuffer::new();
    buf.write(b"head");
    assert_eq!(buf.insert_data(ByteCursor::end(), b"tail"), 4);

    let mut out = [0u8; 8];
    assert_eq!(buf.read(&mut out), 8);
    assert_eq!(&out, b"headtail");
}

#[test]
fn insert_at_offset_zero_links_before_the_anchor() {
    let mut buf = HeapBuffer::new();
    buf.write(b"world");
    let first = buf.begin();
    assert_eq!(buf.insert_data(ByteCursor::new(first, 0), b"hello "), 6);

    let mut out = [0u8; 11];
    assert_eq!(buf.read(&mut out), 11);
    assert_eq!(&out, b"hello world");
}

#[test]
fn insert_ref_shares_static_bytes() {
    static GREETING: &[u8] = b"static bytes";
    let mut buf = HeapBuffer::new();
    assert_eq!(buf.insert_ref(ByteCursor::end(), GREETING), 12);
    assert_eq!(buf.data_size(), 12);

    let mut out = [0u8; 12];
    buf.read(&mut out);
    assert_eq!(&out, GREETING);
}

#[test]
fn insert_buffer_splices_between_halves() {
    let mut src = HeapBuffer::new();
    src.write(b"--");
    let mut buf = HeapBuffer::new();
    buf.write(b"ab");

    let first = buf.begin();
    assert_eq!(buf.insert_buffer(ByteCursor::new(first, 1), &mut src, 2), 2);
    let mut out = [0u8; 4];
    assert_eq!(buf.read(&mut out), 4);
    assert_eq!(&out, b"a--b");
}

#[test]
fn seek_consumes_at_most_the_held_bytes() {
    let mut buf = HeapBuffer::new();
    buf.write(b"abc");
    assert_eq!(buf.seek(10), 3);
    assert_eq!(buf.data_size(), 0);
    assert_eq!(buf.seek(1), 0);
}

#[test]
fn interleaved_writes_read_back_contiguously() {
    let mut buf = HeapBuffer::with_strategy(Strategy::default().page_size(4));
    let parts: [&[u8]; 4] = [b"frag", b"mented", b"", b"stream"];
    let mut expected = Vec::new();
    for part in parts {
        buf.write(part);
        expected.extend_from_slice(part);
    }
    let mut out = vec![0u8; expected.len()];
    assert_eq!(buf.read(&mut out), expected.len());
    assert_eq!(out, expected);
}

#[test]
fn rewind_prepends_writable_capacity() {
    let mut buf = HeapBuffer::new();
    buf.write(b"body");
    assert_eq!(buf.rewind(4), 4);
    assert_eq!(buf.data_size(), 8);

    // The fresh head bytes are uninitialised until overwritten.
    assert_eq!(buf.overwrite(b"head"), 4);
    let mut out = [0u8; 8];
    assert_eq!(buf.read(&mut out), 8);
    assert_eq!(&out, b"headbody");
}

#[test]
fn reserve_extends_only_the_shortfall() {
    let mut buf = HeapBuffer::with_strategy(Strategy::default().page_size(8));
    buf.write(b"12345");
    assert_eq!(buf.reserve(12), 7);
    assert_eq!(buf.data_size(), 12);
    assert_eq!(buf.reserve(10), 0);
    assert_eq!(buf.data_size(), 12);
}

#[test]
fn byte_cursors_walk_both_directions() {
    let mut buf = HeapBuffer::with_strategy(Strategy::default().page_size(2));
    buf.write(b"abcd");

    let mut collected = Vec::new();
    let mut cur = buf.begin_bytes();
    while !cur.is_end() {
        collected.push(buf.byte(cur).unwrap());
        cur = buf.next_byte(cur);
    }
    assert_eq!(collected, b"abcd");

    // walk back from END
    let mut collected_rev = Vec::new();
    let mut cur = ByteCursor::end();
    loop {
        cur = buf.prev_byte(cur);
        if cur.is_end() {
            break;
        }
        collected_rev.push(buf.byte(cur).unwrap());
    }
    assert_eq!(collected_rev, b"dcba");
}

#[test]
fn page_cursors_compare_by_position() {
    let mut buf = HeapBuffer::new();
    buf.write(b"x");
    assert_eq!(buf.begin(), buf.begin());
    assert_eq!(buf.end(), buf.end());
    assert_ne!(buf.begin(), buf.end());
    let first = buf.begin();
    assert_eq!(buf.next_page(first), buf.end());
}

#[test]
fn overwrite_never_grows_the_buffer() {
    let mut buf = HeapBuffer::new();
    buf.write(b"abc");
    assert_eq!(buf.overwrite(b"defghi"), 3);
    assert_eq!(buf.data_size(), 3);
    let mut out = [0u8; 3];
    buf.read(&mut out);
    assert_eq!(&out, b"def");
}

#[test]
fn overwrite_buffer_walks_both_page_lists() {
    let mut src = HeapBuffer::with_strategy(Strategy::default().page_size(2));
    src.write(b"XYZXYZ");
    let mut buf = HeapBuffer::with_strategy(Strategy::default().page_size(3));
    buf.write(b"aaaaaaaa");

    assert_eq!(buf.overwrite_buffer(&mut src, 6), 6);
    let mut out = [0u8; 8];
    buf.read(&mut out);
    assert_eq!(&out, b"XYZXYZaa");
}

#[test]
fn strategy_gates_reject_without_state_change() {
    let strategy = Strategy::default()
        .rejects_extend(true)
        .rejects_rewind(true)
        .rejects_trim(true)
        .rejects_overwrite(true);
    let mut buf = HeapBuffer::with_strategy(strategy);
    buf.write(b"kept");
    let rev = buf.data_revision();

    assert_eq!(buf.extend(8), 0);
    assert_eq!(buf.rewind(8), 0);
    assert_eq!(buf.trim(2), 0);
    assert_eq!(buf.overwrite(b"xx"), 0);
    assert_eq!(buf.data_size(), 4);
    assert_eq!(buf.data_revision(), rev);
}

mod counting {
    use pagebuf::{AllocKind, Allocator, TrivialAllocator};
    use std::cell::Cell;
    use std::ptr::NonNull;

    /// Wraps the trivial allocator and counts traffic.
    #[derive(Default)]
    pub struct CountingAllocator {
        inner: TrivialAllocator,
        pub live: Cell<isize>,
        pub region_allocs: Cell<usize>,
    }

    impl Allocator for CountingAllocator {
        fn alloc(&self, kind: AllocKind, size: usize) -> Option<NonNull<u8>> {
            let ptr = self.inner.alloc(kind, size)?;
            self.live.set(self.live.get() + 1);
            if kind == AllocKind::Region {
                self.region_allocs.set(self.region_allocs.get() + 1);
            }
            Some(ptr)
        }

        unsafe fn free(&self, kind: AllocKind, ptr: NonNull<u8>, size: usize) {
            self.live.set(self.live.get() - 1);
            self.inner.free(kind, ptr, size);
        }
    }
}

#[test]
fn custom_allocator_sees_all_region_traffic() {
    use std::rc::Rc;

    let alloc = Rc::new(counting::CountingAllocator::default());
    let handle: pagebuf::AllocRef = alloc.clone();
    {
        let mut buf =
            HeapBuffer::with_strategy_and_alloc(Strategy::default().page_size(4), handle);
        buf.write(b"0123456789");
        assert_eq!(alloc.region_allocs.get(), 3);
        assert_eq!(alloc.live.get(), 3);

        // draining a whole page releases its region through the allocator
        buf.seek(4);
        assert_eq!(alloc.live.get(), 2);
    }
    assert_eq!(alloc.live.get(), 0);
}

#[test]
fn struct_allocations_honour_the_zero_fill_contract() {
    use pagebuf::{AllocKind, Allocator};

    let alloc = counting::CountingAllocator::default();
    let ptr = alloc.alloc(AllocKind::Struct, 32).unwrap();
    let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), 32) };
    assert!(bytes.iter().all(|&b| b == 0));
    unsafe { alloc.free(AllocKind::Struct, ptr, 32) };
    assert_eq!(alloc.live.get(), 0);
}
