//! Sequential cursor reader.

use crate::buffer::{Buffer, ByteCursor};

/// Stateful sequential reader.
///
/// `read` copies without consuming; `consume` additionally seeks the
/// buffer past the bytes it copied. Cloning yields an independent
/// reader at the same cursor.
#[derive(Debug, Clone)]
pub struct DataReader {
    revision: u64,
    cursor: ByteCursor,
}

impl DataReader {
    /// Reader positioned at the buffer head.
    pub fn new(buf: &mut dyn Buffer) -> DataReader {
        DataReader {
            revision: buf.data_revision(),
            cursor: ByteCursor::new(buf.begin(), 0),
        }
    }

    /// Reposition at the head and resync with the buffer.
    pub fn reset(&mut self, buf: &mut dyn Buffer) {
        self.revision = buf.data_revision();
        self.cursor = ByteCursor::new(buf.begin(), 0);
    }

    fn sync(&mut self, buf: &mut dyn Buffer) {
        if self.revision != buf.data_revision() {
            self.reset(buf);
        }
    }

    /// Copy up to `out.len()` bytes at the cursor into `out` and
    /// advance. Returns 0 once the cursor reaches END.
    pub fn read(&mut self, buf: &mut dyn Buffer, out: &mut [u8]) -> usize {
        self.sync(buf);
        let mut copied = 0;
        while copied < out.len() {
            if self.cursor.is_end() {
                // The reader was created on an empty buffer; pages may
                // exist by now.
                let first = buf.begin();
                if first.is_end() {
                    break;
                }
                self.cursor = ByteCursor::new(first, 0);
            }
            let Some(slice) = buf.page(self.cursor.page()) else { break };
            let bytes = slice.bytes();
            let offset = self.cursor.offset();
            if offset >= bytes.len() {
                // Park at the page end while nothing follows, so bytes
                // appended later continue from here.
                let next = buf.next_page(self.cursor.page());
                if next.is_end() {
                    break;
                }
                self.cursor = ByteCursor::new(next, 0);
                continue;
            }
            let n = (bytes.len() - offset).min(out.len() - copied);
            out[copied..copied + n].copy_from_slice(&bytes[offset..offset + n]);
            copied += n;
            self.cursor = ByteCursor::new(self.cursor.page(), offset + n);
        }
        copied
    }

    /// `read`, then consume the copied bytes from the buffer head.
    pub fn consume(&mut self, buf: &mut dyn Buffer, out: &mut [u8]) -> usize {
        let n = self.read(buf, out);
        if n > 0 {
            buf.seek(n);
        }
        n
    }
}
