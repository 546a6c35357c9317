//! Line discovery reader.
//!
//! Discovers `\n`- and `\r\n`-terminated lines at the buffer head,
//! resuming an unfinished scan from the saved position as more bytes
//! arrive. The reader is a two-state machine: SCANNING until a
//! terminator (or a forced termination at END) is found, HAS_LINE until
//! `seek_line` consumes the line. Any buffer revision change sends it
//! back to SCANNING from the head.

use crate::buffer::{Buffer, ByteCursor};
use crate::constants::MAX_LINE_LEN;

/// Incremental LF / CRLF line discovery over a buffer.
#[derive(Debug, Clone)]
pub struct LineReader {
    revision: u64,
    /// Scan position; `offset` may sit one past the window end while
    /// waiting for more bytes.
    scan: ByteCursor,
    offset_from_head: usize,
    has_line: bool,
    last_was_cr: bool,
    terminated: bool,
    strip_cr: bool,
    line_len: usize,
    term_bytes: usize,
    crlf: bool,
}

impl LineReader {
    /// Reader scanning from the buffer head.
    pub fn new(buf: &mut dyn Buffer) -> LineReader {
        LineReader {
            revision: buf.data_revision(),
            scan: ByteCursor::new(buf.begin(), 0),
            offset_from_head: 0,
            has_line: false,
            last_was_cr: false,
            terminated: false,
            strip_cr: false,
            line_len: 0,
            term_bytes: 0,
            crlf: false,
        }
    }

    /// Forget everything and rescan from the head.
    pub fn reset(&mut self, buf: &mut dyn Buffer) {
        self.rewind_scan(buf);
        self.terminated = false;
        self.strip_cr = false;
    }

    /// Restart the scan but keep any pending termination request.
    fn rewind_scan(&mut self, buf: &mut dyn Buffer) {
        self.revision = buf.data_revision();
        self.scan = ByteCursor::new(buf.begin(), 0);
        self.offset_from_head = 0;
        self.has_line = false;
        self.last_was_cr = false;
        self.line_len = 0;
        self.term_bytes = 0;
        self.crlf = false;
    }

    fn sync(&mut self, buf: &mut dyn Buffer) {
        if self.revision != buf.data_revision() {
            self.rewind_scan(buf);
        }
    }

    /// The byte under the scan position, normalising the cursor across
    /// page boundaries (pages may have grown since the last call).
    fn peek(&mut self, buf: &mut dyn Buffer) -> Option<u8> {
        if self.scan.is_end() {
            let first = buf.begin();
            if first.is_end() {
                return None;
            }
            self.scan = ByteCursor::new(first, 0);
        }
        loop {
            let slice = buf.page(self.scan.page())?;
            if self.scan.offset() < slice.len() {
                return Some(slice.bytes()[self.scan.offset()]);
            }
            let next = buf.next_page(self.scan.page());
            if next.is_end() {
                return None;
            }
            self.scan = ByteCursor::new(next, 0);
        }
    }

    fn advance(&mut self) {
        self.scan = ByteCursor::new(self.scan.page(), self.scan.offset() + 1);
    }

    /// Whether a complete line is available at the buffer head.
    ///
    /// Scans forward from the saved position; an unfinished scan
    /// resumes where it stopped on the next call.
    pub fn has_line(&mut self, buf: &mut dyn Buffer) -> bool {
        self.sync(buf);
        if self.has_line {
            return true;
        }
        loop {
            if self.offset_from_head >= MAX_LINE_LEN {
                // Pathological stream: report a truncated line with no
                // terminator so the caller can drain it.
                self.line_len = MAX_LINE_LEN;
                self.term_bytes = 0;
                self.crlf = false;
                self.has_line = true;
                return true;
            }
            let Some(byte) = self.peek(buf) else {
                if self.terminated {
                    if self.strip_cr && self.last_was_cr {
                        self.line_len = self.offset_from_head - 1;
                        self.term_bytes = 1;
                        self.crlf = true;
                    } else {
                        self.line_len = self.offset_from_head;
                        self.term_bytes = 0;
                        self.crlf = false;
                    }
                    self.has_line = true;
                    return true;
                }
                return false;
            };
            if byte == b'\n' {
                self.crlf = self.last_was_cr;
                self.line_len = self.offset_from_head - self.crlf as usize;
                self.term_bytes = 1 + self.crlf as usize;
                self.has_line = true;
                self.advance();
                return true;
            }
            self.last_was_cr = byte == b'\r';
            self.offset_from_head += 1;
            self.advance();
        }
    }

    /// Length of the discovered line, excluding its terminator (and a
    /// preceding `\r`). 0 while no line is available.
    pub fn line_len(&mut self, buf: &mut dyn Buffer) -> usize {
        if self.has_line(buf) {
            self.line_len
        } else {
            0
        }
    }

    /// Whether the discovered line was `\r\n`-terminated.
    pub fn is_crlf(&mut self, buf: &mut dyn Buffer) -> bool {
        self.has_line(buf) && self.crlf
    }

    /// Copy the line bytes (no terminator) from the buffer head.
    pub fn line_data(&mut self, buf: &mut dyn Buffer, out: &mut [u8]) -> usize {
        if !self.has_line(buf) {
            return 0;
        }
        let n = self.line_len.min(out.len());
        buf.read(&mut out[..n])
    }

    /// Consume the line and its terminator from the buffer, then rescan.
    /// Returns the bytes consumed.
    pub fn seek_line(&mut self, buf: &mut dyn Buffer) -> usize {
        if !self.has_line(buf) {
            return 0;
        }
        let n = buf.seek(self.line_len + self.term_bytes);
        self.terminated = false;
        self.strip_cr = false;
        self.rewind_scan(buf);
        n
    }

    /// Treat END as a line end even without a terminator byte.
    pub fn terminate_line(&mut self, buf: &mut dyn Buffer) -> bool {
        self.sync(buf);
        self.terminated = true;
        self.strip_cr = false;
        self.has_line(buf)
    }

    /// Like [`LineReader::terminate_line`], but additionally strip one
    /// trailing `\r`.
    pub fn terminate_line_check_cr(&mut self, buf: &mut dyn Buffer) -> bool {
        self.sync(buf);
        self.terminated = true;
        self.strip_cr = true;
        self.has_line(buf)
    }
}
