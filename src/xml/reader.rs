//! A byte-counting buffered reader.
//!
//! quick-xml reports buffer offsets, not text positions. Wrapping the
//! input in this reader keeps a running 1-based line/column count as
//! bytes are consumed, which the decoder snapshots whenever it raises a
//! malformed-input error.

use std::io::{BufRead, BufReader, Read};

use crate::error::TextPosition;

pub(crate) struct PositionedReader<R> {
    inner: BufReader<R>,
    line: u64,
    column: u64,
}

impl<R: Read> PositionedReader<R> {
    pub fn new(read: R) -> PositionedReader<R> {
        PositionedReader {
            inner: BufReader::new(read),
            line: 1,
            column: 1,
        }
    }

    /// The position just past the last consumed byte.
    pub fn position(&self) -> TextPosition {
        TextPosition {
            line: self.line,
            column: self.column,
        }
    }
}

impl<R: Read> Read for PositionedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl<R: Read> BufRead for PositionedReader<R> {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        for &byte in &self.inner.buffer()[..amt] {
            if byte == b'\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.inner.consume(amt);
    }
}
