//! Bounded-memory physical-line reader over any `std::io::Read`.
//!
//! A one-shot batch read over a buffered reader, reusing a single byte
//! buffer across calls rather than allocating a fresh one per line.

use std::io::{self, BufRead, BufReader, Read};

/// Reads `\n`-terminated physical lines from `R`, stripping a trailing `\r`
/// for CRLF input and reusing one buffer across calls to bound memory use.
pub struct LineReader<R> {
    inner: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: Read> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::with_capacity(64 * 1024, reader),
            buf: Vec::with_capacity(512),
        }
    }

    /// Read the next physical line (without its terminator) as UTF-8,
    /// lossily replacing any invalid sequences. Returns `Ok(None)` at EOF.
    pub fn next_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        let n = self.inner.read_until(b'\n', &mut self.buf)?;
        if n == 0 {
            return Ok(None);
        }
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}
