//! Cutting an arbitrarily chunked byte stream into `\n` terminated records.
//!
//! The framer only accumulates; it is up to the caller to decide when to
//! [`LineFramer::drain`] (usually once [`LineFramer::is_ready`] says the
//! threshold has been crossed) so that the cost of splitting is amortized over
//! many chunks. Only the trailing partial record is kept between drains.
use std::io::{ErrorKind, Read};
use std::mem;

use bytes::{Buf, Bytes, BytesMut};
use log::trace;

use crate::NEWLINE;

/// Accumulation threshold used when none is given, 10 MiB
pub const DEFAULT_THRESHOLD: usize = 10 * 1024 * 1024;

/// Block size the [`LineReader`] pulls from its reader
pub const BLOCK_SIZE: usize = 64 * 1024;

pub struct LineFramer {
    buf: BytesMut,
    threshold: usize,
}

impl LineFramer {
    pub fn new(threshold: usize) -> Self {
        LineFramer {
            buf: BytesMut::new(),
            threshold,
        }
    }

    /// Bytes held, not yet handed out as records
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    pub fn is_ready(&self) -> bool {
        self.buf.len() >= self.threshold
    }

    /// Hand out every complete record, keep the partial one
    pub fn drain(&mut self) -> Lines {
        match self.buf.iter().rposition(|b| *b == NEWLINE) {
            None => Lines::default(),
            Some(last) => {
                let data = self.buf.split_to(last + 1).freeze();
                trace!("drain {} bytes, {} held", data.len(), self.buf.len());
                Lines { data }
            }
        }
    }

    /// Hand out everything including an unterminated tail
    pub fn flush(&mut self) -> Lines {
        Lines {
            data: self.buf.split().freeze(),
        }
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        LineFramer::new(DEFAULT_THRESHOLD)
    }
}

/// Records of one drained region, delimiter stripped and still escaped.
///
/// Every record is a slice of the same shared buffer.
#[derive(Debug, Default)]
pub struct Lines {
    data: Bytes,
}

impl Lines {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Iterator for Lines {
    type Item = Bytes;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }

        match self.data.iter().position(|b| *b == NEWLINE) {
            Some(at) => {
                let line = self.data.split_to(at);
                self.data.advance(1);
                Some(line)
            }
            None => Some(mem::take(&mut self.data)),
        }
    }
}

/// Blocking record iterator over a reader
pub struct LineReader<R: Read> {
    inner: R,
    framer: LineFramer,
    lines: Lines,
    block: Vec<u8>,
    eof: bool,
}

impl<R: Read> LineReader<R> {
    pub fn new(reader: R) -> Self {
        LineReader::with_block_size(reader, BLOCK_SIZE)
    }

    pub fn with_block_size(reader: R, block_size: usize) -> Self {
        LineReader {
            inner: reader,
            framer: LineFramer::new(block_size),
            lines: Lines::default(),
            block: vec![0; block_size.max(1)],
            eof: false,
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Iterator for LineReader<R> {
    type Item = std::io::Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(line) = self.lines.next() {
                return Some(Ok(line));
            }
            if self.eof {
                return None;
            }

            let (eof, len) = match fill_buf(&mut self.inner, &mut self.block) {
                Ok(x) => x,
                Err(e) => {
                    self.eof = true;
                    return Some(Err(e));
                }
            };
            self.framer.push(&self.block[..len]);

            if eof {
                self.eof = true;
                self.lines = self.framer.flush();
            } else {
                self.lines = self.framer.drain();
            }
        }
    }
}

// Read until the buffer is full or the reader is exhausted, (eof, read)
fn fill_buf<R: Read>(data: &mut R, buf: &mut [u8]) -> std::io::Result<(bool, usize)> {
    let mut buf_read = 0;

    while buf_read < buf.len() {
        match data.read(&mut buf[buf_read..]) {
            Ok(0) => return Ok((true, buf_read)),
            Ok(x) => buf_read += x,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
    }
    Ok((false, buf_read))
}


#[cfg(test)]
mod test_line_reader {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn small_blocks() {
        let data = b"first\nsecond\n\nthird".to_vec();

        for block in [1, 2, 5, 6, 1024] {
            let lines: Vec<Bytes> = LineReader::with_block_size(Cursor::new(data.clone()), block)
                .map(|x| x.unwrap())
                .collect();

            assert_eq!(
                lines,
                vec![
                    Bytes::from_static(b"first"),
                    Bytes::from_static(b"second"),
                    Bytes::new(),
                    Bytes::from_static(b"third"),
                ],
                "block {}",
                block
            );
        }
    }

    #[test]
    fn empty() {
        let mut reader = LineReader::new(Cursor::new(vec![]));
        assert!(reader.next().is_none());
    }

    #[test]
    fn fill_buf_short_reader() {
        let mut in_buf = Cursor::new(vec![1, 2]);
        let mut buf = [0u8; 4];

        assert_eq!(fill_buf(&mut in_buf, &mut buf).unwrap(), (true, 2));
        assert_eq!(&buf, &[1, 2, 0, 0]);
    }

    #[test]
    fn fill_buf_long_reader() {
        let mut in_buf = Cursor::new(vec![1, 2, 3, 4]);
        let mut buf = [0u8; 2];

        assert_eq!(fill_buf(&mut in_buf, &mut buf).unwrap(), (false, 2));
        assert_eq!(&buf, &[1, 2]);
    }
}
