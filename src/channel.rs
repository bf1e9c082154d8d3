//! Byte channels attached to archives
//!
//! Encoders flush into a [`Sink`], decoders refill from a [`Source`]. Both
//! wrap any `std::io` implementation; opening files is left to the caller or
//! to the `create`/`open` shortcuts on the archives.

use std::fmt;
use std::io::{self, Read, Write};

/// Write half: receives flushed archive bytes
pub(crate) struct Sink<'a> {
    inner: Box<dyn Write + 'a>,
    written: u64,
}

impl<'a> Sink<'a> {
    pub fn new<W: Write + 'a>(writer: W) -> Self {
        Self {
            inner: Box::new(writer),
            written: 0,
        }
    }

    /// Write every segment in order, then flush the writer
    pub fn write_segments(&mut self, segments: &[&[u8]]) -> io::Result<usize> {
        let mut total = 0;
        for segment in segments {
            self.inner.write_all(segment)?;
            total += segment.len();
        }
        self.inner.flush()?;
        self.written += total as u64;
        Ok(total)
    }

    /// Bytes delivered over the lifetime of the sink
    #[inline]
    pub fn written(&self) -> u64 {
        self.written
    }
}

/// Read half: supplies bytes when the in-memory regions run dry
pub(crate) struct Source<'a> {
    inner: Box<dyn Read + 'a>,
    exhausted: bool,
}

impl<'a> Source<'a> {
    pub fn new<R: Read + 'a>(reader: R) -> Self {
        Self {
            inner: Box::new(reader),
            exhausted: false,
        }
    }

    /// One read into `buf`; `Ok(0)` marks the source exhausted for good
    pub fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.exhausted || buf.is_empty() {
            return Ok(0);
        }
        loop {
            match self.inner.read(buf) {
                Ok(0) => {
                    self.exhausted = true;
                    return Ok(0);
                }
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

impl fmt::Debug for Sink<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink").field("written", &self.written).finish()
    }
}

impl fmt::Debug for Source<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("exhausted", &self.exhausted)
            .finish()
    }
}
