//! Write-side archive
//!
//! The encoder appends framed records into its inline scratch region and
//! spills into a heap buffer once the scratch is full. With a sink attached,
//! [`Encoder::flush`] hands the buffered bytes to the channel and starts over,
//! so arbitrarily large archives can be written with bounded memory.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::channel::Sink;
use crate::codec::{Composite, Encode, Scalar};
use crate::config::ArchiveConfig;
use crate::error::{FramingFault, Result};
use crate::region::Regions;
use crate::PREFIX_SIZE;

/// Archive that frames values into bytes
#[derive(Debug)]
pub struct Encoder<'a> {
    regions: Regions,
    sink: Option<Sink<'a>>,
}

/// Native-endian 4-byte prefix for a length or count
#[inline]
pub(crate) fn prefix(length: usize) -> Result<[u8; PREFIX_SIZE]> {
    u32::try_from(length)
        .map(u32::to_ne_bytes)
        .map_err(|_| FramingFault::LengthOverflow { length }.into())
}

impl Encoder<'static> {
    /// Create an empty in-memory encoder
    #[inline]
    pub fn new() -> Self {
        Self::with_config(ArchiveConfig::default())
    }

    /// Create an empty in-memory encoder with custom sizing
    #[inline]
    pub fn with_config(config: ArchiveConfig) -> Self {
        Self {
            regions: Regions::new(config),
            sink: None,
        }
    }

    /// Create an encoder that flushes into a newly created file
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::with_sink(BufWriter::new(file)))
    }
}

impl Default for Encoder<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Encoder<'a> {
    /// Create an encoder attached to `writer`
    #[inline]
    pub fn with_sink<W: Write + 'a>(writer: W) -> Self {
        Self::with_sink_and_config(writer, ArchiveConfig::default())
    }

    /// Create an encoder attached to `writer` with custom sizing
    pub fn with_sink_and_config<W: Write + 'a>(writer: W, config: ArchiveConfig) -> Self {
        Self {
            regions: Regions::new(config),
            sink: Some(Sink::new(writer)),
        }
    }

    /// Attach `writer`, replacing any previous sink
    ///
    /// Bytes already buffered are delivered to the new sink on the next flush.
    pub fn attach<W: Write + 'a>(&mut self, writer: W) {
        self.sink = Some(Sink::new(writer));
    }

    /// Sizing this encoder was built with
    #[inline]
    pub fn config(&self) -> ArchiveConfig {
        self.regions.config()
    }

    /// Append any framed value
    #[inline]
    pub fn append<T: Encode + ?Sized>(&mut self, value: &T) -> Result<&mut Self> {
        value.encode(self)?;
        Ok(self)
    }

    /// Append a fixed-width scalar record
    #[inline]
    pub fn append_scalar<T: Scalar>(&mut self, value: T) -> Result<&mut Self> {
        let bits = value.to_native();
        self.put_record(bits.as_ref())?;
        Ok(self)
    }

    /// Append a string record (raw UTF-8 bytes, no terminator)
    #[inline]
    pub fn append_str(&mut self, value: &str) -> Result<&mut Self> {
        self.put_record(value.as_bytes())?;
        Ok(self)
    }

    /// Append an opaque byte record
    #[inline]
    pub fn append_bytes(&mut self, value: &[u8]) -> Result<&mut Self> {
        self.put_record(value)?;
        Ok(self)
    }

    /// Append a sequence or set: bare count, then each element's frame
    pub fn append_seq<I>(&mut self, items: I) -> Result<&mut Self>
    where
        I: IntoIterator,
        I::IntoIter: ExactSizeIterator,
        I::Item: Encode,
    {
        let items = items.into_iter();
        self.put_count(items.len())?;
        for item in items {
            item.encode(self)?;
        }
        Ok(self)
    }

    /// Append a map: bare count, then key frame and value frame per entry
    pub fn append_map<I, K, V>(&mut self, entries: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = (K, V)>,
        I::IntoIter: ExactSizeIterator,
        K: Encode,
        V: Encode,
    {
        let entries = entries.into_iter();
        self.put_count(entries.len())?;
        for (key, value) in entries {
            key.encode(self)?;
            value.encode(self)?;
        }
        Ok(self)
    }

    /// Append a pair: first frame then second frame, no prefix
    #[inline]
    pub fn append_pair<A, B>(&mut self, first: &A, second: &B) -> Result<&mut Self>
    where
        A: Encode + ?Sized,
        B: Encode + ?Sized,
    {
        first.encode(self)?;
        second.encode(self)?;
        Ok(self)
    }

    /// Append a composite's fields in declared order, no wrapping frame
    #[inline]
    pub fn append_composite<T: Composite>(&mut self, value: &T) -> Result<&mut Self> {
        value.write_fields(self)?;
        Ok(self)
    }

    /// Bytes buffered and not yet flushed
    #[inline]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Check if nothing is buffered
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Check if the buffered content has outgrown the scratch region
    #[inline]
    pub fn has_spilled(&self) -> bool {
        self.regions.has_spilled()
    }

    /// View of the buffered bytes
    ///
    /// Borrowed while everything fits in scratch; once spilled the two
    /// regions are joined into an owned copy. Treat the view as ephemeral.
    #[inline]
    pub fn get(&self) -> Cow<'_, [u8]> {
        self.regions.contiguous()
    }

    /// Buffered bytes as (scratch, heap) slices, without copying
    #[inline]
    pub fn segments(&self) -> (&[u8], &[u8]) {
        self.regions.segments()
    }

    /// Owned copy of the buffered bytes
    #[inline]
    pub fn to_vec(&self) -> Vec<u8> {
        self.get().into_owned()
    }

    /// Write scratch then heap to the sink and empty both regions
    ///
    /// Without a sink this is a no-op and the content stays buffered.
    pub fn flush(&mut self) -> Result<()> {
        let Some(sink) = self.sink.as_mut() else {
            return Ok(());
        };
        let (scratch, heap) = self.regions.segments();
        let written = sink.write_segments(&[scratch, heap])?;
        debug!(written, total = sink.written(), "archive flushed");
        self.regions.rewind();
        Ok(())
    }

    /// Flush and detach the sink
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        self.sink = None;
        Ok(())
    }

    /// Flush pending bytes, release the heap and drop the sink
    ///
    /// The encoder is emptied and detached even when the final flush fails;
    /// the failure is returned. Without a sink buffered bytes are discarded.
    pub fn clear(&mut self) -> Result<()> {
        let flushed = if self.sink.is_some() && !self.regions.is_empty() {
            self.flush()
        } else {
            Ok(())
        };
        self.regions.reset();
        self.sink = None;
        flushed
    }

    /// Take over `other`'s content and sink, leaving `other` empty
    ///
    /// The heap buffer changes owner without being copied. `self` is cleared
    /// first, so its pending bytes reach its own sink before it is replaced.
    /// A failed flush is returned after the move has completed.
    pub fn move_from(&mut self, other: &mut Encoder<'a>) -> Result<()> {
        let cleared = self.clear();
        self.regions.move_from(&mut other.regions);
        self.sink = other.sink.take();
        cleared
    }

    pub(crate) fn regions(&self) -> &Regions {
        &self.regions
    }

    #[inline]
    fn put_record(&mut self, payload: &[u8]) -> Result<()> {
        let prefix = prefix(payload.len())?;
        self.regions.extend(&[&prefix[..], payload])
    }

    #[inline]
    fn put_count(&mut self, count: usize) -> Result<()> {
        let prefix = prefix(count)?;
        self.regions.extend(&[&prefix[..]])
    }
}

impl Drop for Encoder<'_> {
    fn drop(&mut self) {
        if self.sink.is_some() && !self.regions.is_empty() {
            if let Err(err) = self.flush() {
                warn!(error = %err, "failed to flush archive on drop");
            }
        }
    }
}
