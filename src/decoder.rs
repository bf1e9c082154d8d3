//! Read-side archive
//!
//! The decoder walks records sequentially over its scratch region, its heap
//! region and, when a source is attached, bytes not yet pulled from the
//! channel. A record whose prefix or payload straddles any of these
//! boundaries is reassembled transparently.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use tracing::trace;

use crate::channel::Source;
use crate::codec::{Composite, Decode, Scalar};
use crate::config::ArchiveConfig;
use crate::encoder::Encoder;
use crate::error::{Error, FramingFault, Result};
use crate::region::Regions;
use crate::PREFIX_SIZE;

/// Archive that reconstructs values from framed bytes
#[derive(Debug)]
pub struct Decoder<'a> {
    regions: Regions,
    cursor: usize,
    source: Option<Source<'a>>,
}

impl Decoder<'static> {
    /// Create a decoder over a copy of `bytes`
    ///
    /// Bytes beyond the scratch capacity are copied into the heap region.
    #[inline]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_bytes_with_config(bytes, ArchiveConfig::default())
    }

    /// Create a decoder over a copy of `bytes` with custom sizing
    pub fn from_bytes_with_config(bytes: &[u8], config: ArchiveConfig) -> Result<Self> {
        Ok(Self {
            regions: Regions::copied(config, &[bytes])?,
            cursor: 0,
            source: None,
        })
    }

    /// Create a decoder over a copy of everything `encoder` has buffered
    ///
    /// The decoder owns its bytes; later changes to the encoder do not
    /// affect it.
    pub fn from_encoder(encoder: &Encoder<'_>) -> Result<Self> {
        let source = encoder.regions();
        let (scratch, heap) = source.segments();
        Ok(Self {
            regions: Regions::copied(source.config(), &[scratch, heap])?,
            cursor: 0,
            source: None,
        })
    }

    /// Create a decoder that pulls bytes from the file at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::with_source(file))
    }
}

impl<'a> Decoder<'a> {
    /// Create a decoder that pulls bytes from `reader` on demand
    #[inline]
    pub fn with_source<R: Read + 'a>(reader: R) -> Self {
        Self::with_source_and_config(reader, ArchiveConfig::default())
    }

    /// Create a decoder that pulls at most `config.chunk()` bytes per refill
    pub fn with_source_and_config<R: Read + 'a>(reader: R, config: ArchiveConfig) -> Self {
        Self {
            regions: Regions::new(config),
            cursor: 0,
            source: Some(Source::new(reader)),
        }
    }

    /// Sizing this decoder was built with
    #[inline]
    pub fn config(&self) -> ArchiveConfig {
        self.regions.config()
    }

    /// Extract any framed value
    #[inline]
    pub fn extract<T: Decode>(&mut self) -> Result<T> {
        T::decode(self)
    }

    /// Extract a fixed-width scalar record
    pub fn extract_scalar<T: Scalar>(&mut self) -> Result<T> {
        let found = self.extract_count()?;
        if found != T::WIDTH {
            return Err(FramingFault::WidthMismatch {
                expected: T::WIDTH,
                found,
            }
            .into());
        }
        self.check_extent(found)?;
        let mut bits = T::Bytes::default();
        self.take_into(bits.as_mut())?;
        T::from_native(bits).ok_or_else(|| {
            FramingFault::InvalidScalar {
                type_name: T::TYPE_NAME,
            }
            .into()
        })
    }

    /// Extract a string record
    pub fn extract_string(&mut self) -> Result<String> {
        let bytes = self.extract_bytes()?;
        String::from_utf8(bytes).map_err(|err| {
            FramingFault::InvalidUtf8 {
                valid_up_to: err.utf8_error().valid_up_to(),
            }
            .into()
        })
    }

    /// Extract an opaque byte record
    pub fn extract_bytes(&mut self) -> Result<Vec<u8>> {
        let declared = self.extract_count()?;
        self.check_extent(declared)?;
        self.take(declared)
    }

    /// Extract a sequence
    #[inline]
    pub fn extract_seq<T: Decode>(&mut self) -> Result<Vec<T>> {
        self.extract()
    }

    /// Extract a set, e.g. `BTreeSet<T>` or `HashSet<T>`
    #[inline]
    pub fn extract_set<S: Decode>(&mut self) -> Result<S> {
        self.extract()
    }

    /// Extract a map, e.g. `BTreeMap<K, V>` or `HashMap<K, V>`
    ///
    /// A key repeated in the input keeps its last value.
    #[inline]
    pub fn extract_map<M: Decode>(&mut self) -> Result<M> {
        self.extract()
    }

    /// Extract a pair: first value, then second value
    #[inline]
    pub fn extract_pair<A: Decode, B: Decode>(&mut self) -> Result<(A, B)> {
        let first = A::decode(self)?;
        let second = B::decode(self)?;
        Ok((first, second))
    }

    /// Extract a composite by reading its fields in declared order
    #[inline]
    pub fn extract_composite<T: Composite>(&mut self) -> Result<T> {
        T::read_fields(self)
    }

    /// Read a bare 4-byte length or count
    pub fn extract_count(&mut self) -> Result<usize> {
        let mut raw = [0u8; PREFIX_SIZE];
        self.take_into(&mut raw)?;
        Ok(u32::from_ne_bytes(raw) as usize)
    }

    /// Bytes in memory not yet consumed; a source may hold more
    #[inline]
    pub fn remaining(&self) -> usize {
        self.regions.len() - self.cursor
    }

    /// Check if every byte has been consumed and no source can supply more
    ///
    /// With a source attached this only turns true after a refill came back
    /// empty.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0 && self.source.as_ref().map_or(true, Source::is_exhausted)
    }

    /// Pre-allocation bound for a container of `count` elements
    ///
    /// Every element occupies at least a prefix, so a count larger than the
    /// in-memory bytes allow is never trusted for allocation.
    #[inline]
    pub fn capacity_hint(&self, count: usize) -> usize {
        count.min(self.remaining() / PREFIX_SIZE)
    }

    /// Copy exactly `out.len()` bytes, refilling from the source as needed
    pub fn take_into(&mut self, out: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        self.pull(out.len(), |chunk| {
            out[filled..filled + chunk.len()].copy_from_slice(chunk);
            filled += chunk.len();
            Ok(())
        })
    }

    /// Take exactly `len` bytes into a new buffer
    ///
    /// The buffer grows with the bytes actually delivered, so an oversized
    /// length from a streaming source fails with an underrun rather than a
    /// huge up-front allocation.
    pub fn take(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        reserve(&mut out, len.min(self.remaining()))?;
        self.pull(len, |chunk| {
            reserve(&mut out, chunk.len())?;
            out.extend_from_slice(chunk);
            Ok(())
        })?;
        Ok(out)
    }

    /// Discard everything, release the heap and drop the source
    pub fn clear(&mut self) {
        self.regions.reset();
        self.cursor = 0;
        self.source = None;
    }

    /// Independent copy of the in-memory content and read position
    ///
    /// A decoder attached to a source cannot be cloned, since the bytes not
    /// yet pulled from the channel cannot be shared.
    pub fn try_clone(&self) -> Result<Decoder<'static>> {
        if self.source.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "cannot clone a decoder attached to a source",
            )
            .into());
        }
        let (scratch, heap) = self.regions.segments();
        Ok(Decoder {
            regions: Regions::copied(self.regions.config(), &[scratch, heap])?,
            cursor: self.cursor,
            source: None,
        })
    }

    /// Take over `other`'s content, position and source, leaving `other` empty
    pub fn move_from(&mut self, other: &mut Decoder<'a>) {
        self.clear();
        self.regions.move_from(&mut other.regions);
        self.cursor = other.cursor;
        self.source = other.source.take();
        other.cursor = 0;
    }

    /// Reject a payload longer than the archive when no source can extend it
    #[inline]
    fn check_extent(&self, declared: usize) -> Result<()> {
        if self.source.is_none() && declared > self.remaining() {
            return Err(FramingFault::RecordOverrun {
                declared,
                available: self.remaining(),
            }
            .into());
        }
        Ok(())
    }

    /// Hand `requested` consecutive bytes to `consume`, chunk by chunk
    ///
    /// Each pass either consumes at least one byte or performs a refill; a
    /// refill that yields nothing ends the loop with an underrun, so the loop
    /// terminates even on an empty or stalled source.
    fn pull<F>(&mut self, requested: usize, mut consume: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        let mut remaining = requested;
        while remaining > 0 {
            if self.cursor == self.regions.len() && !self.refill()? {
                return Err(Error::Underrun {
                    requested,
                    available: requested - remaining,
                });
            }

            let available = self.regions.segment_at(self.cursor);
            let n = available.len().min(remaining);
            consume(&available[..n])?;
            self.cursor += n;
            remaining -= n;
        }
        Ok(())
    }

    /// Replace the consumed in-memory content with the next source chunk
    fn refill(&mut self) -> Result<bool> {
        let Some(source) = self.source.as_mut() else {
            return Ok(false);
        };
        let read = self.regions.reload(|buf| source.fill(buf))?;
        self.cursor = 0;
        trace!(read, chunk = self.regions.config().chunk(), "archive refilled");
        Ok(read > 0)
    }
}

#[inline]
fn reserve(buf: &mut Vec<u8>, additional: usize) -> Result<()> {
    buf.try_reserve(additional).map_err(|_| Error::Allocation {
        requested: buf.len().saturating_add(additional),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::collections::BTreeMap;
    use std::io;
    use tracing_test::traced_test;

    fn small() -> ArchiveConfig {
        ArchiveConfig::new().scratch_limit(8)
    }

    #[test]
    fn test_decoder_basic() {
        let mut encoder = Encoder::new();
        encoder.append(&1_000_000_000u64).unwrap(); // timestamp
        encoder.append(&-50_000_000i64).unwrap(); // price
        encoder.append("AAPL").unwrap();

        let mut decoder = Decoder::from_encoder(&encoder).unwrap();
        assert_eq!(decoder.extract::<u64>().unwrap(), 1_000_000_000);
        assert_eq!(decoder.extract::<i64>().unwrap(), -50_000_000);
        assert_eq!(decoder.extract_string().unwrap(), "AAPL");
        assert!(decoder.is_exhausted());
    }

    #[test]
    fn test_decoder_independent_of_encoder() {
        let mut encoder = Encoder::new();
        encoder.append(&5u8).unwrap();
        let mut decoder = Decoder::from_encoder(&encoder).unwrap();

        encoder.clear().unwrap();
        encoder.append(&6u8).unwrap();
        assert_eq!(decoder.extract::<u8>().unwrap(), 5);
    }

    #[test]
    fn test_record_straddles_scratch_and_heap() {
        let mut encoder = Encoder::new();
        encoder.append(&0x1122_3344_5566_7788u64).unwrap();
        encoder.append("spanning").unwrap();
        let bytes = encoder.to_vec();

        // the u64 payload straddles the 8-byte scratch boundary
        let mut decoder = Decoder::from_bytes_with_config(&bytes, small()).unwrap();
        assert_eq!(decoder.extract::<u64>().unwrap(), 0x1122_3344_5566_7788);
        assert_eq!(decoder.extract_string().unwrap(), "spanning");
    }

    #[test]
    fn test_small_encoder_to_decoder() {
        let mut encoder = Encoder::with_config(small());
        let values: Vec<u32> = (0..50).collect();
        encoder.append(&values).unwrap();
        assert!(encoder.has_spilled());

        let mut decoder = Decoder::from_encoder(&encoder).unwrap();
        assert_eq!(decoder.config().scratch(), 8);
        assert_eq!(decoder.extract_seq::<u32>().unwrap(), values);
    }

    #[test]
    fn test_streaming_refills_within_one_record() {
        let text = "a record much longer than one refill chunk";
        let mut encoder = Encoder::new();
        encoder.append(text).unwrap().append(&7i32).unwrap();
        let bytes = encoder.to_vec();

        let config = ArchiveConfig::new().scratch_limit(8).refill_chunk(3);
        let mut decoder = Decoder::with_source_and_config(&bytes[..], config);
        assert_eq!(decoder.extract_string().unwrap(), text);
        assert_eq!(decoder.extract::<i32>().unwrap(), 7);
        assert!(decoder.extract::<i32>().is_err());
        assert!(decoder.is_exhausted());
    }

    #[test]
    fn test_underrun_detached() {
        let mut encoder = Encoder::new();
        encoder.append(&1u32).unwrap();
        let mut decoder = Decoder::from_encoder(&encoder).unwrap();

        decoder.extract::<u32>().unwrap();
        let err = decoder.extract::<u32>().unwrap_err();
        assert!(matches!(
            err,
            Error::Underrun {
                requested: 4,
                available: 0
            }
        ));
    }

    #[test]
    fn test_underrun_partial_prefix() {
        let mut decoder = Decoder::from_bytes(&[1, 0]).unwrap();
        let err = decoder.extract_count().unwrap_err();
        assert!(matches!(
            err,
            Error::Underrun {
                requested: 4,
                available: 2
            }
        ));
    }

    #[test]
    fn test_underrun_streaming() {
        let mut encoder = Encoder::new();
        encoder.append("truncated").unwrap();
        let mut bytes = encoder.to_vec();
        bytes.truncate(bytes.len() - 2);

        let mut decoder = Decoder::with_source_and_config(&bytes[..], small());
        let err = decoder.extract_string().unwrap_err();
        assert!(matches!(
            err,
            Error::Underrun {
                requested: 9,
                available: 7
            }
        ));
    }

    #[test]
    fn test_record_overrun_is_framing_error() {
        let mut bytes = 100u32.to_ne_bytes().to_vec();
        bytes.extend_from_slice(b"short");

        let mut decoder = Decoder::from_bytes(&bytes).unwrap();
        let err = decoder.extract_bytes().unwrap_err();
        assert_eq!(
            err.framing_fault(),
            Some(FramingFault::RecordOverrun {
                declared: 100,
                available: 5
            })
        );
    }

    #[test]
    fn test_truncated_scalar_is_framing_error() {
        let mut bytes = 4u32.to_ne_bytes().to_vec();
        bytes.extend_from_slice(&[1, 2]);

        let mut decoder = Decoder::from_bytes(&bytes).unwrap();
        let err = decoder.extract::<u32>().unwrap_err();
        assert_eq!(
            err.framing_fault(),
            Some(FramingFault::RecordOverrun {
                declared: 4,
                available: 2
            })
        );

        // same fault as a byte record cut at the same place
        let err = crate::from_slice::<String>(&bytes).unwrap_err();
        assert_eq!(
            err.framing_fault(),
            Some(FramingFault::RecordOverrun {
                declared: 4,
                available: 2
            })
        );
    }

    #[test]
    fn test_clear_exhausts() {
        let mut encoder = Encoder::with_config(small());
        encoder.append(&[1u64, 2, 3][..]).unwrap();
        let mut decoder = Decoder::from_encoder(&encoder).unwrap();
        assert!(decoder.remaining() > 0);

        decoder.clear();
        assert_eq!(decoder.remaining(), 0);
        assert!(decoder.is_exhausted());
        assert_eq!(decoder.extract::<u8>().unwrap_err().kind(), ErrorKind::Underrun);

        let mut streaming = Decoder::with_source(&b"\x01\x00\x00\x00"[..]);
        streaming.clear();
        assert!(streaming.is_exhausted());
    }

    #[test]
    fn test_try_clone_keeps_position() {
        let mut encoder = Encoder::with_config(small());
        encoder.append(&1u16).unwrap().append("spans the heap").unwrap();

        let mut decoder = Decoder::from_encoder(&encoder).unwrap();
        assert_eq!(decoder.extract::<u16>().unwrap(), 1);

        let mut copy = decoder.try_clone().unwrap();
        assert_eq!(copy.remaining(), decoder.remaining());
        assert_eq!(copy.extract_string().unwrap(), "spans the heap");
        assert!(copy.is_exhausted());

        // original is unaffected by reads on the copy
        assert_eq!(decoder.extract_string().unwrap(), "spans the heap");
    }

    #[test]
    fn test_try_clone_with_source_fails() {
        let decoder = Decoder::with_source(&b"\0\0\0\0"[..]);
        let err = decoder.try_clone().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Channel);
    }

    #[test]
    fn test_invalid_utf8() {
        let mut encoder = Encoder::new();
        encoder.append_bytes(&[b'o', b'k', 0xff]).unwrap();
        let mut decoder = Decoder::from_encoder(&encoder).unwrap();
        let err = decoder.extract_string().unwrap_err();
        assert_eq!(
            err.framing_fault(),
            Some(FramingFault::InvalidUtf8 { valid_up_to: 2 })
        );
    }

    #[test]
    fn test_hostile_count_does_not_preallocate() {
        let bytes = u32::MAX.to_ne_bytes();
        let mut decoder = Decoder::from_bytes(&bytes).unwrap();
        let err = decoder.extract_seq::<u64>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Underrun);
    }

    #[test]
    fn test_source_error_propagates() {
        struct Failing;
        impl Read for Failing {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            }
        }

        let mut decoder = Decoder::with_source(Failing);
        let err = decoder.extract::<u8>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Channel);
    }

    #[test]
    fn test_move_from() {
        let mut table = BTreeMap::new();
        table.insert(1u8, "one".to_string());
        let mut encoder = Encoder::with_config(small());
        encoder.append(&9u16).unwrap().append(&table).unwrap();

        let mut source = Decoder::from_encoder(&encoder).unwrap();
        assert_eq!(source.extract::<u16>().unwrap(), 9);
        let remaining = source.remaining();

        let mut target = Decoder::from_bytes(b"stale").unwrap();
        target.move_from(&mut source);

        assert_eq!(source.remaining(), 0);
        assert!(source.is_exhausted());
        assert_eq!(target.remaining(), remaining);
        assert_eq!(target.extract_map::<BTreeMap<u8, String>>().unwrap(), table);
    }

    #[traced_test]
    #[test]
    fn test_refill_is_traced() {
        let bytes = crate::to_vec(&12345u32).unwrap();
        let config = ArchiveConfig::new().refill_chunk(2);
        let mut decoder = Decoder::with_source_and_config(&bytes[..], config);
        assert_eq!(decoder.extract::<u32>().unwrap(), 12345);
        assert!(logs_contain("archive refilled"));
    }
}
