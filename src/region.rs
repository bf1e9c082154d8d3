//! Scratch + heap storage shared by encoders and decoders
//!
//! The archive content is one logical byte sequence split over two physical
//! regions: the first `scratch_len` bytes live in an inline scratch array,
//! everything after that lives in a heap `Vec`. Appends fill the scratch up to
//! the configured limit and only then touch the heap, so archives that stay
//! small never allocate.

use std::borrow::Cow;
use std::fmt;
use std::mem;

use tracing::debug;

use crate::config::ArchiveConfig;
use crate::error::{Error, Result};
use crate::SCRATCH_CAPACITY;

/// Inline scratch region followed by a growable heap region
pub(crate) struct Regions {
    scratch: [u8; SCRATCH_CAPACITY],
    scratch_len: usize,
    heap: Vec<u8>,
    config: ArchiveConfig,
}

impl Regions {
    #[inline]
    pub fn new(config: ArchiveConfig) -> Self {
        Self {
            scratch: [0u8; SCRATCH_CAPACITY],
            scratch_len: 0,
            heap: Vec::new(),
            config,
        }
    }

    /// Build regions holding a copy of `parts`, in order
    pub fn copied(config: ArchiveConfig, parts: &[&[u8]]) -> Result<Self> {
        let mut regions = Self::new(config);
        regions.extend(parts)?;
        Ok(regions)
    }

    #[inline]
    pub fn config(&self) -> ArchiveConfig {
        self.config
    }

    /// Logical length: scratch bytes plus heap bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.scratch_len + self.heap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn has_spilled(&self) -> bool {
        !self.heap.is_empty()
    }

    #[inline]
    fn scratch_free(&self) -> usize {
        self.config.scratch() - self.scratch_len
    }

    /// Guarantee that `n` more bytes can be appended without reallocating
    pub fn ensure_write_capacity(&mut self, n: usize) -> Result<()> {
        let free = self.scratch_free();
        if n <= free {
            return Ok(());
        }

        let overflow = n - free;
        let required = self
            .heap
            .len()
            .checked_add(overflow)
            .ok_or(Error::Allocation {
                requested: usize::MAX,
            })?;
        if required <= self.heap.capacity() {
            return Ok(());
        }

        let target = required.saturating_add(required / 2);
        if self.heap.capacity() == 0 {
            debug!(
                scratch_len = self.scratch_len,
                heap_capacity = target,
                "archive spilled to heap"
            );
        }
        self.heap
            .try_reserve_exact(target - self.heap.len())
            .map_err(|_| Error::Allocation { requested: target })
    }

    /// Append `parts` back to back, filling the scratch before the heap
    pub fn extend(&mut self, parts: &[&[u8]]) -> Result<()> {
        let total = parts
            .iter()
            .try_fold(0usize, |acc, part| acc.checked_add(part.len()))
            .ok_or(Error::Allocation {
                requested: usize::MAX,
            })?;
        self.ensure_write_capacity(total)?;

        for part in parts {
            let head = part.len().min(self.scratch_free());
            self.scratch[self.scratch_len..self.scratch_len + head].copy_from_slice(&part[..head]);
            self.scratch_len += head;
            self.heap.extend_from_slice(&part[head..]);
        }
        Ok(())
    }

    /// The two physical regions, scratch first
    #[inline]
    pub fn segments(&self) -> (&[u8], &[u8]) {
        (&self.scratch[..self.scratch_len], &self.heap)
    }

    /// Contiguous view of the content, copying only when the archive has spilled
    pub fn contiguous(&self) -> Cow<'_, [u8]> {
        let (scratch, heap) = self.segments();
        if heap.is_empty() {
            Cow::Borrowed(scratch)
        } else {
            let mut joined = Vec::with_capacity(self.len());
            joined.extend_from_slice(scratch);
            joined.extend_from_slice(heap);
            Cow::Owned(joined)
        }
    }

    /// Bytes from logical `offset` to the end of the region that holds it
    ///
    /// `offset` must not exceed [`Regions::len`].
    #[inline]
    pub fn segment_at(&self, offset: usize) -> &[u8] {
        if offset < self.scratch_len {
            &self.scratch[offset..self.scratch_len]
        } else {
            &self.heap[offset - self.scratch_len..]
        }
    }

    /// Replace the content with up to one refill chunk written by `fill`
    ///
    /// The heap is released; the caller must have consumed everything before.
    pub fn reload<F>(&mut self, fill: F) -> std::io::Result<usize>
    where
        F: FnOnce(&mut [u8]) -> std::io::Result<usize>,
    {
        if self.heap.capacity() > 0 {
            self.heap = Vec::new();
        }
        self.scratch_len = 0;
        let chunk = self.config.chunk();
        let read = fill(&mut self.scratch[..chunk])?;
        self.scratch_len = read.min(chunk);
        Ok(self.scratch_len)
    }

    /// Forget the content but keep the heap allocation for reuse
    #[inline]
    pub fn rewind(&mut self) {
        self.scratch_len = 0;
        self.heap.clear();
    }

    /// Forget the content and release the heap
    #[inline]
    pub fn reset(&mut self) {
        self.scratch_len = 0;
        self.heap = Vec::new();
    }

    /// Take over `other`'s content; the heap changes owner without copying
    pub fn move_from(&mut self, other: &mut Regions) {
        self.config = other.config;
        self.scratch[..other.scratch_len].copy_from_slice(&other.scratch[..other.scratch_len]);
        self.scratch_len = other.scratch_len;
        self.heap = mem::take(&mut other.heap);
        other.reset();
    }
}

impl fmt::Debug for Regions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Regions")
            .field("scratch_len", &self.scratch_len)
            .field("heap_len", &self.heap.len())
            .field("heap_capacity", &self.heap.capacity())
            .field("config", &self.config)
            .finish()
    }
}
