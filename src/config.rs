//! Archive tuning knobs

use crate::SCRATCH_CAPACITY;

/// Sizing parameters shared by encoders and decoders
///
/// Both values are clamped to `1..=SCRATCH_CAPACITY`; the scratch region is
/// always embedded at full capacity, the limit only controls how much of it
/// is used before spilling to the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveConfig {
    scratch_limit: usize,
    refill_chunk: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            scratch_limit: SCRATCH_CAPACITY,
            refill_chunk: SCRATCH_CAPACITY,
        }
    }
}

impl ArchiveConfig {
    /// Create a config with full scratch capacity
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of scratch bytes used before spilling to the heap
    #[inline]
    pub fn scratch_limit(mut self, limit: usize) -> Self {
        self.scratch_limit = clamp(limit);
        self
    }

    /// Maximum bytes pulled from a source channel per refill
    #[inline]
    pub fn refill_chunk(mut self, chunk: usize) -> Self {
        self.refill_chunk = clamp(chunk);
        self
    }

    /// Effective scratch limit
    #[inline]
    pub fn scratch(&self) -> usize {
        self.scratch_limit
    }

    /// Effective refill chunk, never larger than the scratch limit
    #[inline]
    pub fn chunk(&self) -> usize {
        self.refill_chunk.min(self.scratch_limit)
    }
}

#[inline]
fn clamp(value: usize) -> usize {
    value.clamp(1, SCRATCH_CAPACITY)
}
