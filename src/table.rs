//! Logical range → block span arithmetic.
//!
//! Every non-final block of a file holds exactly `block_size` uncompressed
//! bytes, so the block covering a logical offset is plain integer division.
//! A range `[start, end)` touches blocks `start / block_size` through
//! `(end - 1) / block_size` inclusive, each clamped to the intersection of
//! the request and the block's own span.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RangeError {
    #[error("Range [{start}, {end}) exceeds file size {size}")]
    OutOfRange { start: u64, end: u64, size: u64 },
    #[error("Range start {start} is past range end {end}")]
    Inverted { start: u64, end: u64 },
    #[error("Block size must be non-zero")]
    ZeroBlockSize,
}

/// One block's contribution to a resolved range: the intra-block byte span
/// `[start, end)` of block `block_index` that the caller must copy out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan {
    pub block_index: u32,
    pub start:       u32,
    pub end:         u32,
}

/// Pure mapping from a file's logical byte space to its block indices.
///
/// Holds no descriptors and does no I/O; the archive reader pairs each
/// resolved [`BlockSpan`] with the matching on-disk descriptor.
#[derive(Debug, Clone, Copy)]
pub struct BlockTable {
    block_size:        u32,
    uncompressed_size: u64,
}

impl BlockTable {
    pub fn new(block_size: u32, uncompressed_size: u64) -> Result<Self, RangeError> {
        if block_size == 0 {
            return Err(RangeError::ZeroBlockSize);
        }
        Ok(Self { block_size, uncompressed_size })
    }

    pub fn block_size(&self) -> u32 { self.block_size }

    pub fn uncompressed_size(&self) -> u64 { self.uncompressed_size }

    /// Number of blocks the file occupies (zero for an empty file).
    pub fn block_count(&self) -> u32 {
        self.uncompressed_size.div_ceil(self.block_size as u64) as u32
    }

    /// Uncompressed length of block `index` — `block_size` for every block
    /// except a short final one.
    pub fn block_length(&self, index: u32) -> u32 {
        let start = index as u64 * self.block_size as u64;
        let remaining = self.uncompressed_size.saturating_sub(start);
        remaining.min(self.block_size as u64) as u32
    }

    /// Resolve `[start, end)` to the ordered block spans covering it.
    ///
    /// An empty range resolves to an empty span list, including on zero-block
    /// files; a range reaching past `uncompressed_size` is rejected.
    pub fn resolve(&self, start: u64, end: u64) -> Result<Vec<BlockSpan>, RangeError> {
        if start > end {
            return Err(RangeError::Inverted { start, end });
        }
        if end > self.uncompressed_size {
            return Err(RangeError::OutOfRange { start, end, size: self.uncompressed_size });
        }
        if start == end {
            return Ok(Vec::new());
        }

        let bs = self.block_size as u64;
        let first = start / bs;
        let last  = (end - 1) / bs;

        let mut spans = Vec::with_capacity((last - first + 1) as usize);
        for index in first..=last {
            let block_start = index * bs;
            let block_end   = (block_start + bs).min(self.uncompressed_size);
            spans.push(BlockSpan {
                block_index: index as u32,
                start: (start.max(block_start) - block_start) as u32,
                end:   (end.min(block_end) - block_start) as u32,
            });
        }
        Ok(spans)
    }
}
