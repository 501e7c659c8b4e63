//! Per-file seekable read stream over an open archive.
//!
//! An [`EntryStream`] borrows the archive's byte source exclusively for its
//! lifetime, which is also what serializes access to a shared source: two
//! simultaneous streams over one handle cannot exist without external
//! synchronization.  Each read resolves the requested logical range to block
//! spans, decodes only the touched blocks, and copies out the requested
//! slices.  The most recently decoded block is kept, so sequential small
//! reads inside one block decode it once.
//!
//! Reads clamp at end of file: a read at or past `len()` returns zero bytes,
//! matching ordinary stream end-of-data semantics.  Seeking past the end is
//! legal and simply yields empty reads.

use std::io::{self, Read, Seek, SeekFrom};
use thiserror::Error;
use tracing::trace;

use crate::block::{decode_block, BlockDescriptor, BlockError};
use crate::table::{BlockTable, RangeError};

#[derive(Error, Debug)]
pub enum StreamError {
    /// The stream was closed; no further reads or seeks are possible.
    #[error("Stream is closed")]
    Closed,
    /// The resolved block has no descriptor — the index and the table
    /// disagree about this file's extent.
    #[error("No descriptor for block {block}")]
    MissingDescriptor { block: u32 },
    #[error(transparent)]
    Range(#[from] RangeError),
    #[error(transparent)]
    Block(#[from] BlockError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub struct EntryStream<'a, R: Read + Seek> {
    source:      &'a mut R,
    table:       BlockTable,
    /// This file's slice of the descriptor table, loaded at open time.
    descriptors: Vec<BlockDescriptor>,
    key:         Option<[u8; 32]>,
    position:    u64,
    /// Single-entry MRU cache: (block index, decoded bytes).
    cache:       Option<(u32, Vec<u8>)>,
    open:        bool,
}

impl<'a, R: Read + Seek> EntryStream<'a, R> {
    pub(crate) fn new(
        source:      &'a mut R,
        table:       BlockTable,
        descriptors: Vec<BlockDescriptor>,
        key:         Option<[u8; 32]>,
    ) -> Self {
        Self { source, table, descriptors, key, position: 0, cache: None, open: true }
    }

    /// Total uncompressed length of the entry.
    pub fn len(&self) -> u64 {
        self.table.uncompressed_size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current logical position (may be past the end after a long seek).
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Close the stream and drop the decode cache.  Idempotent; any
    /// subsequent read or seek fails with [`StreamError::Closed`].
    pub fn close(&mut self) {
        self.open = false;
        self.cache = None;
    }

    /// Positioned read: fill `buf` from logical offset `offset`.
    ///
    /// Returns the number of bytes copied, clamped to the bytes available
    /// between `offset` and end of file.  A read at or past the end returns
    /// zero, never an error.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, StreamError> {
        if !self.open {
            return Err(StreamError::Closed);
        }
        let size = self.len();
        if offset >= size || buf.is_empty() {
            return Ok(0);
        }

        let count = (buf.len() as u64).min(size - offset) as usize;
        let spans = self.table.resolve(offset, offset + count as u64)?;

        let mut written = 0usize;
        for span in spans {
            let block = self.decoded_block(span.block_index)?;
            let slice = &block[span.start as usize..span.end as usize];
            buf[written..written + slice.len()].copy_from_slice(slice);
            written += slice.len();
        }
        debug_assert_eq!(written, count);
        Ok(count)
    }

    /// Fetch a block's decoded bytes, via the MRU cache when possible.
    fn decoded_block(&mut self, index: u32) -> Result<&[u8], StreamError> {
        if self.cache.as_ref().map(|(i, _)| *i) != Some(index) {
            let desc = *self
                .descriptors
                .get(index as usize)
                .ok_or(StreamError::MissingDescriptor { block: index })?;
            trace!(block = index, offset = desc.physical_offset, "decoding block");

            // The descriptor's own length field must agree with the block
            // arithmetic before it is trusted as the decode contract.
            let expected = self.table.block_length(index);
            if desc.uncompressed_length != expected {
                return Err(BlockError::LengthMismatch {
                    expected,
                    actual: desc.uncompressed_length,
                }
                .into());
            }

            self.source.seek(SeekFrom::Start(desc.physical_offset))?;
            let mut stored = vec![0u8; desc.stored_length as usize];
            self.source.read_exact(&mut stored)?;

            let raw = decode_block(
                &stored,
                desc.flags,
                desc.checksum,
                desc.uncompressed_length,
                self.key.as_ref(),
            )?;
            self.cache = Some((index, raw));
        }
        Ok(&self.cache.as_ref().unwrap().1)
    }
}

impl<R: Read + Seek> Read for EntryStream<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self
            .read_at(self.position, buf)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.position += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for EntryStream<'_, R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if !self.open {
            return Err(io::Error::new(io::ErrorKind::Other, StreamError::Closed));
        }
        let target = match pos {
            SeekFrom::Start(n)   => Some(n),
            SeekFrom::End(d)     => self.len().checked_add_signed(d),
            SeekFrom::Current(d) => self.position.checked_add_signed(d),
        };
        match target {
            Some(n) => {
                self.position = n;
                Ok(n)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative or overflowing position",
            )),
        }
    }
}
