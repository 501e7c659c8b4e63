//! High-level [`Archive`] read API — the primary embedding surface.
//!
//! ```no_run
//! use bpak::archive::Archive;
//! use bpak::writer::{PackOptions, PackageWriter};
//! use std::io::Cursor;
//!
//! // Write
//! let mut writer = PackageWriter::new(PackOptions::default())?;
//! writer.add_file("readme.txt", b"Hello, world!".to_vec())?;
//! let mut buf = Cursor::new(Vec::new());
//! writer.build(&mut buf)?;
//!
//! // Read
//! let mut ar = Archive::open(buf)?;
//! let data = ar.read_file("readme.txt")?;
//! assert_eq!(data, b"Hello, world!");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Opening parses the header and decodes the obscured file index once; both
//! stay in memory for the handle's lifetime.  A file's descriptor slice is
//! loaded lazily, on the first [`Archive::open_file`] for that path.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::block::{BlockDescriptor, BlockError, DESCRIPTOR_SIZE};
use crate::header::{ArchiveHeader, HeaderError};
use crate::index::{FileIndex, FileIndexEntry, IndexError};
use crate::stream::{EntryStream, StreamError};
use crate::table::{BlockTable, RangeError};

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("File not found in archive: {0}")]
    FileNotFound(String),
    #[error(transparent)]
    Header(#[from] HeaderError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Block(#[from] BlockError),
    #[error(transparent)]
    Range(#[from] RangeError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub struct Archive<R: Read + Seek> {
    source: R,
    header: ArchiveHeader,
    index:  FileIndex,
    key:    Option<[u8; 32]>,
}

impl Archive<File> {
    /// Open an archive file on disk.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, ArchiveError> {
        Self::open(File::open(path)?)
    }

    /// Open an archive file whose blocks were encrypted with `key`.
    pub fn open_path_with_key<P: AsRef<Path>>(path: P, key: [u8; 32])
        -> Result<Self, ArchiveError>
    {
        Self::open_with_key(File::open(path)?, Some(key))
    }
}

impl<R: Read + Seek> Archive<R> {
    /// Open an archive over any seekable byte source.
    ///
    /// Parses the header and the file index up front; a corrupt header fails
    /// fast here rather than surfacing later mid-read.
    pub fn open(source: R) -> Result<Self, ArchiveError> {
        Self::open_with_key(source, None)
    }

    pub fn open_with_key(mut source: R, key: Option<[u8; 32]>) -> Result<Self, ArchiveError> {
        source.seek(SeekFrom::Start(0))?;
        let header = ArchiveHeader::read(&mut source)?;

        // Bound the index locator against the source before trusting its
        // length for an allocation.
        let size = source.seek(SeekFrom::End(0))?;
        match header.index_offset.checked_add(header.index_length) {
            Some(end) if end <= size => {}
            _ => {
                return Err(HeaderError::IndexOutOfBounds {
                    offset: header.index_offset,
                    length: header.index_length,
                    size,
                }
                .into())
            }
        }

        source.seek(SeekFrom::Start(header.index_offset))?;
        let mut index_bytes = vec![0u8; header.index_length as usize];
        source.read_exact(&mut index_bytes)?;
        let index = FileIndex::from_wire(&index_bytes, header.index_flags)?;

        debug!(files = index.entries.len(), block_size = index.block_size, "archive opened");
        Ok(Self { source, header, index, key })
    }

    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    /// Writer-configured block size shared by every file in this archive.
    pub fn block_size(&self) -> u32 {
        self.index.block_size
    }

    /// Logical paths in the archive, in write order.
    pub fn list(&self) -> Vec<String> {
        self.index.paths().map(str::to_owned).collect()
    }

    pub fn stat(&self, path: &str) -> Option<&FileIndexEntry> {
        self.index.lookup(path)
    }

    /// Open one entry for random-access reading.
    ///
    /// The returned stream borrows this handle exclusively, so reads through
    /// it are serialized against the shared byte source by construction.
    pub fn open_file(&mut self, path: &str) -> Result<EntryStream<'_, R>, ArchiveError> {
        let entry = self
            .index
            .lookup(path)
            .ok_or_else(|| ArchiveError::FileNotFound(path.to_owned()))?
            .clone();

        let table = BlockTable::new(self.index.block_size, entry.uncompressed_size)?;
        let descriptors = self.load_descriptors(entry.first_block, entry.block_count)?;
        Ok(EntryStream::new(&mut self.source, table, descriptors, self.key))
    }

    /// Read one entry in full.
    pub fn read_file(&mut self, path: &str) -> Result<Vec<u8>, ArchiveError> {
        let mut stream = self.open_file(path)?;
        let mut out = vec![0u8; stream.len() as usize];
        let n = stream.read_at(0, &mut out)?;
        debug_assert_eq!(n as u64, stream.len());
        Ok(out)
    }

    /// Load one file's slice of the descriptor table.  Descriptors are fixed
    /// size, so the slice is a single positioned read.
    fn load_descriptors(&mut self, first_block: u32, block_count: u32)
        -> Result<Vec<BlockDescriptor>, ArchiveError>
    {
        let offset = self.index.table_offset + first_block as u64 * DESCRIPTOR_SIZE;
        self.source.seek(SeekFrom::Start(offset))?;

        let mut descriptors = Vec::with_capacity(block_count as usize);
        for _ in 0..block_count {
            descriptors.push(BlockDescriptor::read(&mut self.source)?);
        }
        Ok(descriptors)
    }
}
