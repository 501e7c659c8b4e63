//! Archive builder.
//!
//! [`PackageWriter`] stages whole files in memory and emits the archive in one
//! `build` pass: a reserved header, every file's encoded blocks, the
//! descriptor table, the obscured file index, and finally the real header
//! patched in place at offset 0.  Archives are immutable once built — a
//! changed file means rebuilding the archive.

use std::io::{self, Seek, SeekFrom, Write};
use thiserror::Error;
use tracing::debug;

use crate::block::{encode_block, BlockDescriptor, BlockError};
use crate::codec::{Compression, DEFAULT_COMPRESSION_LEVEL};
use crate::crypto::{CryptoError, Encryption};
use crate::header::{ArchiveHeader, HEADER_SIZE};
use crate::index::{FileIndex, FileIndexEntry, IndexError};

/// Default block size: 64 KiB of uncompressed bytes per block.
pub const DEFAULT_BLOCK_SIZE: u32 = 64 * 1024;

#[derive(Error, Debug)]
pub enum WriterError {
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Block(#[from] BlockError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("Block size must be non-zero")]
    ZeroBlockSize,
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Configuration for [`PackageWriter`].
#[derive(Debug, Clone)]
pub struct PackOptions {
    pub compression: Compression,
    pub encryption:  Encryption,
    pub level:       i32,
    /// Uncompressed bytes per block; every block of every file except a short
    /// final one holds exactly this many.
    pub block_size:  u32,
    /// Required when `encryption` is not `None`.
    pub key:         Option<[u8; 32]>,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            compression: Compression::Zstd,
            encryption:  Encryption::None,
            level:       DEFAULT_COMPRESSION_LEVEL,
            block_size:  DEFAULT_BLOCK_SIZE,
            key:         None,
        }
    }
}

pub struct PackageWriter {
    options: PackOptions,
    staged:  Vec<(String, Vec<u8>)>,
}

impl PackageWriter {
    pub fn new(options: PackOptions) -> Result<Self, WriterError> {
        if options.block_size == 0 {
            return Err(WriterError::ZeroBlockSize);
        }
        if options.encryption != Encryption::None && options.key.is_none() {
            return Err(CryptoError::MissingKey.into());
        }
        Ok(Self { options, staged: Vec::new() })
    }

    /// Stage one logical file.
    ///
    /// Duplicate and over-long paths fail here, not at `build`, so authoring
    /// mistakes surface immediately.
    pub fn add_file(&mut self, path: impl Into<String>, data: impl Into<Vec<u8>>)
        -> Result<(), WriterError>
    {
        let path = path.into();
        if path.len() > u16::MAX as usize {
            return Err(IndexError::PathTooLong { len: path.len() }.into());
        }
        if self.staged.iter().any(|(p, _)| *p == path) {
            return Err(IndexError::DuplicatePath(path).into());
        }
        debug!(path = %path, "staging file");
        self.staged.push((path, data.into()));
        Ok(())
    }

    pub fn staged_count(&self) -> usize {
        self.staged.len()
    }

    /// Finalize the archive into `sink`.
    ///
    /// Layout: `header | block payloads | descriptor table | file index`, with
    /// the header rewritten at offset 0 once the index locator is known.  An
    /// empty staged set yields a structurally valid, listable empty archive.
    pub fn build<W: Write + Seek>(&self, sink: &mut W) -> Result<(), WriterError> {
        let opts = &self.options;
        let key = opts.key.as_ref();

        sink.seek(SeekFrom::Start(0))?;
        sink.write_all(&[0u8; HEADER_SIZE])?; // reserved; overwritten below

        let mut descriptors: Vec<BlockDescriptor> = Vec::new();
        let mut index = FileIndex {
            block_size: opts.block_size,
            ..Default::default()
        };

        for (path, data) in &self.staged {
            let first_block = descriptors.len() as u32;

            for chunk in data.chunks(opts.block_size as usize) {
                let (stored, flags, checksum) =
                    encode_block(chunk, opts.compression, opts.encryption, key, opts.level)?;
                let physical_offset = sink.stream_position()?;
                sink.write_all(&stored)?;
                descriptors.push(BlockDescriptor {
                    physical_offset,
                    stored_length:       stored.len() as u32,
                    uncompressed_length: chunk.len() as u32,
                    flags,
                    checksum,
                });
            }

            index.push(FileIndexEntry {
                path:              path.clone(),
                first_block,
                block_count:       descriptors.len() as u32 - first_block,
                uncompressed_size: data.len() as u64,
            })?;
        }

        // Descriptor table, in strict write order.
        let table_offset = sink.stream_position()?;
        for desc in &descriptors {
            desc.write(&mut *sink)?;
        }
        index.table_offset = table_offset;
        index.table_count  = descriptors.len() as u32;

        // Obscured file index.
        let (index_bytes, index_flags) = index.to_wire()?;
        let index_offset = sink.stream_position()?;
        sink.write_all(&index_bytes)?;

        // Patch the header now that every offset is known.
        let mut header = ArchiveHeader::new();
        header.index_offset = index_offset;
        header.index_length = index_bytes.len() as u64;
        header.index_flags  = index_flags;
        sink.seek(SeekFrom::Start(0))?;
        header.write(&mut *sink)?;
        sink.flush()?;

        debug!(
            files = self.staged.len(),
            blocks = descriptors.len(),
            compression = opts.compression.name(),
            encryption = opts.encryption.name(),
            "archive built"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn duplicate_path_fails_at_add_time() {
        let mut writer = PackageWriter::new(PackOptions::default()).unwrap();
        writer.add_file("a.txt", b"one".to_vec()).unwrap();
        let err = writer.add_file("a.txt", b"two".to_vec()).unwrap_err();
        assert!(matches!(err, WriterError::Index(IndexError::DuplicatePath(_))));
        assert_eq!(writer.staged_count(), 1);
    }

    #[test]
    fn overlong_path_fails_at_add_time() {
        // The on-disk length prefix is a u16; a longer path must be rejected
        // up front, not truncated into an archive that cannot be reopened.
        let mut writer = PackageWriter::new(PackOptions::default()).unwrap();
        let err = writer.add_file("x".repeat(80_000), b"data".to_vec()).unwrap_err();
        assert!(matches!(err, WriterError::Index(IndexError::PathTooLong { len: 80_000 })));
        assert_eq!(writer.staged_count(), 0);
    }

    #[test]
    fn encryption_without_key_fails_at_construction() {
        let opts = PackOptions { encryption: Encryption::Aes, ..Default::default() };
        assert!(matches!(
            PackageWriter::new(opts),
            Err(WriterError::Crypto(CryptoError::MissingKey))
        ));
    }

    #[test]
    fn zero_block_size_fails_at_construction() {
        let opts = PackOptions { block_size: 0, ..Default::default() };
        assert!(matches!(PackageWriter::new(opts), Err(WriterError::ZeroBlockSize)));
    }

    #[test]
    fn empty_build_is_structurally_valid() {
        let writer = PackageWriter::new(PackOptions::default()).unwrap();
        let mut sink = Cursor::new(Vec::new());
        writer.build(&mut sink).unwrap();

        sink.set_position(0);
        let header = crate::header::ArchiveHeader::read(&mut sink).unwrap();
        assert_eq!(header.index_offset, HEADER_SIZE as u64);
        assert!(header.index_length > 0);
    }
}
