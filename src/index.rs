//! File index — the archive's directory.
//!
//! Maps each logical path to its slice of the descriptor table plus total
//! uncompressed size, and carries the archive-wide block size and the
//! descriptor table locator.  On disk the whole serialized index is obscured
//! with the fixed format key (repeating-key XOR) — see
//! [`crate::crypto::INDEX_OBFUSCATION_KEY`] for why this is explicitly not a
//! confidentiality mechanism.
//!
//! Wire layout of the plaintext (little-endian):
//! ```text
//! block_size    u32
//! table_offset  u64
//! table_count   u32
//! entry_count   u32
//! entry_count × { path_len u16, path (UTF-8), first_block u32,
//!                 block_count u32, uncompressed_size u64 }
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read};
use thiserror::Error;

use crate::block::{BlockError, BlockFlags};
use crate::codec::Compression;
use crate::crypto::{self, CryptoError, Encryption, INDEX_OBFUSCATION_KEY};

#[derive(Error, Debug)]
pub enum IndexError {
    /// Paths are unique within an archive; raised at staging time.
    #[error("Duplicate path in archive: {0}")]
    DuplicatePath(String),
    /// The path length prefix on disk is a u16; longer paths are rejected at
    /// staging time rather than truncated into an unreadable archive.
    #[error("Path length {len} exceeds the 65535-byte limit")]
    PathTooLong { len: usize },
    #[error("Index entry '{path}' references {block_count} block(s) from {first_block}, beyond table length {table_count}")]
    EntryOutOfBounds { path: String, first_block: u32, block_count: u32, table_count: u32 },
    /// Entry's block count disagrees with its size at the archive block size.
    /// Trusting either value would send reads past the descriptor slice.
    #[error("Index entry '{path}' claims {block_count} block(s) but its size requires {expected}")]
    BlockCountMismatch { path: String, block_count: u32, expected: u32 },
    #[error("Index block size must be non-zero")]
    ZeroBlockSize,
    #[error("Index entry path is not valid UTF-8")]
    InvalidPath,
    #[error("Malformed index flags: {0}")]
    BadFlags(#[from] BlockError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// One directory entry: a path and its slice of the descriptor table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIndexEntry {
    /// Archive-relative, forward-slash separated, unique.
    pub path:              String,
    pub first_block:       u32,
    pub block_count:       u32,
    pub uncompressed_size: u64,
}

#[derive(Debug, Clone, Default)]
pub struct FileIndex {
    /// Writer's block size, shared by every file in the archive.
    pub block_size:   u32,
    /// Absolute offset of the descriptor table region.
    pub table_offset: u64,
    /// Total descriptors in the table.
    pub table_count:  u32,
    pub entries:      Vec<FileIndexEntry>,
}

impl FileIndex {
    /// Append an entry, rejecting duplicate and over-long paths immediately.
    pub fn push(&mut self, entry: FileIndexEntry) -> Result<(), IndexError> {
        if entry.path.len() > u16::MAX as usize {
            return Err(IndexError::PathTooLong { len: entry.path.len() });
        }
        if self.entries.iter().any(|e| e.path == entry.path) {
            return Err(IndexError::DuplicatePath(entry.path));
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn lookup(&self, path: &str) -> Option<&FileIndexEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.path.as_str())
    }

    /// Check every entry's table slice against the table length, and its
    /// block count against its size.  Runs on both serialize and parse so a
    /// tampered index is rejected at open time, before any read can walk
    /// off the descriptor slice.
    fn validate(&self) -> Result<(), IndexError> {
        if self.block_size == 0 {
            return Err(IndexError::ZeroBlockSize);
        }
        for e in &self.entries {
            let end = e.first_block as u64 + e.block_count as u64;
            if end > self.table_count as u64 {
                return Err(IndexError::EntryOutOfBounds {
                    path:        e.path.clone(),
                    first_block: e.first_block,
                    block_count: e.block_count,
                    table_count: self.table_count,
                });
            }
            let expected = e.uncompressed_size.div_ceil(self.block_size as u64) as u32;
            if e.block_count != expected {
                return Err(IndexError::BlockCountMismatch {
                    path:        e.path.clone(),
                    block_count: e.block_count,
                    expected,
                });
            }
        }
        Ok(())
    }

    fn to_plain_bytes(&self) -> Result<Vec<u8>, IndexError> {
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(self.block_size)?;
        buf.write_u64::<LittleEndian>(self.table_offset)?;
        buf.write_u32::<LittleEndian>(self.table_count)?;
        buf.write_u32::<LittleEndian>(self.entries.len() as u32)?;
        for e in &self.entries {
            buf.write_u16::<LittleEndian>(e.path.len() as u16)?;
            buf.extend_from_slice(e.path.as_bytes());
            buf.write_u32::<LittleEndian>(e.first_block)?;
            buf.write_u32::<LittleEndian>(e.block_count)?;
            buf.write_u64::<LittleEndian>(e.uncompressed_size)?;
        }
        Ok(buf)
    }

    fn from_plain_bytes(bytes: &[u8]) -> Result<Self, IndexError> {
        let mut reader = bytes;
        let block_size   = reader.read_u32::<LittleEndian>()?;
        let table_offset = reader.read_u64::<LittleEndian>()?;
        let table_count  = reader.read_u32::<LittleEndian>()?;
        let entry_count  = reader.read_u32::<LittleEndian>()?;

        let mut index = FileIndex {
            block_size,
            table_offset,
            table_count,
            entries: Vec::with_capacity(entry_count as usize),
        };
        for _ in 0..entry_count {
            let path_len = reader.read_u16::<LittleEndian>()? as usize;
            let mut path_bytes = vec![0u8; path_len];
            reader.read_exact(&mut path_bytes)?;
            let path = String::from_utf8(path_bytes).map_err(|_| IndexError::InvalidPath)?;
            let entry = FileIndexEntry {
                path,
                first_block:       reader.read_u32::<LittleEndian>()?,
                block_count:       reader.read_u32::<LittleEndian>()?,
                uncompressed_size: reader.read_u64::<LittleEndian>()?,
            };
            index.push(entry)?;
        }
        index.validate()?;
        Ok(index)
    }

    /// Serialize and obscure the index for writing.
    ///
    /// Returns the on-disk bytes and the packed flags word the header records
    /// for the index region.
    pub fn to_wire(&self) -> Result<(Vec<u8>, u32), IndexError> {
        self.validate()?;
        let plain = self.to_plain_bytes()?;
        let obscured = crypto::encrypt(
            Encryption::Xor,
            Some(&INDEX_OBFUSCATION_KEY),
            &plain,
        )?;
        let flags = BlockFlags::new(Compression::None, Encryption::Xor).pack();
        Ok((obscured, flags))
    }

    /// Reverse [`FileIndex::to_wire`], selecting the cipher recorded in the
    /// header's index flags word.
    pub fn from_wire(bytes: &[u8], flags_word: u32) -> Result<Self, IndexError> {
        let flags = BlockFlags::unpack(flags_word)?;
        let plain = crypto::decrypt(
            flags.encryption,
            Some(&INDEX_OBFUSCATION_KEY),
            bytes,
        )?;
        Self::from_plain_bytes(&plain)
    }
}
