//! Archive header — the fixed 32 bytes at offset 0.
//!
//! The header is reserved (zeroed) when a build starts and rewritten in place
//! once the index offsets are known, so a reader can always open an archive by
//! seeking to offset 0 first.  All fields are little-endian.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use thiserror::Error;

/// Format magic, the bytes `\x89BPK1\r\n\x1a` read as a little-endian u64.
/// The PNG-style frame catches text-mode mangling and truncation early.
pub const MAGIC: u64 = u64::from_le_bytes(*b"\x89BPK1\r\n\x1a");

/// Current archive format version.  Readers reject anything else.
pub const VERSION: u32 = 1;

/// Canonical file extension for archives of this format.
pub const EXTENSION: &str = "bpk";

/// Serialized header size in bytes.
pub const HEADER_SIZE: usize = 32;

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("Invalid magic number — not a .bpk archive")]
    InvalidMagic,
    #[error("Unsupported archive version: {0}")]
    UnsupportedVersion(u32),
    /// The header's index locator points past the end of the byte source.
    /// Caught before the index length is trusted for an allocation.
    #[error("Index region at {offset}+{length} exceeds archive size {size}")]
    IndexOutOfBounds { offset: u64, length: u64, size: u64 },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone)]
pub struct ArchiveHeader {
    pub magic:        u64,
    pub version:      u32,
    /// Absolute offset of the encrypted file index region.
    pub index_offset: u64,
    /// Byte length of the encrypted file index region.
    pub index_length: u64,
    /// Packed flags word of the file index region (records its obfuscation
    /// cipher, the same way block flags record per-block ciphers).
    pub index_flags:  u32,
}

impl ArchiveHeader {
    pub fn new() -> Self {
        Self {
            magic:        MAGIC,
            version:      VERSION,
            index_offset: 0,
            index_length: 0,
            index_flags:  0,
        }
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u64::<LittleEndian>(self.magic)?;
        writer.write_u32::<LittleEndian>(self.version)?;
        writer.write_u64::<LittleEndian>(self.index_offset)?;
        writer.write_u64::<LittleEndian>(self.index_length)?;
        writer.write_u32::<LittleEndian>(self.index_flags)?;
        Ok(())
    }

    /// Read and validate a header.  Unknown magic or version fails fast —
    /// the archive is not openable and nothing downstream is attempted.
    pub fn read<R: Read>(mut reader: R) -> Result<Self, HeaderError> {
        let magic = reader.read_u64::<LittleEndian>()?;
        if magic != MAGIC {
            return Err(HeaderError::InvalidMagic);
        }
        let version = reader.read_u32::<LittleEndian>()?;
        if version != VERSION {
            return Err(HeaderError::UnsupportedVersion(version));
        }
        let index_offset = reader.read_u64::<LittleEndian>()?;
        let index_length = reader.read_u64::<LittleEndian>()?;
        let index_flags  = reader.read_u32::<LittleEndian>()?;
        Ok(Self { magic, version, index_offset, index_length, index_flags })
    }
}

impl Default for ArchiveHeader {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_wire_roundtrip() {
        let mut header = ArchiveHeader::new();
        header.index_offset = 12345;
        header.index_length = 678;
        header.index_flags  = 0x0100_0100;

        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE);

        let back = ArchiveHeader::read(&buf[..]).unwrap();
        assert_eq!(back.index_offset, 12345);
        assert_eq!(back.index_length, 678);
        assert_eq!(back.index_flags, 0x0100_0100);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut buf = Vec::new();
        ArchiveHeader::new().write(&mut buf).unwrap();
        buf[0] ^= 0xff;
        assert!(matches!(ArchiveHeader::read(&buf[..]), Err(HeaderError::InvalidMagic)));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut header = ArchiveHeader::new();
        header.version = VERSION + 1;
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        assert!(matches!(
            ArchiveHeader::read(&buf[..]),
            Err(HeaderError::UnsupportedVersion(v)) if v == VERSION + 1
        ));
    }
}
