//! Block-level wire format: the flags word, the on-disk descriptor, and the
//! encode/decode transform for a single block.
//!
//! Encode order is compress-then-encrypt; decode order is decrypt-then-
//! decompress.  The CRC-32 checksum covers the final STORED bytes, so
//! corruption is detected before any ciphertext or compressed data reaches a
//! backend.  Both orderings are a hard format contract.
//!
//! All integers are little-endian.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;
use std::io::{self, Read, Write};
use thiserror::Error;

use crate::codec::{get_codec, CodecError, Compression};
use crate::crypto::{self, CryptoError, Encryption};

/// Current block format revision written into every flags word.
pub const BLOCK_FORMAT_MAJOR: u8 = 1;
pub const BLOCK_FORMAT_MINOR: u8 = 0;

/// Serialized size of one [`BlockDescriptor`] in bytes.
pub const DESCRIPTOR_SIZE: u64 = 24;

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum BlockError {
    /// CRC of the stored bytes does not match the descriptor.  Raised before
    /// any decrypt/decompress attempt.
    #[error("Block checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    HashMismatch { expected: u32, actual: u32 },
    /// Decoded byte count differs from the descriptor's uncompressed length.
    /// A mismatch is a fatal integrity failure, never a warning.
    #[error("Block length mismatch: expected {expected} bytes, decoded {actual}")]
    LengthMismatch { expected: u32, actual: u32 },
    /// The descriptor's present bit is clear — the block was deleted.
    #[error("Block is tombstoned")]
    Tombstoned,
    /// Block format major revision above what this build understands.
    #[error("Unsupported block format revision {major}.{minor}")]
    UnsupportedRevision { major: u8, minor: u8 },
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── BlockFlags ───────────────────────────────────────────────────────────────

/// Typed view of the 32-bit flags word.
///
/// Wire layout (bit ranges within the u32):
/// ```text
/// bit  0       present (0 = tombstone)
/// bits 4..8    compression wire id
/// bits 8..12   encryption wire id
/// bits 16..24  format minor revision
/// bits 24..32  format major revision
/// ```
/// All pack/unpack goes through this struct; call sites never touch raw masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockFlags {
    pub present:     bool,
    pub compression: Compression,
    pub encryption:  Encryption,
    pub minor:       u8,
    pub major:       u8,
}

impl BlockFlags {
    /// Flags for a freshly written block with the current format revision.
    pub fn new(compression: Compression, encryption: Encryption) -> Self {
        Self {
            present: true,
            compression,
            encryption,
            minor: BLOCK_FORMAT_MINOR,
            major: BLOCK_FORMAT_MAJOR,
        }
    }

    /// Pack into the 32-bit wire representation.
    pub fn pack(self) -> u32 {
        (self.present as u32)
            | ((self.compression.wire_id() as u32) << 4)
            | ((self.encryption.wire_id() as u32) << 8)
            | ((self.minor as u32) << 16)
            | ((self.major as u32) << 24)
    }

    /// Unpack a wire flags word, rejecting algorithm ids and major revisions
    /// this build does not understand.  A higher minor revision is accepted
    /// (forward compatible within a major).
    pub fn unpack(word: u32) -> Result<Self, BlockError> {
        let comp_id = ((word >> 4) & 0x0f) as u8;
        let enc_id  = ((word >> 8) & 0x0f) as u8;
        let minor   = ((word >> 16) & 0xff) as u8;
        let major   = ((word >> 24) & 0xff) as u8;

        if major > BLOCK_FORMAT_MAJOR {
            return Err(BlockError::UnsupportedRevision { major, minor });
        }
        let compression = Compression::from_wire_id(comp_id)
            .ok_or(CodecError::Unsupported(comp_id))?;
        let encryption = Encryption::from_wire_id(enc_id)
            .ok_or(CryptoError::Unsupported(enc_id))?;

        Ok(Self {
            present: word & 1 != 0,
            compression,
            encryption,
            minor,
            major,
        })
    }
}

// ── BlockDescriptor ──────────────────────────────────────────────────────────

/// On-disk metadata for one stored block.  Fixed 24-byte layout so a reader
/// can seek straight to any file's descriptor slice within the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockDescriptor {
    pub physical_offset:     u64,
    pub stored_length:       u32,
    pub uncompressed_length: u32,
    pub flags:               u32,
    pub checksum:            u32,
}

impl BlockDescriptor {
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u64::<LittleEndian>(self.physical_offset)?;
        writer.write_u32::<LittleEndian>(self.stored_length)?;
        writer.write_u32::<LittleEndian>(self.uncompressed_length)?;
        writer.write_u32::<LittleEndian>(self.flags)?;
        writer.write_u32::<LittleEndian>(self.checksum)?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        Ok(Self {
            physical_offset:     reader.read_u64::<LittleEndian>()?,
            stored_length:       reader.read_u32::<LittleEndian>()?,
            uncompressed_length: reader.read_u32::<LittleEndian>()?,
            flags:               reader.read_u32::<LittleEndian>()?,
            checksum:            reader.read_u32::<LittleEndian>()?,
        })
    }
}

// ── Encode / decode ──────────────────────────────────────────────────────────

fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Transform one raw block into its stored form.
///
/// Returns the stored bytes, the packed flags word, and the CRC-32 of the
/// stored bytes.  The caller records all three in the block's descriptor.
pub fn encode_block(
    raw:         &[u8],
    compression: Compression,
    encryption:  Encryption,
    key:         Option<&[u8; 32]>,
    level:       i32,
) -> Result<(Vec<u8>, u32, u32), BlockError> {
    let compressed = get_codec(compression).compress(raw, level)?;
    let stored = crypto::encrypt(encryption, key, &compressed)?;
    let checksum = crc32(&stored);
    Ok((stored, BlockFlags::new(compression, encryption).pack(), checksum))
}

/// Reverse [`encode_block`] for one stored block.
///
/// Verification order is fixed: checksum over the stored bytes first, then
/// flags validation, then decrypt, decompress, and an exact length check.
pub fn decode_block(
    stored:            &[u8],
    flags_word:        u32,
    expected_checksum: u32,
    expected_length:   u32,
    key:               Option<&[u8; 32]>,
) -> Result<Vec<u8>, BlockError> {
    let actual = crc32(stored);
    if actual != expected_checksum {
        return Err(BlockError::HashMismatch { expected: expected_checksum, actual });
    }

    let flags = BlockFlags::unpack(flags_word)?;
    if !flags.present {
        return Err(BlockError::Tombstoned);
    }

    let compressed = crypto::decrypt(flags.encryption, key, stored)?;
    let raw = get_codec(flags.compression).decompress(&compressed)?;

    if raw.len() != expected_length as usize {
        return Err(BlockError::LengthMismatch {
            expected: expected_length,
            actual:   raw.len() as u32,
        });
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const KEY: [u8; 32] = [0xab; 32];

    #[test]
    fn flags_pack_unpack() {
        let flags = BlockFlags::new(Compression::Zstd, Encryption::Aes);
        let word = flags.pack();
        assert_eq!(BlockFlags::unpack(word).unwrap(), flags);
        assert_eq!(word & 1, 1);
    }

    #[test]
    fn unknown_algorithm_ids_fail() {
        // compression id 15 is unassigned
        let word = BlockFlags::new(Compression::None, Encryption::None).pack() | (15 << 4);
        assert!(matches!(
            BlockFlags::unpack(word),
            Err(BlockError::Codec(CodecError::Unsupported(15)))
        ));
        // encryption id 15 is unassigned
        let word = BlockFlags::new(Compression::None, Encryption::None).pack() | (15 << 8);
        assert!(matches!(
            BlockFlags::unpack(word),
            Err(BlockError::Crypto(CryptoError::Unsupported(15)))
        ));
    }

    #[test]
    fn future_major_revision_fails() {
        let word = BlockFlags::new(Compression::None, Encryption::None).pack()
            | ((BLOCK_FORMAT_MAJOR as u32 + 1) << 24);
        assert!(matches!(
            BlockFlags::unpack(word),
            Err(BlockError::UnsupportedRevision { .. })
        ));
    }

    #[test]
    fn higher_minor_revision_is_accepted() {
        let word = BlockFlags::new(Compression::Lz4, Encryption::None).pack()
            | ((BLOCK_FORMAT_MINOR as u32 + 3) << 16);
        let flags = BlockFlags::unpack(word).unwrap();
        assert_eq!(flags.minor, BLOCK_FORMAT_MINOR + 3);
    }

    #[test]
    fn corrupt_stored_byte_fails_before_decode() {
        let raw = b"payload that will be corrupted on disk".repeat(8);
        let (mut stored, flags, checksum) =
            encode_block(&raw, Compression::Zstd, Encryption::Xor, Some(&KEY), 3).unwrap();

        for i in [0, stored.len() / 2, stored.len() - 1] {
            stored[i] ^= 0x40;
            let err = decode_block(&stored, flags, checksum, raw.len() as u32, Some(&KEY))
                .unwrap_err();
            assert!(matches!(err, BlockError::HashMismatch { .. }));
            stored[i] ^= 0x40;
        }
    }

    #[test]
    fn wrong_expected_length_is_fatal() {
        let raw = b"short block";
        let (stored, flags, checksum) =
            encode_block(raw, Compression::None, Encryption::None, None, 0).unwrap();
        let err = decode_block(&stored, flags, checksum, raw.len() as u32 + 1, None)
            .unwrap_err();
        assert!(matches!(err, BlockError::LengthMismatch { .. }));
    }

    #[test]
    fn tombstoned_block_is_unreadable() {
        let raw = b"deleted";
        let (stored, flags, checksum) =
            encode_block(raw, Compression::None, Encryption::None, None, 0).unwrap();
        // Flags live in the descriptor, not the stored bytes, so the CRC
        // still passes and the tombstone check fires next.
        let err = decode_block(&stored, flags & !1, checksum, raw.len() as u32, None)
            .unwrap_err();
        assert!(matches!(err, BlockError::Tombstoned));
    }

    #[test]
    fn descriptor_wire_roundtrip() {
        let desc = BlockDescriptor {
            physical_offset:     0x1122334455667788,
            stored_length:       4096,
            uncompressed_length: 8192,
            flags:               BlockFlags::new(Compression::Lzma, Encryption::Xor).pack(),
            checksum:            0xdeadbeef,
        };
        let mut buf = Vec::new();
        desc.write(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, DESCRIPTOR_SIZE);
        assert_eq!(BlockDescriptor::read(&buf[..]).unwrap(), desc);
    }

    proptest! {
        #[test]
        fn encode_decode_roundtrip(
            raw in proptest::collection::vec(any::<u8>(), 0..4096),
            comp_idx in 0usize..5,
            enc_idx in 0usize..3,
        ) {
            let compression = [Compression::None, Compression::Deflate, Compression::Lz4,
                               Compression::Lzma, Compression::Zstd][comp_idx];
            let encryption = [Encryption::None, Encryption::Xor, Encryption::Aes][enc_idx];
            let key = (encryption != Encryption::None).then_some(&KEY);

            let (stored, flags, checksum) =
                encode_block(&raw, compression, encryption, key, 3).unwrap();
            let decoded =
                decode_block(&stored, flags, checksum, raw.len() as u32, key).unwrap();
            prop_assert_eq!(decoded, raw);
        }
    }
}
