//! Compression backends and the wire registry that maps them to flag ids.
//!
//! # Identity rules
//! Every compression algorithm has a frozen 4-bit wire id that is packed into
//! each block's flags word on disk.  Wire ids are permanent: an id is NEVER
//! reused, even if a backend is deprecated.  A reader that encounters an id it
//! does not recognise MUST fail with [`CodecError::Unsupported`] — falling
//! back to another codec would silently produce garbage.
//!
//! Levels are advisory: backends that have no level knob (lz4, lzma) ignore
//! the value entirely.

use std::io::{self, Read, Write};
use thiserror::Error;

/// Default compression level (zstd scale).
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

// ── Wire ids (frozen, 4-bit field in the block flags word) ───────────────────

pub const WIRE_NONE:    u8 = 0;
pub const WIRE_DEFLATE: u8 = 1;
pub const WIRE_LZ4:     u8 = 2;
pub const WIRE_LZMA:    u8 = 3;
pub const WIRE_ZSTD:    u8 = 4;

// ── Compression enum ─────────────────────────────────────────────────────────

/// Runtime compression discriminant.  Carries the frozen wire id written into
/// every block's flags word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    Deflate,
    Lz4,
    Lzma,
    Zstd,
}

impl Compression {
    /// The frozen 4-bit wire id for this algorithm.
    #[inline]
    pub fn wire_id(self) -> u8 {
        match self {
            Compression::None    => WIRE_NONE,
            Compression::Deflate => WIRE_DEFLATE,
            Compression::Lz4     => WIRE_LZ4,
            Compression::Lzma    => WIRE_LZMA,
            Compression::Zstd    => WIRE_ZSTD,
        }
    }

    /// Resolve a wire id back to an algorithm.
    /// Returns `None` for ids this build does not recognise.
    pub fn from_wire_id(id: u8) -> Option<Self> {
        match id {
            WIRE_NONE    => Some(Compression::None),
            WIRE_DEFLATE => Some(Compression::Deflate),
            WIRE_LZ4     => Some(Compression::Lz4),
            WIRE_LZMA    => Some(Compression::Lzma),
            WIRE_ZSTD    => Some(Compression::Zstd),
            _            => None,
        }
    }

    /// Human-readable name (diagnostics only — never parsed from disk).
    pub fn name(self) -> &'static str {
        match self {
            Compression::None    => "none",
            Compression::Deflate => "deflate",
            Compression::Lz4     => "lz4",
            Compression::Lzma    => "lzma",
            Compression::Zstd    => "zstd",
        }
    }

    /// Parse from a CLI string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none"    => Some(Compression::None),
            "deflate" => Some(Compression::Deflate),
            "lz4"     => Some(Compression::Lz4),
            "lzma"    => Some(Compression::Lzma),
            "zstd"    => Some(Compression::Zstd),
            _         => None,
        }
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Decompression error: {0}")]
    Decompression(String),
    /// Emitted when a block names a compression wire id not available in this
    /// build.  Decoding MUST NOT continue.
    #[error("Unsupported compression algorithm id {0} — cannot decode")]
    Unsupported(u8),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Codec trait ──────────────────────────────────────────────────────────────

pub trait Codec: Send + Sync {
    fn compression(&self) -> Compression;
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError>;
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;
}

// ── Built-in codec implementations ──────────────────────────────────────────

pub struct NoneCodec;
impl Codec for NoneCodec {
    fn compression(&self) -> Compression { Compression::None }
    fn compress(&self, data: &[u8], _: i32) -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
    fn decompress(&self, data: &[u8])        -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
}

pub struct DeflateCodec;
impl Codec for DeflateCodec {
    fn compression(&self) -> Compression { Compression::Deflate }
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
        let level = flate2::Compression::new(level.clamp(0, 9) as u32);
        let mut enc = flate2::write::DeflateEncoder::new(Vec::new(), level);
        enc.write_all(data).map_err(|e| CodecError::Compression(e.to_string()))?;
        enc.finish().map_err(|e| CodecError::Compression(e.to_string()))
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        flate2::read::DeflateDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        Ok(out)
    }
}

pub struct Lz4Codec;
impl Codec for Lz4Codec {
    fn compression(&self) -> Compression { Compression::Lz4 }
    fn compress(&self, data: &[u8], _: i32) -> Result<Vec<u8>, CodecError> {
        Ok(lz4_flex::compress_prepend_size(data))
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        lz4_flex::decompress_size_prepended(data)
            .map_err(|e| CodecError::Decompression(e.to_string()))
    }
}

pub struct LzmaCodec;
impl Codec for LzmaCodec {
    fn compression(&self) -> Compression { Compression::Lzma }
    fn compress(&self, data: &[u8], _: i32) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        lzma_rs::lzma_compress(&mut std::io::Cursor::new(data), &mut out)
            .map_err(|e| CodecError::Compression(e.to_string()))?;
        Ok(out)
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        lzma_rs::lzma_decompress(&mut std::io::Cursor::new(data), &mut out)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        Ok(out)
    }
}

pub struct ZstdCodec;
impl Codec for ZstdCodec {
    fn compression(&self) -> Compression { Compression::Zstd }
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
        zstd::encode_all(data, level).map_err(|e| CodecError::Compression(e.to_string()))
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        zstd::decode_all(data).map_err(|e| CodecError::Decompression(e.to_string()))
    }
}

// ── Factory ──────────────────────────────────────────────────────────────────

/// Resolve a wire id to a built-in codec.
///
/// Returns `Err(CodecError::Unsupported)` for unknown ids.  The caller MUST
/// NOT fall back to any other codec — fail hard.
pub fn get_codec_by_wire_id(id: u8) -> Result<Box<dyn Codec>, CodecError> {
    match Compression::from_wire_id(id) {
        Some(c) => Ok(get_codec(c)),
        None    => Err(CodecError::Unsupported(id)),
    }
}

/// Resolve a [`Compression`] to a built-in codec.
pub fn get_codec(c: Compression) -> Box<dyn Codec> {
    match c {
        Compression::None    => Box::new(NoneCodec),
        Compression::Deflate => Box::new(DeflateCodec),
        Compression::Lz4     => Box::new(Lz4Codec),
        Compression::Lzma    => Box::new(LzmaCodec),
        Compression::Zstd    => Box::new(ZstdCodec),
    }
}
