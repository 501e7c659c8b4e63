//! Symmetric cipher backends for block payloads and the file index.
//!
//! Two cipher families are registered:
//!
//! - **XOR stream** — repeating-key XOR, an involution (`encrypt == decrypt`).
//!   This is obfuscation, not cryptography; it exists to keep directory
//!   structure and asset bytes out of casual hex-dump inspection.  The file
//!   index is always obscured with it using the fixed format key
//!   [`INDEX_OBFUSCATION_KEY`].
//! - **AES-256-GCM** — real authenticated encryption for block payloads.
//!   Encrypted payload layout: `[ nonce (12 B) | ciphertext | GCM tag (16 B) ]`.
//!
//! Keys are raw 32-byte values supplied by the caller; this crate performs no
//! password-based key derivation.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng as AeadOsRng};
use aes_gcm::Aes256Gcm;
use thiserror::Error;

/// Byte length of the AES-GCM nonce prepended to every encrypted payload.
pub const NONCE_LEN: usize = 12;

/// Fixed format-reserved key used solely to obscure the file index region.
///
/// This is NOT a security boundary.  Anyone with this source can decode any
/// archive's directory; the key only prevents paths from appearing verbatim
/// in the file.  Never reuse it for block encryption.
pub const INDEX_OBFUSCATION_KEY: [u8; 32] = [
    0x62, 0x70, 0x61, 0x6b, 0x9e, 0x3d, 0x51, 0xc7,
    0x08, 0xaf, 0x66, 0x12, 0xd4, 0x8b, 0x27, 0xf0,
    0x39, 0xe5, 0x0c, 0x7a, 0xb1, 0x44, 0xde, 0x93,
    0x58, 0x2f, 0xc0, 0x6e, 0x15, 0xfa, 0x83, 0x4d,
];

// ── Wire ids (frozen, 4-bit field in the block flags word) ───────────────────

pub const WIRE_NONE: u8 = 0;
pub const WIRE_XOR:  u8 = 1;
pub const WIRE_AES:  u8 = 2;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed — wrong key or corrupted data")]
    DecryptionFailed,
    #[error("Encrypted payload too short (minimum {NONCE_LEN} bytes)")]
    TooShort,
    #[error("Block is encrypted but no key was provided")]
    MissingKey,
    /// Emitted when a block names an encryption wire id not available in this
    /// build.  Decoding MUST NOT continue.
    #[error("Unsupported encryption algorithm id {0} — cannot decode")]
    Unsupported(u8),
}

// ── Encryption enum ──────────────────────────────────────────────────────────

/// Runtime cipher discriminant.  Carries the frozen wire id written into
/// every block's flags word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encryption {
    #[default]
    None,
    Xor,
    Aes,
}

impl Encryption {
    #[inline]
    pub fn wire_id(self) -> u8 {
        match self {
            Encryption::None => WIRE_NONE,
            Encryption::Xor  => WIRE_XOR,
            Encryption::Aes  => WIRE_AES,
        }
    }

    pub fn from_wire_id(id: u8) -> Option<Self> {
        match id {
            WIRE_NONE => Some(Encryption::None),
            WIRE_XOR  => Some(Encryption::Xor),
            WIRE_AES  => Some(Encryption::Aes),
            _         => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Encryption::None => "none",
            Encryption::Xor  => "xor",
            Encryption::Aes  => "aes",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(Encryption::None),
            "xor"  => Some(Encryption::Xor),
            "aes"  => Some(Encryption::Aes),
            _      => None,
        }
    }
}

// ── Dispatch ─────────────────────────────────────────────────────────────────

/// Encrypt `plaintext` with the selected cipher.
///
/// `Encryption::None` returns the input unchanged; the other variants require
/// a key and fail with [`CryptoError::MissingKey`] without one.
pub fn encrypt(cipher: Encryption, key: Option<&[u8; 32]>, plaintext: &[u8])
    -> Result<Vec<u8>, CryptoError>
{
    match cipher {
        Encryption::None => Ok(plaintext.to_vec()),
        Encryption::Xor  => Ok(xor_stream(key.ok_or(CryptoError::MissingKey)?, plaintext)),
        Encryption::Aes  => aes_encrypt(key.ok_or(CryptoError::MissingKey)?, plaintext),
    }
}

/// Decrypt a payload produced by [`encrypt`] with the same cipher and key.
pub fn decrypt(cipher: Encryption, key: Option<&[u8; 32]>, data: &[u8])
    -> Result<Vec<u8>, CryptoError>
{
    match cipher {
        Encryption::None => Ok(data.to_vec()),
        Encryption::Xor  => Ok(xor_stream(key.ok_or(CryptoError::MissingKey)?, data)),
        Encryption::Aes  => aes_decrypt(key.ok_or(CryptoError::MissingKey)?, data),
    }
}

// ── XOR stream ───────────────────────────────────────────────────────────────

/// Repeating-key XOR.  Applying it twice with the same key is the identity.
fn xor_stream(key: &[u8; 32], data: &[u8]) -> Vec<u8> {
    data.iter()
        .zip(key.iter().cycle())
        .map(|(b, k)| b ^ k)
        .collect()
}

// ── AES-256-GCM ──────────────────────────────────────────────────────────────

/// Encrypt with AES-256-GCM using a random nonce.
///
/// Returns `nonce (12 B) || ciphertext || GCM-tag (16 B)`.
fn aes_encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| CryptoError::EncryptionFailed)?;
    let nonce = Aes256Gcm::generate_nonce(&mut AeadOsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(nonce.as_slice());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt an AES-256-GCM payload produced by [`aes_encrypt`].
fn aes_decrypt(key: &[u8; 32], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < NONCE_LEN {
        return Err(CryptoError::TooShort);
    }
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| CryptoError::DecryptionFailed)?;
    let nonce = aes_gcm::Nonce::from_slice(&data[..NONCE_LEN]);
    cipher
        .decrypt(nonce, &data[NONCE_LEN..])
        .map_err(|_| CryptoError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [7u8; 32];

    #[test]
    fn xor_is_involution() {
        let data = b"obscured but not protected";
        let once  = encrypt(Encryption::Xor, Some(&KEY), data).unwrap();
        let twice = decrypt(Encryption::Xor, Some(&KEY), &once).unwrap();
        assert_ne!(once, data.to_vec());
        assert_eq!(twice, data.to_vec());
    }

    #[test]
    fn aes_roundtrip_and_tamper_detection() {
        let data = b"sealed block payload";
        let mut sealed = encrypt(Encryption::Aes, Some(&KEY), data).unwrap();
        assert_eq!(decrypt(Encryption::Aes, Some(&KEY), &sealed).unwrap(), data.to_vec());

        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(
            decrypt(Encryption::Aes, Some(&KEY), &sealed),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn missing_key_is_rejected() {
        assert!(matches!(
            encrypt(Encryption::Aes, None, b"x"),
            Err(CryptoError::MissingKey)
        ));
        assert!(matches!(
            decrypt(Encryption::Xor, None, b"x"),
            Err(CryptoError::MissingKey)
        ));
    }
}
