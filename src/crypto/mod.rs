//! Cryptographic building blocks for session cookies
//!
//! - [`key_length`] - fitting derived keys to cipher requirements
//! - HMAC over the configured hash, with constant-time verification
//! - AES in counter mode as the default payload transform

pub mod key_length;

pub use key_length::{proper_key_length, KeySize};

use aes::{Aes128, Aes192, Aes256};
use ctr::cipher::{IvSizeUser, KeyIvInit, StreamCipher};
use ctr::Ctr128BE;
use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha384, Sha512};

use crate::error::CookieError;

/// Transform applied in place to the serialized payload
///
/// Arguments are the cipher, the derived cookie key, the IV and the buffer.
pub type CipherTransform = fn(BlockCipher, &[u8], &[u8], &mut [u8]) -> Result<(), CookieError>;

/// Hash used for key derivation and cookie MACs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// MAC length in bytes
    #[must_use]
    pub fn output_size(self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// HMAC of the concatenation of `parts`
    ///
    /// # Errors
    ///
    /// Returns [`CookieError::KeyInitializationFailed`] if the key is rejected
    pub fn hmac(self, key: &[u8], parts: &[&[u8]]) -> Result<Vec<u8>, CookieError> {
        match self {
            Self::Sha256 => compute_hmac::<Hmac<Sha256>>(key, parts),
            Self::Sha384 => compute_hmac::<Hmac<Sha384>>(key, parts),
            Self::Sha512 => compute_hmac::<Hmac<Sha512>>(key, parts),
        }
    }

    /// Check `tag` against the HMAC of `parts` in constant time
    ///
    /// # Errors
    ///
    /// Returns [`CookieError::KeyInitializationFailed`] if the key is rejected
    pub fn verify_hmac(self, key: &[u8], parts: &[&[u8]], tag: &[u8]) -> Result<bool, CookieError> {
        match self {
            Self::Sha256 => verify_hmac::<Hmac<Sha256>>(key, parts, tag),
            Self::Sha384 => verify_hmac::<Hmac<Sha384>>(key, parts, tag),
            Self::Sha512 => verify_hmac::<Hmac<Sha512>>(key, parts, tag),
        }
    }
}

fn keyed_mac<M: Mac + KeyInit>(key: &[u8], parts: &[&[u8]]) -> Result<M, CookieError> {
    let mut mac = <M as Mac>::new_from_slice(key)
        .map_err(|e| CookieError::KeyInitializationFailed(e.to_string()))?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac)
}

fn compute_hmac<M: Mac + KeyInit>(key: &[u8], parts: &[&[u8]]) -> Result<Vec<u8>, CookieError> {
    Ok(keyed_mac::<M>(key, parts)?.finalize().into_bytes().to_vec())
}

fn verify_hmac<M: Mac + KeyInit>(
    key: &[u8],
    parts: &[&[u8]],
    tag: &[u8],
) -> Result<bool, CookieError> {
    Ok(keyed_mac::<M>(key, parts)?.verify_slice(tag).is_ok())
}

/// Block cipher used for the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockCipher {
    Aes128,
    Aes192,
    #[default]
    Aes256,
}

impl BlockCipher {
    /// Block size in bytes; also the IV length
    #[must_use]
    pub fn block_size(self) -> usize {
        match self {
            Self::Aes128 | Self::Aes192 | Self::Aes256 => 16,
        }
    }

    /// Accepted key lengths
    #[must_use]
    pub fn key_size(self) -> KeySize {
        match self {
            Self::Aes128 => KeySize::Fixed(16),
            Self::Aes192 => KeySize::Fixed(24),
            Self::Aes256 => KeySize::Fixed(32),
        }
    }
}

/// Counter mode keystream; encryption and decryption are the same operation
///
/// # Errors
///
/// Returns [`CookieError::IvConstructionFailed`] for an IV of the wrong length and
/// [`CookieError::KeyInitializationFailed`] for a key the cipher rejects
pub fn ctr_transform(
    cipher: BlockCipher,
    key: &[u8],
    iv: &[u8],
    data: &mut [u8],
) -> Result<(), CookieError> {
    match cipher {
        BlockCipher::Aes128 => apply_keystream::<Ctr128BE<Aes128>>(key, iv, data),
        BlockCipher::Aes192 => apply_keystream::<Ctr128BE<Aes192>>(key, iv, data),
        BlockCipher::Aes256 => apply_keystream::<Ctr128BE<Aes256>>(key, iv, data),
    }
}

fn apply_keystream<C: KeyIvInit + StreamCipher>(
    key: &[u8],
    iv: &[u8],
    data: &mut [u8],
) -> Result<(), CookieError> {
    if iv.len() != <C as IvSizeUser>::iv_size() {
        return Err(CookieError::IvConstructionFailed(iv.to_vec()));
    }

    let mut cipher = C::new_from_slices(key, iv)
        .map_err(|e| CookieError::KeyInitializationFailed(e.to_string()))?;
    cipher.apply_keystream(data);
    Ok(())
}
