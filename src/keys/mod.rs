//! Server keys and the key set capability
//!
//! A key set hands out the *current* key, used to issue cookies, together with
//! the keys it has rotated out, which are still accepted when verifying. Two
//! implementations are provided:
//!
//! - [`StaticKeySet`] - a single fixed key
//! - [`RenewableKeySet`] - keys refreshed by a user supplied [`RenewalPolicy`]

mod renewable;
mod static_set;

pub use renewable::{KeySetState, RenewableKeySet, RenewalPolicy};
pub use static_set::StaticKeySet;

use std::fmt;

use base64::{engine::general_purpose, Engine as _};
use rand::RngCore;

use crate::error::{CookieError, KeySetError};
use crate::random::RandomSource;

/// Secret key material held only by the server
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ServerKey(Vec<u8>);

impl ServerKey {
    /// Wrap raw key bytes
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` is empty
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, KeySetError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(KeySetError::EmptyKey);
        }
        Ok(Self(bytes))
    }

    /// Decode a key from standard base64 text, as stored in configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid base64 or decodes to nothing
    pub fn from_base64(encoded: &str) -> Result<Self, KeySetError> {
        let bytes = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| KeySetError::InvalidKeyEncoding(e.to_string()))?;
        Self::new(bytes)
    }

    /// Generate a fresh random key of `length` bytes
    ///
    /// # Errors
    ///
    /// Returns an error if the random source fails or `length` is zero
    pub fn generate<R: RngCore>(
        random: &RandomSource<R>,
        length: usize,
    ) -> Result<Self, CookieError> {
        let bytes = random.get_random_bytes(length)?;
        Ok(Self::new(bytes)?)
    }

    /// Raw key bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Key length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with `len`
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encode the key as standard base64 text
    #[must_use]
    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.0)
    }
}

impl fmt::Debug for ServerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServerKey(<{} bytes redacted>)", self.0.len())
    }
}

/// Keys a key set currently accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveKeys {
    /// Key used to issue new cookies; checked first when verifying
    pub current: ServerKey,
    /// Retired keys still accepted for verification, in preference order
    pub rotated: Vec<ServerKey>,
}

impl ActiveKeys {
    /// Split an ordered key list into its head and tail
    ///
    /// # Errors
    ///
    /// Returns [`KeySetError::Empty`] when `keys` is empty
    pub fn from_ordered(keys: &[ServerKey]) -> Result<Self, KeySetError> {
        let (current, rotated) = keys.split_first().ok_or(KeySetError::Empty)?;
        Ok(Self {
            current: current.clone(),
            rotated: rotated.to_vec(),
        })
    }

    /// Iterate candidate keys with a flag telling whether each one is rotated
    pub fn candidates(&self) -> impl Iterator<Item = (&ServerKey, bool)> {
        std::iter::once((&self.current, false)).chain(self.rotated.iter().map(|key| (key, true)))
    }
}

/// Capability over one or more server keys
///
/// Implementations must be safe to share between request handlers.
pub trait ServerKeySet: Send + Sync {
    /// Return the current key and the rotated keys, refreshing first if needed
    ///
    /// # Errors
    ///
    /// Returns an error if a refresh fails or the set holds no keys
    fn get_keys(&self) -> Result<ActiveKeys, KeySetError>;

    /// Remove `key` from the set; removing an absent key is a no-op
    ///
    /// # Errors
    ///
    /// Returns an error if the set does not support removal or cleanup fails
    fn remove_key(&self, key: &ServerKey) -> Result<(), KeySetError>;
}

impl<K: ServerKeySet + ?Sized> ServerKeySet for std::sync::Arc<K> {
    fn get_keys(&self) -> Result<ActiveKeys, KeySetError> {
        (**self).get_keys()
    }

    fn remove_key(&self, key: &ServerKey) -> Result<(), KeySetError> {
        (**self).remove_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_key_rejected() {
        assert!(matches!(ServerKey::new(Vec::new()), Err(KeySetError::EmptyKey)));
    }

    #[test]
    fn test_base64_key_roundtrip() {
        let key = ServerKey::new(b"0123456789abcdef0123456789abcdef".to_vec()).unwrap();
        let decoded = ServerKey::from_base64(&key.to_base64()).unwrap();
        assert_eq!(key, decoded);
    }

    #[test]
    fn test_invalid_base64_key_rejected() {
        let result = ServerKey::from_base64("not base64 at all!");
        assert!(matches!(result, Err(KeySetError::InvalidKeyEncoding(_))));
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let key = ServerKey::new(b"super-secret-material".to_vec()).unwrap();
        let debug = format!("{key:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("21 bytes"));
    }

    #[test]
    fn test_generate_key_length() {
        let random = RandomSource::from_os_rng(1024).unwrap();
        let key = ServerKey::generate(&random, 32).unwrap();
        assert_eq!(key.len(), 32);
    }

    #[test]
    fn test_active_keys_from_empty_list() {
        assert!(matches!(ActiveKeys::from_ordered(&[]), Err(KeySetError::Empty)));
    }

    #[test]
    fn test_candidates_order_current_first() {
        let k0 = ServerKey::new(vec![0u8; 32]).unwrap();
        let k1 = ServerKey::new(vec![1u8; 32]).unwrap();
        let k2 = ServerKey::new(vec![2u8; 32]).unwrap();
        let active = ActiveKeys::from_ordered(&[k2.clone(), k1.clone(), k0.clone()]).unwrap();

        let candidates: Vec<_> = active.candidates().collect();
        assert_eq!(candidates, vec![(&k2, false), (&k1, true), (&k0, true)]);
    }
}
