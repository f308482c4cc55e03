//! Fitting key material to what a cipher accepts
//!
//! HMAC output length is fixed by the hash, while ciphers accept a fixed length,
//! a range, or a set of lengths. [`proper_key_length`] picks the longest usable
//! prefix of the input key.

use crate::error::CookieError;

/// Key lengths a cipher accepts, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySize {
    /// Exactly this many bytes
    Fixed(usize),
    /// Any length in the inclusive range
    Range { min: usize, max: usize },
    /// One of the listed lengths
    Enum(&'static [usize]),
}

impl KeySize {
    /// Shortest acceptable key
    #[must_use]
    pub fn minimum(&self) -> usize {
        match self {
            Self::Fixed(len) => *len,
            Self::Range { min, .. } => *min,
            Self::Enum(lengths) => lengths.iter().copied().min().unwrap_or(0),
        }
    }
}

/// Select the prefix of `key` acceptable for `size`
///
/// # Errors
///
/// Returns [`CookieError::KeyTooShort`] with the required minimum and actual length
/// when no acceptable length fits in `key`
pub fn proper_key_length(size: KeySize, key: &[u8]) -> Result<&[u8], CookieError> {
    let actual = key.len();
    let too_short = || CookieError::KeyTooShort {
        required: size.minimum(),
        actual,
    };

    let length = match size {
        KeySize::Fixed(len) if actual >= len => len,
        KeySize::Range { min, max } if actual >= min => actual.min(max),
        KeySize::Enum(lengths) => lengths
            .iter()
            .copied()
            .filter(|&len| len <= actual)
            .max()
            .ok_or_else(too_short)?,
        KeySize::Fixed(_) | KeySize::Range { .. } => return Err(too_short()),
    };

    Ok(&key[..length])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn assert_too_short(result: Result<&[u8], CookieError>, required: usize, actual: usize) {
        match result {
            Err(CookieError::KeyTooShort {
                required: r,
                actual: a,
            }) => {
                assert_eq!((r, a), (required, actual));
            }
            other => panic!("expected KeyTooShort, got {other:?}"),
        }
    }

    #[test]
    fn test_fixed_takes_prefix() {
        let key = [7u8; 48];
        assert_eq!(proper_key_length(KeySize::Fixed(32), &key).unwrap().len(), 32);
        assert_eq!(proper_key_length(KeySize::Fixed(32), &key[..32]).unwrap().len(), 32);
    }

    #[test]
    fn test_fixed_rejects_one_byte_short() {
        assert_too_short(proper_key_length(KeySize::Fixed(32), &[0u8; 31]), 32, 31);
    }

    #[test]
    fn test_range_bounds() {
        let size = KeySize::Range { min: 16, max: 56 };
        assert_eq!(proper_key_length(size, &[0u8; 16]).unwrap().len(), 16);
        assert_eq!(proper_key_length(size, &[0u8; 40]).unwrap().len(), 40);
        assert_eq!(proper_key_length(size, &[0u8; 56]).unwrap().len(), 56);
        assert_eq!(proper_key_length(size, &[0u8; 64]).unwrap().len(), 56);
        assert_too_short(proper_key_length(size, &[0u8; 15]), 16, 15);
    }

    #[test]
    fn test_enum_picks_largest_fitting() {
        let size = KeySize::Enum(&[16, 24, 32]);
        assert_eq!(proper_key_length(size, &[0u8; 16]).unwrap().len(), 16);
        assert_eq!(proper_key_length(size, &[0u8; 30]).unwrap().len(), 24);
        assert_eq!(proper_key_length(size, &[0u8; 32]).unwrap().len(), 32);
        assert_eq!(proper_key_length(size, &[0u8; 64]).unwrap().len(), 32);
        assert_too_short(proper_key_length(size, &[0u8; 15]), 16, 15);
    }

    #[test]
    fn test_selected_bytes_are_a_prefix() {
        let key: Vec<u8> = (0u8..40).collect();
        let selected = proper_key_length(KeySize::Fixed(24), &key).unwrap();
        assert_eq!(selected, &key[..24]);
    }

    proptest! {
        #[test]
        fn prop_range_result_within_bounds(min in 1usize..64, extra in 0usize..64, len in 0usize..160) {
            let max = min + extra;
            let key = vec![0u8; len];
            match proper_key_length(KeySize::Range { min, max }, &key) {
                Ok(selected) => {
                    prop_assert!(selected.len() >= min && selected.len() <= max);
                    prop_assert_eq!(selected.len(), len.min(max));
                }
                Err(_) => prop_assert!(len < min),
            }
        }
    }
}
