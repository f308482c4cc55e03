//! Encrypt-then-MAC sealing of session payloads
//!
//! Each cookie gets its own key, `HMAC(server_key, iv)` cut to the cipher's key
//! length, so a single server key never encrypts two payloads under the same key.
//! The MAC is keyed with the server key itself and covers IV, payload and padding.
//! On the way in, the MAC is checked against every accepted key before anything
//! is decrypted.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use rand::RngCore;
use serde::{de::DeserializeOwned, Serialize};

use super::payload::{ExtendedPayloadWrapper, PayloadWrapper};
use crate::cookie::Cookie;
use crate::crypto::proper_key_length;
use crate::error::CookieError;
use crate::keys::{ActiveKeys, ServerKey};
use crate::random::RandomSource;
use crate::settings::AuthCookieSettings;

/// Number of padding bytes that block-align a payload of `payload_len` bytes
#[must_use]
pub fn padding_length(block_size: usize, payload_len: usize) -> usize {
    (block_size - payload_len % block_size) % block_size
}

/// Derive the per-cookie encryption key from the server key and the IV
///
/// # Errors
///
/// Returns [`CookieError::KeyTooShort`] if the server key or the HMAC output is
/// shorter than the cipher requires
pub fn derive_cookie_key(
    settings: &AuthCookieSettings,
    server_key: &ServerKey,
    iv: &[u8],
) -> Result<Vec<u8>, CookieError> {
    let key_size = settings.cipher.key_size();
    proper_key_length(key_size, server_key.as_bytes())?;

    let digest = settings.hash_algorithm.hmac(server_key.as_bytes(), &[iv])?;
    Ok(proper_key_length(key_size, &digest)?.to_vec())
}

/// MAC over IV, payload and padding keyed with the server key
///
/// # Errors
///
/// Returns an error if the HMAC cannot be keyed
pub fn cookie_mac(
    settings: &AuthCookieSettings,
    server_key: &ServerKey,
    iv: &[u8],
    payload: &[u8],
    padding: &[u8],
) -> Result<Vec<u8>, CookieError> {
    settings
        .hash_algorithm
        .hmac(server_key.as_bytes(), &[iv, payload, padding])
}

fn mac_matches(
    settings: &AuthCookieSettings,
    server_key: &ServerKey,
    cookie: &Cookie,
) -> Result<bool, CookieError> {
    settings.hash_algorithm.verify_hmac(
        server_key.as_bytes(),
        &[&cookie.iv, &cookie.payload, &cookie.padding],
        &cookie.mac,
    )
}

/// Seal a session value that expires `max_age` after `now`
///
/// # Errors
///
/// Returns an error if the random source fails, the key is too short, or the
/// session cannot be serialized
pub fn encrypt_cookie<T: Serialize, R: RngCore>(
    settings: &AuthCookieSettings,
    random: &RandomSource<R>,
    server_key: &ServerKey,
    session: &T,
    now: DateTime<Utc>,
) -> Result<Cookie, CookieError> {
    let expiration = now.checked_add_signed(settings.max_age()).ok_or_else(|| {
        CookieError::SerializationFailed("expiration is out of range".to_string())
    })?;
    seal(settings, random, server_key, &PayloadWrapper { session, expiration })
}

/// Seal a session value with an explicit expiration
///
/// # Errors
///
/// Returns an error if the random source fails, the key is too short, or the
/// session cannot be serialized
pub fn seal<T: Serialize, R: RngCore>(
    settings: &AuthCookieSettings,
    random: &RandomSource<R>,
    server_key: &ServerKey,
    wrapper: &PayloadWrapper<T>,
) -> Result<Cookie, CookieError> {
    let block_size = settings.cipher.block_size();
    let iv = random.get_random_bytes(block_size)?;
    let cookie_key = derive_cookie_key(settings, server_key, &iv)?;

    let mut payload = wrapper.to_bytes()?;
    (settings.encrypt_transform)(settings.cipher, &cookie_key, &iv, &mut payload)?;

    let padding = random.get_random_bytes(padding_length(block_size, payload.len()))?;
    let mac = cookie_mac(settings, server_key, &iv, &payload, &padding)?;

    debug!(
        "Sealed session cookie: payload={} bytes, padding={} bytes, expires={}",
        payload.len(),
        padding.len(),
        wrapper.expiration
    );

    Ok(Cookie {
        iv,
        payload,
        padding,
        mac,
    })
}

/// Decrypt a payload with a key whose MAC has already been verified
fn open<T: DeserializeOwned>(
    settings: &AuthCookieSettings,
    server_key: &ServerKey,
    cookie: &Cookie,
) -> Result<PayloadWrapper<T>, CookieError> {
    let cookie_key = derive_cookie_key(settings, server_key, &cookie.iv)?;
    let mut payload = cookie.payload.clone();
    (settings.decrypt_transform)(settings.cipher, &cookie_key, &cookie.iv, &mut payload)?;
    PayloadWrapper::from_bytes(&payload)
}

/// Verify, decrypt and check the expiration of a cookie
///
/// Keys are tried current first, then rotated keys in order; the first key whose
/// MAC matches is used, and `renew` reports whether it was a rotated one.
///
/// # Errors
///
/// - [`CookieError::AuthenticationFailed`] if no key matches
/// - [`CookieError::DeserializationFailed`] if the decrypted payload is malformed
/// - [`CookieError::SessionExpired`] if `now` is at or past the expiration
pub fn decrypt_cookie<T: DeserializeOwned>(
    settings: &AuthCookieSettings,
    keys: &ActiveKeys,
    cookie: &Cookie,
    now: DateTime<Utc>,
) -> Result<ExtendedPayloadWrapper<T>, CookieError> {
    let mut matched = None;
    for (position, (key, rotated)) in keys.candidates().enumerate() {
        if mac_matches(settings, key, cookie)? {
            matched = Some((position, key, rotated));
            break;
        }
    }

    let Some((position, key, renew)) = matched else {
        warn!(
            "Rejected session cookie: MAC matches none of {} keys",
            keys.rotated.len() + 1
        );
        return Err(CookieError::AuthenticationFailed(cookie.mac.clone()));
    };

    let wrapper: PayloadWrapper<T> = open(settings, key, cookie)?;
    if now >= wrapper.expiration {
        warn!(
            "Rejected expired session cookie (expired {}, now {now})",
            wrapper.expiration
        );
        return Err(CookieError::SessionExpired {
            expires_at: wrapper.expiration,
            observed_at: now,
        });
    }

    if renew {
        debug!("Session cookie verified with rotated key {position}; renewal requested");
    }

    Ok(ExtendedPayloadWrapper {
        session: wrapper.session,
        expiration: wrapper.expiration,
        renew,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{BlockCipher, HashAlgorithm};
    use crate::testing::{TestFixtures, TestSession};
    use chrono::TimeDelta;
    use proptest::prelude::*;

    fn refuse_transform(
        _cipher: BlockCipher,
        _key: &[u8],
        _iv: &[u8],
        _data: &mut [u8],
    ) -> Result<(), CookieError> {
        Err(CookieError::KeyInitializationFailed(
            "payload must not be decrypted".to_string(),
        ))
    }

    fn active(key: &ServerKey) -> ActiveKeys {
        ActiveKeys {
            current: key.clone(),
            rotated: Vec::new(),
        }
    }

    #[test]
    fn test_padding_examples() {
        assert_eq!(padding_length(16, 0), 0);
        assert_eq!(padding_length(16, 1), 15);
        assert_eq!(padding_length(16, 16), 0);
        assert_eq!(padding_length(16, 17), 15);
        assert_eq!(padding_length(16, 31), 1);
    }

    proptest! {
        #[test]
        fn prop_padding_aligns_to_block(block in 1usize..64, len in 0usize..4096) {
            let padding = padding_length(block, len);
            prop_assert_eq!(padding, (block - len % block) % block);
            prop_assert!(padding < block);
            prop_assert_eq!((len + padding) % block, 0);
        }
    }

    #[test]
    fn test_sealed_cookie_shape() {
        let settings = TestFixtures::settings();
        let random = TestFixtures::random_source();
        let key = TestFixtures::server_key(1);

        let cookie =
            encrypt_cookie(&settings, &random, &key, &TestFixtures::alice(), Utc::now()).unwrap();

        assert_eq!(cookie.iv.len(), 16);
        assert_eq!(cookie.mac.len(), 32);
        assert_eq!((cookie.payload.len() + cookie.padding.len()) % 16, 0);
    }

    #[test]
    fn test_mac_is_keyed_with_server_key() {
        let settings = TestFixtures::settings();
        let random = TestFixtures::random_source();
        let key = TestFixtures::server_key(1);

        let cookie =
            encrypt_cookie(&settings, &random, &key, &TestFixtures::alice(), Utc::now()).unwrap();
        let expected = HashAlgorithm::Sha256
            .hmac(key.as_bytes(), &[&cookie.iv, &cookie.payload, &cookie.padding])
            .unwrap();
        assert_eq!(cookie.mac, expected);
    }

    #[test]
    fn test_derived_key_differs_per_iv() {
        let settings = TestFixtures::settings();
        let key = TestFixtures::server_key(1);
        let a = derive_cookie_key(&settings, &key, &[0u8; 16]).unwrap();
        let b = derive_cookie_key(&settings, &key, &[1u8; 16]).unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
        assert_ne!(a, key.as_bytes());
    }

    #[test]
    fn test_short_server_key_rejected() {
        let settings = TestFixtures::settings();
        let key = ServerKey::new(vec![1u8; 31]).unwrap();
        let result = derive_cookie_key(&settings, &key, &[0u8; 16]);
        assert!(matches!(
            result,
            Err(CookieError::KeyTooShort {
                required: 32,
                actual: 31
            })
        ));
    }

    #[test]
    fn test_sha512_with_aes128() {
        let settings = AuthCookieSettings {
            hash_algorithm: HashAlgorithm::Sha512,
            cipher: BlockCipher::Aes128,
            ..TestFixtures::settings()
        };
        let random = TestFixtures::random_source();
        let key = TestFixtures::server_key(4);
        let now = Utc::now();

        let cookie = encrypt_cookie(&settings, &random, &key, &TestFixtures::alice(), now).unwrap();
        assert_eq!(cookie.mac.len(), 64);

        let opened: ExtendedPayloadWrapper<TestSession> =
            decrypt_cookie(&settings, &active(&key), &cookie, now).unwrap();
        assert_eq!(opened.session, TestFixtures::alice());
    }

    #[test]
    fn test_payload_not_decrypted_when_mac_fails() {
        let mut settings = TestFixtures::settings();
        let random = TestFixtures::random_source();
        let key = TestFixtures::server_key(1);
        let now = Utc::now();

        let cookie = encrypt_cookie(&settings, &random, &key, &TestFixtures::alice(), now).unwrap();
        settings.decrypt_transform = refuse_transform;

        let other = TestFixtures::server_key(2);
        let result: Result<ExtendedPayloadWrapper<TestSession>, _> =
            decrypt_cookie(&settings, &active(&other), &cookie, now);
        assert!(matches!(result, Err(CookieError::AuthenticationFailed(_))));
    }

    #[test]
    fn test_truncated_padding_rejected() {
        let settings = TestFixtures::settings();
        let random = TestFixtures::random_source();
        let key = TestFixtures::server_key(1);
        let now = Utc::now();

        let mut cookie =
            encrypt_cookie(&settings, &random, &key, &TestFixtures::alice(), now).unwrap();
        if cookie.padding.is_empty() {
            cookie.padding.push(0);
        } else {
            cookie.padding.pop();
        }

        let result: Result<ExtendedPayloadWrapper<TestSession>, _> =
            decrypt_cookie(&settings, &active(&key), &cookie, now);
        assert!(matches!(result, Err(CookieError::AuthenticationFailed(_))));
    }

    #[test]
    fn test_current_key_preferred_over_rotated() {
        let settings = TestFixtures::settings();
        let random = TestFixtures::random_source();
        let key = TestFixtures::server_key(1);
        let now = Utc::now();

        let cookie = encrypt_cookie(&settings, &random, &key, &TestFixtures::alice(), now).unwrap();
        // The same key listed again as rotated must not trigger renewal
        let keys = ActiveKeys {
            current: key.clone(),
            rotated: vec![key.clone()],
        };
        let opened: ExtendedPayloadWrapper<TestSession> =
            decrypt_cookie(&settings, &keys, &cookie, now).unwrap();
        assert!(!opened.renew);
    }

    #[test]
    fn test_expiration_is_inclusive() {
        let settings = TestFixtures::settings();
        let random = TestFixtures::random_source();
        let key = TestFixtures::server_key(1);
        let issued = Utc::now();

        let cookie =
            encrypt_cookie(&settings, &random, &key, &TestFixtures::alice(), issued).unwrap();
        let expiry = issued + settings.max_age();

        let just_before = expiry - TimeDelta::nanoseconds(1);
        let opened: ExtendedPayloadWrapper<TestSession> =
            decrypt_cookie(&settings, &active(&key), &cookie, just_before).unwrap();
        assert_eq!(opened.expiration, expiry);

        let result: Result<ExtendedPayloadWrapper<TestSession>, _> =
            decrypt_cookie(&settings, &active(&key), &cookie, expiry);
        match result {
            Err(CookieError::SessionExpired {
                expires_at,
                observed_at,
            }) => {
                assert_eq!(expires_at, expiry);
                assert_eq!(observed_at, expiry);
            }
            other => panic!("expected SessionExpired, got {other:?}"),
        }
    }
}
