use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{de::DeserializeOwned, Serialize};

use super::cipher::{decrypt_cookie, encrypt_cookie, seal};
use super::payload::{ExtendedPayloadWrapper, PayloadWrapper};
use crate::cookie::{Cookie, EncryptedSession};
use crate::error::CookieError;
use crate::keys::ServerKeySet;
use crate::random::RandomSource;
use crate::settings::AuthCookieSettings;

/// Encrypt a session value under the key set's current key
///
/// # Errors
///
/// Returns an error if the key set, the random source or serialization fails
pub fn encrypt_session<T, R, K>(
    settings: &AuthCookieSettings,
    random: &RandomSource<R>,
    keys: &K,
    session: &T,
) -> Result<EncryptedSession, CookieError>
where
    T: Serialize,
    R: RngCore,
    K: ServerKeySet + ?Sized,
{
    encrypt_session_at(settings, random, keys, session, Utc::now())
}

/// [`encrypt_session`] with an explicit issue time
///
/// # Errors
///
/// Returns an error if the key set, the random source or serialization fails
pub fn encrypt_session_at<T, R, K>(
    settings: &AuthCookieSettings,
    random: &RandomSource<R>,
    keys: &K,
    session: &T,
    now: DateTime<Utc>,
) -> Result<EncryptedSession, CookieError>
where
    T: Serialize,
    R: RngCore,
    K: ServerKeySet + ?Sized,
{
    let active = keys.get_keys()?;
    Ok(encrypt_cookie(settings, random, &active.current, session, now)?.encode())
}

/// Decrypt and verify a session cookie value
///
/// # Errors
///
/// Returns [`CookieError::DeserializationFailed`] for malformed input,
/// [`CookieError::AuthenticationFailed`] when no accepted key matches, and
/// [`CookieError::SessionExpired`] for an authentic but expired cookie
pub fn decrypt_session<T, K>(
    settings: &AuthCookieSettings,
    keys: &K,
    encoded: &str,
) -> Result<ExtendedPayloadWrapper<T>, CookieError>
where
    T: DeserializeOwned,
    K: ServerKeySet + ?Sized,
{
    decrypt_session_at(settings, keys, encoded, Utc::now())
}

/// [`decrypt_session`] evaluated at an explicit time
///
/// # Errors
///
/// See [`decrypt_session`]
pub fn decrypt_session_at<T, K>(
    settings: &AuthCookieSettings,
    keys: &K,
    encoded: &str,
    now: DateTime<Utc>,
) -> Result<ExtendedPayloadWrapper<T>, CookieError>
where
    T: DeserializeOwned,
    K: ServerKeySet + ?Sized,
{
    let cookie = Cookie::decode(encoded)?;
    let active = keys.get_keys()?;
    decrypt_cookie(settings, &active, &cookie, now)
}

/// Re-encrypt a decrypted session under the current key, keeping its expiration
///
/// Used when decryption reported `renew`.
///
/// # Errors
///
/// Returns an error if the key set, the random source or serialization fails
pub fn reissue_session<T, R, K>(
    settings: &AuthCookieSettings,
    random: &RandomSource<R>,
    keys: &K,
    session: &ExtendedPayloadWrapper<T>,
) -> Result<EncryptedSession, CookieError>
where
    T: Serialize,
    R: RngCore,
    K: ServerKeySet + ?Sized,
{
    let active = keys.get_keys()?;
    let wrapper = PayloadWrapper {
        session: &session.session,
        expiration: session.expiration,
    };
    Ok(seal(settings, random, &active.current, &wrapper)?.encode())
}
