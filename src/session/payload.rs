//! Plaintext carried inside the encrypted payload
//!
//! The session value travels together with its expiration so the expiry is both
//! confidential and covered by the MAC. The expiration is stored as a Modified
//! Julian Day number plus picoseconds into that day, serialized as the JSON array
//! `[session, day, picoseconds]`.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::CookieError;

const UNIX_EPOCH_MJD: i64 = 40_587;
const SECONDS_PER_DAY: i64 = 86_400;
const PICOS_PER_SECOND: i64 = 1_000_000_000_000;
const PICOS_PER_NANO: i64 = 1_000;

/// Session value with its absolute expiration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadWrapper<T> {
    pub session: T,
    pub expiration: DateTime<Utc>,
}

/// Result of a successful decryption
///
/// `renew` is set when the cookie was verified with a rotated key; the caller
/// should issue a fresh cookie under the current key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedPayloadWrapper<T> {
    pub session: T,
    pub expiration: DateTime<Utc>,
    pub renew: bool,
}

impl<T: Serialize> PayloadWrapper<T> {
    /// Serialize to the plaintext layout
    ///
    /// # Errors
    ///
    /// Returns [`CookieError::SerializationFailed`] if the session value cannot be encoded
    pub fn to_bytes(&self) -> Result<Vec<u8>, CookieError> {
        let (day, picos) = to_day_and_picos(self.expiration);
        serde_json::to_vec(&(&self.session, day, picos))
            .map_err(|e| CookieError::SerializationFailed(e.to_string()))
    }
}

impl<T: DeserializeOwned> PayloadWrapper<T> {
    /// Parse the plaintext layout
    ///
    /// # Errors
    ///
    /// Returns [`CookieError::DeserializationFailed`] if the bytes are not a valid
    /// session value and expiration
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CookieError> {
        let (session, day, picos): (T, i64, i64) = serde_json::from_slice(bytes)
            .map_err(|e| CookieError::DeserializationFailed(format!("session payload: {e}")))?;
        let expiration = from_day_and_picos(day, picos).ok_or_else(|| {
            CookieError::DeserializationFailed(format!(
                "expiration out of range: day {day}, picoseconds {picos}"
            ))
        })?;
        Ok(Self {
            session,
            expiration,
        })
    }
}

fn to_day_and_picos(instant: DateTime<Utc>) -> (i64, i64) {
    let seconds = instant.timestamp();
    let day = seconds.div_euclid(SECONDS_PER_DAY) + UNIX_EPOCH_MJD;
    let picos = seconds.rem_euclid(SECONDS_PER_DAY) * PICOS_PER_SECOND
        + i64::from(instant.timestamp_subsec_nanos()) * PICOS_PER_NANO;
    (day, picos)
}

fn from_day_and_picos(day: i64, picos: i64) -> Option<DateTime<Utc>> {
    if picos < 0 {
        return None;
    }
    let seconds = day
        .checked_sub(UNIX_EPOCH_MJD)?
        .checked_mul(SECONDS_PER_DAY)?
        .checked_add(picos / PICOS_PER_SECOND)?;
    let nanos = u32::try_from((picos % PICOS_PER_SECOND) / PICOS_PER_NANO).ok()?;
    DateTime::from_timestamp(seconds, nanos)
}
