//! Wire format of an encrypted session cookie
//!
//! A cookie is four length-prefixed fields in fixed order: IV, payload, padding
//! and MAC. Each field is written as a 64-bit big-endian length followed by the
//! raw bytes; the whole frame is then encoded with standard, padded base64.

use std::fmt;

use base64::{engine::general_purpose, Engine as _};

use crate::error::CookieError;

const LENGTH_PREFIX: usize = 8;

/// The four parts of an encrypted session cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub iv: Vec<u8>,
    pub payload: Vec<u8>,
    pub padding: Vec<u8>,
    pub mac: Vec<u8>,
}

/// Base64 transport form of a [`Cookie`], ready to be placed in a header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedSession(String);

impl EncryptedSession {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for EncryptedSession {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for EncryptedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Cookie {
    /// Serialize the four fields into a binary frame
    #[must_use]
    pub fn to_frame(&self) -> Vec<u8> {
        let fields = [&self.iv, &self.payload, &self.padding, &self.mac];
        let total = fields.iter().map(|f| LENGTH_PREFIX + f.len()).sum();

        let mut frame = Vec::with_capacity(total);
        for field in fields {
            frame.extend_from_slice(&(field.len() as u64).to_be_bytes());
            frame.extend_from_slice(field);
        }
        frame
    }

    /// Parse a binary frame
    ///
    /// # Errors
    ///
    /// Returns [`CookieError::DeserializationFailed`] for truncated frames, lengths
    /// that overrun the frame, or trailing bytes
    pub fn from_frame(frame: &[u8]) -> Result<Self, CookieError> {
        let mut reader = FrameReader { rest: frame };
        let cookie = Self {
            iv: reader.field("iv")?,
            payload: reader.field("payload")?,
            padding: reader.field("padding")?,
            mac: reader.field("mac")?,
        };

        if !reader.rest.is_empty() {
            return Err(CookieError::DeserializationFailed(format!(
                "{} trailing bytes after cookie frame",
                reader.rest.len()
            )));
        }
        Ok(cookie)
    }

    /// Frame and base64-encode the cookie for transport
    #[must_use]
    pub fn encode(&self) -> EncryptedSession {
        EncryptedSession(general_purpose::STANDARD.encode(self.to_frame()))
    }

    /// Decode a cookie from its transport form
    ///
    /// # Errors
    ///
    /// Returns [`CookieError::DeserializationFailed`] for invalid base64 or framing
    pub fn decode(encoded: &str) -> Result<Self, CookieError> {
        let frame = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| CookieError::DeserializationFailed(format!("invalid base64: {e}")))?;
        Self::from_frame(&frame)
    }
}

struct FrameReader<'a> {
    rest: &'a [u8],
}

impl FrameReader<'_> {
    fn field(&mut self, name: &str) -> Result<Vec<u8>, CookieError> {
        if self.rest.len() < LENGTH_PREFIX {
            return Err(CookieError::DeserializationFailed(format!(
                "truncated length prefix for {name}"
            )));
        }
        let (prefix, rest) = self.rest.split_at(LENGTH_PREFIX);
        let mut length = [0u8; LENGTH_PREFIX];
        length.copy_from_slice(prefix);

        let length = usize::try_from(u64::from_be_bytes(length))
            .ok()
            .filter(|&len| len <= rest.len())
            .ok_or_else(|| {
                CookieError::DeserializationFailed(format!("{name} length exceeds frame"))
            })?;

        let (value, rest) = rest.split_at(length);
        self.rest = rest;
        Ok(value.to_vec())
    }
}
