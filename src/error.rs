//! Error types for the session cookie protocol
//!
//! Failures are split the same way callers need to react to them: structural
//! problems with the transport encoding (`DeserializationFailed`) are kept apart
//! from cryptographic rejections (`AuthenticationFailed`, `IvConstructionFailed`)
//! and from cookies that are genuine but stale (`SessionExpired`).

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors produced while issuing or verifying a session cookie
#[derive(Debug, Error)]
pub enum CookieError {
    /// The stored IV could not be turned into a cipher IV of the expected length
    #[error("IV construction failed: got {} bytes", .0.len())]
    IvConstructionFailed(Vec<u8>),

    /// The derived or server key could not initialize the cipher
    #[error("Key initialization failed: {0}")]
    KeyInitializationFailed(String),

    /// A key is shorter than the cipher or algorithm requires
    #[error("Key too short: required at least {required} bytes, got {actual}")]
    KeyTooShort { required: usize, actual: usize },

    /// No current or rotated key produced a matching MAC
    #[error("Authentication failed: no key matches the presented MAC")]
    AuthenticationFailed(Vec<u8>),

    /// The cookie is authentic but its expiration time has passed
    #[error("Session expired at {expires_at} (observed at {observed_at})")]
    SessionExpired {
        expires_at: DateTime<Utc>,
        observed_at: DateTime<Utc>,
    },

    /// Base64, frame or payload decoding failed structurally
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// The session value could not be encoded
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error(transparent)]
    KeySet(#[from] KeySetError),

    #[error(transparent)]
    Random(#[from] RandomError),
}

impl CookieError {
    /// Whether this failure indicates the cookie was modified after it was issued
    #[must_use]
    pub fn is_tampering(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed(_) | Self::IvConstructionFailed(_)
        )
    }

    /// Whether this failure should reject the request rather than report a server fault
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed(_)
                | Self::IvConstructionFailed(_)
                | Self::SessionExpired { .. }
                | Self::DeserializationFailed(_)
        )
    }
}

impl ResponseError for CookieError {
    fn status_code(&self) -> StatusCode {
        if self.is_rejection() {
            StatusCode::FORBIDDEN
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Never echo MACs or key material back to the client
        HttpResponse::build(self.status_code()).finish()
    }
}

/// Errors produced by a server key set
#[derive(Debug, Error)]
pub enum KeySetError {
    /// The key set holds no keys; it must be initialized with at least one
    #[error("Key set is empty")]
    Empty,

    /// The key set does not support removing keys
    #[error("Key removal is not supported by a static key set")]
    RemovalUnsupported,

    /// The renewal policy failed while refreshing keys
    #[error("Key set refresh failed: {0}")]
    Refresh(#[source] anyhow::Error),

    /// The cleanup hook failed after a key was removed
    #[error("Key cleanup failed: {0}")]
    Cleanup(#[source] anyhow::Error),

    /// A server key must contain at least one byte
    #[error("Server key is empty")]
    EmptyKey,

    /// A server key could not be decoded from its text form
    #[error("Invalid server key encoding: {0}")]
    InvalidKeyEncoding(String),
}

/// Errors produced by the random byte source
#[derive(Debug, Error)]
pub enum RandomError {
    /// The generator factory could not obtain entropy
    #[error("Failed to seed random generator: {0}")]
    Entropy(String),

    /// A single request asked for more bytes than one generator may produce
    #[error("Requested {requested} random bytes, but the reseed threshold is {threshold}")]
    RequestExceedsThreshold { requested: usize, threshold: usize },

    /// The reseed threshold must be positive
    #[error("Reseed threshold must be greater than zero")]
    InvalidThreshold,
}

/// Errors produced while loading or validating settings
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] basic_toml::Error),

    #[error("Invalid settings: {0}")]
    Invalid(String),
}
