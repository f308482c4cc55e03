use std::fmt;
use std::fs;
use std::path::Path;

use chrono::format::{Item, StrftimeItems};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::crypto::{ctr_transform, BlockCipher, CipherTransform, HashAlgorithm};
use crate::error::SettingsError;

/// Default cookie name carrying the session
pub const DEFAULT_SESSION_FIELD: &str = "Session";

/// Default session lifetime: 12 hours
pub const DEFAULT_MAX_AGE_SECONDS: i64 = 12 * 60 * 60;

/// Default format of the `Expires` attribute on deletion cookies
pub const DEFAULT_EXPIRATION_FORMAT: &str = "%a, %d-%b-%Y %H:%M:%S GMT";

/// Boolean attributes attached to the session cookie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CookieFlag {
    HttpOnly,
    Secure,
}

/// Immutable configuration of the session cookie protocol
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthCookieSettings {
    /// Name of the cookie carrying the session
    pub session_field: String,
    pub cookie_flags: Vec<CookieFlag>,
    /// Session lifetime, also sent as the cookie's `Max-Age`
    pub max_age_seconds: i64,
    /// chrono format string for the `Expires` attribute
    pub expiration_format: String,
    pub path: String,
    pub hash_algorithm: HashAlgorithm,
    pub cipher: BlockCipher,
    #[serde(skip, default = "default_transform")]
    pub encrypt_transform: CipherTransform,
    #[serde(skip, default = "default_transform")]
    pub decrypt_transform: CipherTransform,
}

fn default_transform() -> CipherTransform {
    ctr_transform
}

impl Default for AuthCookieSettings {
    fn default() -> Self {
        Self {
            session_field: DEFAULT_SESSION_FIELD.to_string(),
            cookie_flags: vec![CookieFlag::HttpOnly, CookieFlag::Secure],
            max_age_seconds: DEFAULT_MAX_AGE_SECONDS,
            expiration_format: DEFAULT_EXPIRATION_FORMAT.to_string(),
            path: "/".to_string(),
            hash_algorithm: HashAlgorithm::default(),
            cipher: BlockCipher::default(),
            encrypt_transform: ctr_transform,
            decrypt_transform: ctr_transform,
        }
    }
}

impl fmt::Debug for AuthCookieSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthCookieSettings")
            .field("session_field", &self.session_field)
            .field("cookie_flags", &self.cookie_flags)
            .field("max_age_seconds", &self.max_age_seconds)
            .field("expiration_format", &self.expiration_format)
            .field("path", &self.path)
            .field("hash_algorithm", &self.hash_algorithm)
            .field("cipher", &self.cipher)
            .finish_non_exhaustive()
    }
}

impl AuthCookieSettings {
    /// Session lifetime
    #[must_use]
    pub fn max_age(&self) -> TimeDelta {
        TimeDelta::try_seconds(self.max_age_seconds).unwrap_or(TimeDelta::MAX)
    }

    /// Whether `flag` is set on issued cookies
    #[must_use]
    pub fn has_flag(&self, flag: CookieFlag) -> bool {
        self.cookie_flags.contains(&flag)
    }

    /// Parse settings from TOML; missing keys take their defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or the result fails validation
    pub fn from_toml_str(content: &str) -> Result<Self, SettingsError> {
        let settings: Self = basic_toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a TOML file, then apply environment overrides
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut settings: Self = basic_toml::from_str(&content)?;
        log::info!("Loaded cookie settings from {}", path.display());

        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    /// Apply `AUTH_COOKIE_*` environment overrides; unparsable values are ignored
    pub fn apply_env_overrides(&mut self) {
        if let Ok(field) = std::env::var("AUTH_COOKIE_FIELD") {
            if !field.is_empty() {
                self.session_field = field;
            }
        }
        if let Ok(path) = std::env::var("AUTH_COOKIE_PATH") {
            self.path = path;
        }
        if let Ok(value) = std::env::var("AUTH_COOKIE_MAX_AGE_SECONDS") {
            if let Ok(seconds) = value.parse::<i64>() {
                self.max_age_seconds = seconds;
            }
        }
        if let Ok(value) = std::env::var("AUTH_COOKIE_SECURE") {
            if let Ok(secure) = value.parse::<bool>() {
                self.cookie_flags.retain(|flag| *flag != CookieFlag::Secure);
                if secure {
                    self.cookie_flags.push(CookieFlag::Secure);
                }
            }
        }
    }

    /// Check invariants the protocol relies on
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Invalid`] describing the first violated rule
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.session_field.is_empty() {
            return Err(SettingsError::Invalid(
                "session_field must not be empty".to_string(),
            ));
        }
        if self.max_age_seconds <= 0 {
            return Err(SettingsError::Invalid(format!(
                "max_age_seconds must be positive, got {}",
                self.max_age_seconds
            )));
        }
        if !self.path.starts_with('/') {
            return Err(SettingsError::Invalid(format!(
                "path must start with '/', got '{}'",
                self.path
            )));
        }
        if !is_valid_format(&self.expiration_format) {
            return Err(SettingsError::Invalid(format!(
                "invalid expiration_format '{}'",
                self.expiration_format
            )));
        }
        Ok(())
    }
}

/// Whether a chrono format string contains only recognized specifiers
#[must_use]
pub fn is_valid_format(format: &str) -> bool {
    StrftimeItems::new(format).all(|item| !matches!(item, Item::Error))
}

/// Initialize `env_logger` for binaries embedding the crate
///
/// # Errors
///
/// Returns an error if a global logger is already installed
pub fn init_logging() -> Result<(), log::SetLoggerError> {
    env_logger::try_init()
}
