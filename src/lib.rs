#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![deny(warnings)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the authcookie library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cookie;
pub mod crypto;
pub mod error;
pub mod http;
pub mod keys;
pub mod random;
pub mod session;
pub mod settings;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use cookie::{Cookie, EncryptedSession};
pub use error::{CookieError, KeySetError, RandomError, SettingsError};
pub use http::{with_auth_cookie, SessionUpdate};
pub use keys::{ActiveKeys, RenewableKeySet, RenewalPolicy, ServerKey, ServerKeySet, StaticKeySet};
pub use random::RandomSource;
pub use session::{
    decrypt_session, encrypt_session, reissue_session, ExtendedPayloadWrapper, PayloadWrapper,
};
pub use settings::AuthCookieSettings;
