//! Testing utilities for authcookie
//!
//! - [`fixtures`] - pre-built settings, keys, random sources and sessions
//! - [`mock`] - scripted key renewal policy
//!
//! ## Usage
//!
//! ```rust,ignore
//! use authcookie::session::{decrypt_session, encrypt_session, ExtendedPayloadWrapper};
//! use authcookie::testing::{TestFixtures, TestSession};
//!
//! let settings = TestFixtures::settings();
//! let random = TestFixtures::random_source();
//! let keys = TestFixtures::static_keys();
//!
//! let cookie = encrypt_session(&settings, &random, &keys, &TestFixtures::alice()).unwrap();
//! let session: ExtendedPayloadWrapper<TestSession> =
//!     decrypt_session(&settings, &keys, cookie.as_str()).unwrap();
//! assert_eq!(session.session.user, "alice");
//! ```

pub mod fixtures;
pub mod mock;

pub use fixtures::{TestFixtures, TestSession};

/// Common test constants
pub mod constants {
    /// User name carried by [`super::TestFixtures::alice`]
    pub const TEST_USER: &str = "alice";

    /// Length of fixture server keys, enough for AES-256
    pub const TEST_KEY_LEN: usize = 32;

    /// Byte filling the key returned by [`super::TestFixtures::static_keys`]
    pub const TEST_KEY_BYTE: u8 = 7;
}
