//! Test fixtures providing pre-built test objects

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::constants::{TEST_KEY_BYTE, TEST_KEY_LEN, TEST_USER};
use super::mock::MockRotationPolicy;
use crate::keys::{RenewableKeySet, ServerKey, StaticKeySet};
use crate::random::{RandomSource, DEFAULT_RESEED_THRESHOLD};
use crate::settings::AuthCookieSettings;

/// Minimal session value used across tests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSession {
    pub user: String,
}

/// Central fixture provider for all test data
pub struct TestFixtures;

impl TestFixtures {
    /// Default settings: 12 hour sessions, AES-256, SHA-256
    #[must_use]
    pub fn settings() -> AuthCookieSettings {
        AuthCookieSettings::default()
    }

    /// OS-seeded random source with the default reseed threshold
    ///
    /// # Panics
    ///
    /// Panics if the OS entropy source is unavailable.
    #[must_use]
    pub fn random_source() -> RandomSource<StdRng> {
        RandomSource::from_os_rng(DEFAULT_RESEED_THRESHOLD).expect("OS entropy source")
    }

    /// 32-byte server key filled with `byte`, so keys are easy to tell apart
    ///
    /// # Panics
    ///
    /// Never in practice; the key is not empty.
    #[must_use]
    pub fn server_key(byte: u8) -> ServerKey {
        ServerKey::new(vec![byte; TEST_KEY_LEN]).expect("non-empty key")
    }

    /// Key set with a single fixed key
    #[must_use]
    pub fn static_keys() -> StaticKeySet {
        StaticKeySet::new(Self::server_key(TEST_KEY_BYTE))
    }

    /// Renewable key set whose current key is `server_key(current)` followed by
    /// the rotated keys in order
    ///
    /// # Panics
    ///
    /// Never in practice; the set always holds the current key.
    #[must_use]
    pub fn rotated_keys(current: u8, rotated: &[u8]) -> RenewableKeySet<MockRotationPolicy> {
        let keys: Vec<ServerKey> = std::iter::once(current)
            .chain(rotated.iter().copied())
            .map(Self::server_key)
            .collect();
        let max_keys = keys.len() + 1;
        RenewableKeySet::new(MockRotationPolicy::new(max_keys), keys, 0)
            .expect("key set with a current key")
    }

    /// The session used in most tests
    #[must_use]
    pub fn alice() -> TestSession {
        TestSession {
            user: TEST_USER.to_string(),
        }
    }
}
