use super::{ActiveKeys, ServerKey, ServerKeySet};
use crate::error::KeySetError;

/// Key set holding exactly one immutable key
#[derive(Debug, Clone)]
pub struct StaticKeySet {
    key: ServerKey,
}

impl StaticKeySet {
    #[must_use]
    pub fn new(key: ServerKey) -> Self {
        Self { key }
    }

    /// The single key of this set
    #[must_use]
    pub fn key(&self) -> &ServerKey {
        &self.key
    }
}

impl From<ServerKey> for StaticKeySet {
    fn from(key: ServerKey) -> Self {
        Self::new(key)
    }
}

impl ServerKeySet for StaticKeySet {
    fn get_keys(&self) -> Result<ActiveKeys, KeySetError> {
        Ok(ActiveKeys {
            current: self.key.clone(),
            rotated: Vec::new(),
        })
    }

    fn remove_key(&self, _key: &ServerKey) -> Result<(), KeySetError> {
        Err(KeySetError::RemovalUnsupported)
    }
}
