//! Scripted key renewal policy for testing rotation

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::bail;

use crate::keys::{KeySetState, RenewalPolicy, ServerKey};

#[derive(Default)]
struct Script {
    pending: VecDeque<ServerKey>,
    fail_next: bool,
    refresh_calls: usize,
    removed: Vec<ServerKey>,
}

/// Renewal policy driven by the test
///
/// A refresh is due whenever a key has been queued. Each refresh makes the next
/// queued key current, keeps at most `max_keys` keys, and bumps the state counter.
pub struct MockRotationPolicy {
    max_keys: usize,
    script: Mutex<Script>,
}

impl MockRotationPolicy {
    #[must_use]
    pub fn new(max_keys: usize) -> Self {
        Self {
            max_keys,
            script: Mutex::new(Script::default()),
        }
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a key to become current on the next refresh
    pub fn queue_key(&self, key: ServerKey) {
        self.script().pending.push_back(key);
    }

    /// Make the next refresh fail
    pub fn fail_next_refresh(&self) {
        self.script().fail_next = true;
    }

    #[must_use]
    pub fn refresh_calls(&self) -> usize {
        self.script().refresh_calls
    }

    /// Keys passed to the cleanup hook, in order
    #[must_use]
    pub fn removed_keys(&self) -> Vec<ServerKey> {
        self.script().removed.clone()
    }
}

impl RenewalPolicy for MockRotationPolicy {
    type State = u64;

    fn needs_update(&self, _state: &KeySetState<u64>) -> anyhow::Result<bool> {
        Ok(!self.script().pending.is_empty())
    }

    fn new_state(&self, state: &KeySetState<u64>) -> anyhow::Result<KeySetState<u64>> {
        let mut script = self.script();
        script.refresh_calls += 1;
        if std::mem::take(&mut script.fail_next) {
            bail!("key store unavailable");
        }
        let Some(next) = script.pending.pop_front() else {
            return Ok(state.clone());
        };

        let mut keys = vec![next];
        keys.extend(state.keys.iter().cloned());
        keys.truncate(self.max_keys);
        Ok(KeySetState {
            keys,
            user_state: state.user_state + 1,
        })
    }

    fn on_key_removed(&self, key: &ServerKey) -> anyhow::Result<()> {
        self.script().removed.push(key.clone());
        Ok(())
    }
}
