//! Key set refreshed by a user supplied policy
//!
//! Refreshing is optimistic: the policy computes the next state without any lock
//! held, and the result is committed only if nobody else changed the set in the
//! meantime. Concurrent refreshes may therefore do redundant work, but a policy
//! that blocks (for example on a remote key service) never blocks other readers.
//! There is no timeout at this layer; a hook that hangs will hang its caller.

use std::sync::{Mutex, PoisonError};

use log::{info, warn};

use super::{ActiveKeys, ServerKey, ServerKeySet};
use crate::error::KeySetError;

/// Keys plus the policy's own bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySetState<S> {
    /// Ordered keys; the head is the current key
    pub keys: Vec<ServerKey>,
    /// State owned by the renewal policy, e.g. the time of the last refresh
    pub user_state: S,
}

/// Decides when and how a [`RenewableKeySet`] refreshes its keys
///
/// The policy value itself carries whatever parameters the hooks need.
pub trait RenewalPolicy: Send + Sync {
    /// Policy-owned state stored next to the keys
    type State: Clone + PartialEq + Send;

    /// Whether the keys must be refreshed before they are handed out
    ///
    /// # Errors
    ///
    /// Any error aborts the `get_keys` call that triggered it
    fn needs_update(&self, state: &KeySetState<Self::State>) -> anyhow::Result<bool>;

    /// Compute the next state; called without any lock held
    ///
    /// # Errors
    ///
    /// Any error aborts the `get_keys` call that triggered it
    fn new_state(
        &self,
        state: &KeySetState<Self::State>,
    ) -> anyhow::Result<KeySetState<Self::State>>;

    /// Release resources tied to a key once it has been removed from the set
    ///
    /// # Errors
    ///
    /// Errors are reported to the caller of `remove_key`; the removal itself stands
    fn on_key_removed(&self, _key: &ServerKey) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct LiveState<S> {
    state: KeySetState<S>,
    // Bumped by every removal so an in-flight refresh cannot resurrect a removed key
    removals: u64,
}

/// Key set whose keys are replaced according to a [`RenewalPolicy`]
pub struct RenewableKeySet<P: RenewalPolicy> {
    policy: P,
    live: Mutex<LiveState<P::State>>,
}

impl<P: RenewalPolicy> RenewableKeySet<P> {
    /// Create a key set with its initial keys (current key first)
    ///
    /// # Errors
    ///
    /// Returns [`KeySetError::Empty`] when no keys are given
    pub fn new(policy: P, keys: Vec<ServerKey>, user_state: P::State) -> Result<Self, KeySetError> {
        if keys.is_empty() {
            return Err(KeySetError::Empty);
        }

        Ok(Self {
            policy,
            live: Mutex::new(LiveState {
                state: KeySetState { keys, user_state },
                removals: 0,
            }),
        })
    }

    /// The renewal policy
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Current keys without triggering a refresh
    #[must_use]
    pub fn keys_snapshot(&self) -> Vec<ServerKey> {
        self.lock().state.keys.clone()
    }

    /// Current policy state without triggering a refresh
    #[must_use]
    pub fn user_state(&self) -> P::State {
        self.lock().state.user_state.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LiveState<P::State>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn refresh(&self) -> Result<Vec<ServerKey>, KeySetError> {
        let observed = self.lock().clone();

        let needs_update = self
            .policy
            .needs_update(&observed.state)
            .map_err(KeySetError::Refresh)?;
        if !needs_update {
            return Ok(observed.state.keys);
        }

        let fresh = self.policy.new_state(&observed.state).map_err(|e| {
            warn!("Key set refresh failed: {e}");
            KeySetError::Refresh(e)
        })?;
        if fresh.keys.is_empty() {
            warn!("Key set refresh produced no keys; keeping the previous keys");
            return Err(KeySetError::Empty);
        }

        let mut live = self.lock();
        if live.state.user_state == observed.state.user_state && live.removals == observed.removals
        {
            info!(
                "Key set refreshed: {} active keys (was {})",
                fresh.keys.len(),
                live.state.keys.len()
            );
            live.state = fresh;
        } else {
            info!("Key set changed during refresh; keeping the concurrent result");
        }
        Ok(live.state.keys.clone())
    }
}

impl<P: RenewalPolicy> std::fmt::Debug for RenewableKeySet<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let live = self.lock();
        f.debug_struct("RenewableKeySet")
            .field("keys", &live.state.keys.len())
            .field("removals", &live.removals)
            .finish_non_exhaustive()
    }
}

impl<P: RenewalPolicy> ServerKeySet for RenewableKeySet<P> {
    fn get_keys(&self) -> Result<ActiveKeys, KeySetError> {
        let keys = self.refresh()?;
        ActiveKeys::from_ordered(&keys)
    }

    fn remove_key(&self, key: &ServerKey) -> Result<(), KeySetError> {
        let removed = {
            let mut live = self.lock();
            match live.state.keys.iter().position(|k| k == key) {
                Some(position) => {
                    live.state.keys.remove(position);
                    live.removals += 1;
                    info!(
                        "Removed key at position {position}; {} keys remain",
                        live.state.keys.len()
                    );
                    true
                }
                None => false,
            }
        };

        if removed {
            self.policy.on_key_removed(key).map_err(KeySetError::Cleanup)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mock::MockRotationPolicy;
    use crate::testing::TestFixtures;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};

    fn key(byte: u8) -> ServerKey {
        TestFixtures::server_key(byte)
    }

    #[test]
    fn test_requires_initial_key() {
        let result = RenewableKeySet::new(MockRotationPolicy::new(3), Vec::new(), 0);
        assert!(matches!(result, Err(KeySetError::Empty)));
    }

    #[test]
    fn test_no_refresh_when_not_needed() {
        let set = RenewableKeySet::new(MockRotationPolicy::new(3), vec![key(1)], 0).unwrap();
        let keys = set.get_keys().unwrap();
        assert_eq!(keys.current, key(1));
        assert!(keys.rotated.is_empty());
        assert_eq!(set.policy().refresh_calls(), 0);
    }

    #[test]
    fn test_refresh_rotates_current_key() {
        let set = RenewableKeySet::new(MockRotationPolicy::new(3), vec![key(1)], 0).unwrap();
        set.policy().queue_key(key(2));

        let keys = set.get_keys().unwrap();
        assert_eq!(keys.current, key(2));
        assert_eq!(keys.rotated, vec![key(1)]);
        assert_eq!(set.user_state(), 1);

        // Nothing pending any more
        set.get_keys().unwrap();
        assert_eq!(set.policy().refresh_calls(), 1);
    }

    #[test]
    fn test_refresh_failure_propagates() {
        let set = RenewableKeySet::new(MockRotationPolicy::new(3), vec![key(1)], 0).unwrap();
        set.policy().queue_key(key(2));
        set.policy().fail_next_refresh();

        assert!(matches!(set.get_keys(), Err(KeySetError::Refresh(_))));
        assert_eq!(set.keys_snapshot(), vec![key(1)]);
    }

    #[test]
    fn test_remove_absent_key_is_noop() {
        let set = RenewableKeySet::new(MockRotationPolicy::new(3), vec![key(1), key(0)], 0).unwrap();

        set.remove_key(&key(9)).unwrap();

        assert_eq!(set.keys_snapshot(), vec![key(1), key(0)]);
        assert!(set.policy().removed_keys().is_empty());
    }

    #[test]
    fn test_remove_present_key_invokes_cleanup_once() {
        let set = RenewableKeySet::new(
            MockRotationPolicy::new(3),
            vec![key(2), key(1), key(0)],
            0,
        )
        .unwrap();

        set.remove_key(&key(1)).unwrap();
        set.remove_key(&key(1)).unwrap();

        assert_eq!(set.keys_snapshot(), vec![key(2), key(0)]);
        assert_eq!(set.policy().removed_keys(), vec![key(1)]);
    }

    #[test]
    fn test_removing_every_key_fails_fast() {
        let set = RenewableKeySet::new(MockRotationPolicy::new(3), vec![key(1)], 0).unwrap();
        set.remove_key(&key(1)).unwrap();
        assert!(matches!(set.get_keys(), Err(KeySetError::Empty)));
    }

    /// Policy whose first refresh parks until the test releases it
    struct ParkedPolicy {
        calls: AtomicUsize,
        entered: Barrier,
        release: Barrier,
    }

    impl RenewalPolicy for ParkedPolicy {
        type State = u64;

        fn needs_update(&self, state: &KeySetState<u64>) -> anyhow::Result<bool> {
            Ok(state.user_state == 0)
        }

        fn new_state(&self, state: &KeySetState<u64>) -> anyhow::Result<KeySetState<u64>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                self.entered.wait();
                self.release.wait();
            }
            let tag = u8::try_from(100 + call)?;
            let mut keys = vec![TestFixtures::server_key(tag)];
            keys.extend(state.keys.iter().cloned());
            Ok(KeySetState {
                keys,
                user_state: state.user_state + 1,
            })
        }
    }

    fn parked_set(keys: Vec<ServerKey>) -> Arc<RenewableKeySet<ParkedPolicy>> {
        let policy = ParkedPolicy {
            calls: AtomicUsize::new(0),
            entered: Barrier::new(2),
            release: Barrier::new(2),
        };
        Arc::new(RenewableKeySet::new(policy, keys, 0).unwrap())
    }

    #[test]
    fn test_concurrent_refresh_keeps_first_committed_state() {
        let set = parked_set(vec![key(1)]);

        let slow = {
            let set = Arc::clone(&set);
            std::thread::spawn(move || set.get_keys().unwrap())
        };

        set.policy().entered.wait();
        let fast = set.get_keys().unwrap();
        set.policy().release.wait();
        let slow = slow.join().unwrap();

        assert_eq!(fast.current, key(101));
        assert_eq!(slow.current, key(101));
        assert_eq!(set.keys_snapshot(), vec![key(101), key(1)]);
    }

    #[test]
    fn test_removal_during_refresh_is_not_overwritten() {
        let set = parked_set(vec![key(1), key(0)]);

        let refresher = {
            let set = Arc::clone(&set);
            std::thread::spawn(move || set.get_keys().unwrap())
        };

        set.policy().entered.wait();
        set.remove_key(&key(0)).unwrap();
        set.policy().release.wait();
        let seen = refresher.join().unwrap();

        assert_eq!(seen.current, key(1));
        assert!(seen.rotated.is_empty());
        assert!(!set.keys_snapshot().contains(&key(0)));
    }
}
