//! Self-reseeding random byte source
//!
//! A single deterministic generator serves IVs and padding for many cookies, but
//! never more than `threshold` bytes. Every request also builds a fresh standby
//! generator *before* touching the shared state, so swapping generators never waits
//! on the entropy source while the state lock is held.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use rand::{rngs::StdRng, RngCore, SeedableRng};

use crate::error::RandomError;

/// Default number of bytes drawn from one generator before it is replaced
pub const DEFAULT_RESEED_THRESHOLD: usize = 1 << 20;

type GeneratorFactory<R> = Box<dyn Fn() -> Result<R, RandomError> + Send + Sync>;

struct GeneratorState<R> {
    generator: R,
    produced: usize,
}

/// Thread-safe pseudo-random byte generator with periodic reseeding
pub struct RandomSource<R = StdRng> {
    state: Mutex<GeneratorState<R>>,
    factory: GeneratorFactory<R>,
    threshold: usize,
}

impl<R: RngCore> RandomSource<R> {
    /// Create a random source from a generator factory
    ///
    /// The factory is called once here and once per [`Self::get_random_bytes`] call.
    ///
    /// # Errors
    ///
    /// Returns an error if `threshold` is zero or the factory fails.
    pub fn new<F>(factory: F, threshold: usize) -> Result<Self, RandomError>
    where
        F: Fn() -> Result<R, RandomError> + Send + Sync + 'static,
    {
        if threshold == 0 {
            return Err(RandomError::InvalidThreshold);
        }

        let generator = factory()?;
        Ok(Self {
            state: Mutex::new(GeneratorState {
                generator,
                produced: 0,
            }),
            factory: Box::new(factory),
            threshold,
        })
    }

    /// Maximum number of bytes any single generator produces
    #[must_use]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Return `n` random bytes
    ///
    /// The bytes come from the live generator unless that would push it past the
    /// threshold, in which case the standby generator takes over first.
    ///
    /// # Errors
    ///
    /// Returns an error if `n` exceeds the threshold or the factory fails.
    pub fn get_random_bytes(&self, n: usize) -> Result<Vec<u8>, RandomError> {
        if n > self.threshold {
            return Err(RandomError::RequestExceedsThreshold {
                requested: n,
                threshold: self.threshold,
            });
        }

        let standby = (self.factory)()?;
        let mut bytes = vec![0u8; n];

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let produced = state.produced + n;
        if produced > self.threshold {
            log::debug!(
                "Reseeding random source after {} bytes (threshold {})",
                state.produced,
                self.threshold
            );
            *state = GeneratorState {
                generator: standby,
                produced: n,
            };
        } else {
            state.produced = produced;
        }
        state.generator.fill_bytes(&mut bytes);

        Ok(bytes)
    }
}

impl RandomSource<StdRng> {
    /// Create a random source whose generators are seeded from the operating system
    ///
    /// # Errors
    ///
    /// Returns an error if the threshold is zero or the OS entropy source is unavailable.
    pub fn from_os_rng(threshold: usize) -> Result<Self, RandomError> {
        Self::new(
            || StdRng::try_from_os_rng().map_err(|e| RandomError::Entropy(e.to_string())),
            threshold,
        )
    }
}

impl<R> fmt::Debug for RandomSource<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomSource")
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}
