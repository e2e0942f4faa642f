//! Random sources backed by the `rand` crate.

use parking_lot::Mutex;
use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};

use crate::ports::outbound::RandomSource;

/// Draws straight from the operating system's CSPRNG.
///
/// Used for rotation suffixes, which must not be predictable.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandomSource;

impl RandomSource for OsRandomSource {
    fn next_u64(&self) -> u64 {
        OsRng.next_u64()
    }
}

/// `StdRng` behind a mutex, for the random-pick chooser.
#[derive(Debug)]
pub struct SeededRandomSource {
    rng: Mutex<StdRng>,
}

impl SeededRandomSource {
    /// Seeded from OS entropy.
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Fixed seed: the same sequence on every run.
    pub fn from_seed_u64(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandomSource {
    fn next_u64(&self) -> u64 {
        self.rng.lock().next_u64()
    }
}
