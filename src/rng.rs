//! Random number generation for split decisions.
//!
//! The core uses randomness for exactly two things: breaking ties between
//! equal-gain split candidates, and sampling cut positions for
//! data-independent (differentially-private) boosting. Neither needs
//! cryptographic quality, so the deterministic generator is a Xoshiro256++
//! stream; the caller can pass one in for reproducibility, or let the core
//! seed one from the operating system.

use rand::rngs::OsRng;
use rand::{Rng, RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::error::BoostError;

/// Deterministic RNG for tie-breaking and random split sampling.
#[derive(Debug, Clone)]
pub struct SplitRng {
    inner: Xoshiro256PlusPlus,
}

impl SplitRng {
    /// A deterministic stream from an explicit 64-bit seed.
    pub fn seed_from_u64(seed: u64) -> Self {
        Self { inner: Xoshiro256PlusPlus::seed_from_u64(seed) }
    }

    /// A stream seeded from the operating system's entropy source.
    ///
    /// Entropy failure is surfaced as a result value instead of a panic so
    /// the orchestrator can report it through the normal error channel.
    pub fn from_entropy() -> Result<Self, BoostError> {
        let mut seed_bytes = [0u8; 8];
        OsRng
            .try_fill_bytes(&mut seed_bytes)
            .map_err(|_| BoostError::UnexpectedInternal("os entropy source failed"))?;
        Ok(Self::seed_from_u64(u64::from_le_bytes(seed_bytes)))
    }

    /// Uniform draw from `0..bound`. `bound` must be nonzero.
    #[inline]
    pub fn next_below(&mut self, bound: usize) -> usize {
        debug_assert!(bound > 0);
        self.inner.gen_range(0..bound)
    }

    /// Fair coin flip, used to break exact gain ties.
    #[inline]
    pub fn flip(&mut self) -> bool {
        self.inner.next_u64() & 1 == 1
    }

    /// Sample `count` distinct values from `lo..hi`, returned sorted.
    ///
    /// Partial Fisher-Yates over the candidate range; `count` is clamped to
    /// the range size.
    pub fn sample_distinct_sorted(&mut self, lo: usize, hi: usize, count: usize) -> Vec<usize> {
        let mut pool: Vec<usize> = (lo..hi).collect();
        let count = count.min(pool.len());
        for i in 0..count {
            let j = i + self.next_below(pool.len() - i);
            pool.swap(i, j);
        }
        pool.truncate(count);
        pool.sort_unstable();
        pool
    }
}
