// Seedable source of uniform integers for sequence generation.
//
// The Markov chain samples its next symbol by drawing an integer in
// `[1, row_total]` and walking the transition row. That draw is the only
// randomness in the whole generator, so it goes through the small
// `UniformSource` trait defined here: production code hands in a `SeqRng`,
// tests hand in a scripted source that returns fixed draws.
//
// `SeqRng` is xoshiro256++ (Blackman & Vigna, 2019) seeded through
// SplitMix64. Output depends only on the seed, never on the platform, so a
// generated piece can be reproduced from its seed alone.

use serde::{Deserialize, Serialize};

/// A source of uniformly distributed integers.
///
/// Implementations must return a value in `[low, high]` (both inclusive)
/// with every value equally likely. Callers guarantee `low <= high`.
pub trait UniformSource {
    fn uniform_inclusive(&mut self, low: u64, high: u64) -> u64;
}

impl<S: UniformSource + ?Sized> UniformSource for &mut S {
    fn uniform_inclusive(&mut self, low: u64, high: u64) -> u64 {
        (**self).uniform_inclusive(low, high)
    }
}

/// Xoshiro256++ generator.
///
/// Two `SeqRng`s built from the same seed yield identical streams. The state
/// is serializable so a generation run can be checkpointed and resumed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeqRng {
    s: [u64; 4],
}

impl SeqRng {
    /// Create a generator from a `u64` seed, expanded with SplitMix64.
    pub fn new(seed: u64) -> Self {
        let mut sm = seed;
        Self {
            s: [
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
            ],
        }
    }

    /// Seed from the system clock. Used when the caller did not ask for a
    /// reproducible run; the chosen seed is returned so it can be logged.
    pub fn from_entropy() -> (Self, u64) {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let seed = nanos ^ u64::from(std::process::id()).rotate_left(32);
        (Self::new(seed), seed)
    }

    pub fn next_u64(&mut self) -> u64 {
        let result = (self.s[0].wrapping_add(self.s[3]))
            .rotate_left(23)
            .wrapping_add(self.s[0]);

        let t = self.s[1] << 17;

        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];

        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);

        result
    }

    /// Uniform integer in `[low, high)` using rejection sampling, so small
    /// ranges carry no modulo bias.
    ///
    /// Panics if `low >= high`.
    pub fn range_u64(&mut self, low: u64, high: u64) -> u64 {
        assert!(low < high, "range_u64: low must be less than high");
        let span = high - low;
        if span.is_power_of_two() {
            return low + (self.next_u64() & (span - 1));
        }
        let threshold = span.wrapping_neg() % span;
        loop {
            let r = self.next_u64();
            if r >= threshold {
                return low + (r % span);
            }
        }
    }
}

impl UniformSource for SeqRng {
    fn uniform_inclusive(&mut self, low: u64, high: u64) -> u64 {
        if high == u64::MAX {
            // The exclusive bound would overflow; fold the full-width case
            // back onto raw output.
            if low == 0 {
                return self.next_u64();
            }
            return low + self.range_u64(0, high - low + 1);
        }
        self.range_u64(low, high + 1)
    }
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
