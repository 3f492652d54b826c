//! Deterministic per-event randomness.
//!
//! Every draw is a pure function of its seed, so re-rendering the same region
//! yields the same probability and humanize decisions regardless of block
//! size.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Combine an absolute sample position, an instance id and an event index
/// into one seed.
#[inline]
pub fn event_seed(sample: u64, instance: u32, event_index: u32) -> u64 {
    sample ^ u64::from(instance).rotate_left(32) ^ u64::from(event_index).rotate_left(48)
}

/// Uniform value in `[0, 1)`.
#[inline]
pub fn unit(seed: u64) -> f32 {
    ChaCha8Rng::seed_from_u64(seed).gen::<f32>()
}

/// Uniform value in `[-1, 1)`.
#[inline]
pub fn bipolar(seed: u64) -> f32 {
    unit(seed) * 2.0 - 1.0
}

/// True with probability `p`.
#[inline]
pub fn chance(seed: u64, p: f32) -> bool {
    if p >= 1.0 {
        return true;
    }
    if p <= 0.0 || p.is_nan() {
        return false;
    }
    unit(seed) < p
}
