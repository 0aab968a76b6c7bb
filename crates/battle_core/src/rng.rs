//! Seeded deterministic random number source.
//!
//! No system randomness is allowed anywhere in the simulation. All
//! probabilistic behavior (hit resolution, unload spread offsets) draws
//! from this generator, which both the server and the client prediction
//! path seed identically.

use serde::{Deserialize, Serialize};

use crate::math::Fixed;

/// SplitMix64 generator. Small state, full 64-bit period, and identical
/// output for identical seeds on every platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimRng {
    state: u64,
}

impl SimRng {
    /// Create a generator from a seed.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next raw 64-bit value.
    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Next fixed-point value in `[0, 1)`.
    ///
    /// Uses the top 32 bits of the raw output as the fractional part.
    pub fn next_fixed(&mut self) -> Fixed {
        let bits = (self.next_u64() >> 32) as i64;
        Fixed::from_bits(bits)
    }

    /// Next fixed-point value in `[-range, range)`.
    pub fn next_symmetric(&mut self, range: Fixed) -> Fixed {
        (self.next_fixed() * Fixed::from_num(2) - Fixed::ONE) * range
    }
}
