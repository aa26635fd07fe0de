//! Deterministic derivation of independent random streams from one base seed.
//!
//! Every random consumer in a run (covariance draw, each cohort, each split and
//! each pathway task) owns a `StdRng` seeded from a hash of the base seed and its
//! own coordinates. Streams never depend on which worker thread executes them.

use rand::SeedableRng;
use rand::rngs::StdRng;

const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

/// SplitMix64 finaliser.
pub fn splitmix64(value: u64) -> u64 {
    let mut z = value.wrapping_add(GOLDEN_GAMMA);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Identifies one consumer of randomness within a run.
///
/// Scenario streams are keyed by sample size, never by a scenario's position in
/// the configured list, so adding or skipping a scenario leaves the others intact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SeedStream {
    Covariance,
    Cohort { sample_size: usize },
    Split { sample_size: usize },
    Task { pathway: usize, sample_size: usize },
}

impl SeedStream {
    fn coordinates(self) -> (u64, u64, u64) {
        match self {
            Self::Covariance => (1, 0, 0),
            Self::Cohort { sample_size } => (2, sample_size as u64, 0),
            Self::Split { sample_size } => (3, sample_size as u64, 0),
            Self::Task {
                pathway,
                sample_size,
            } => (4, pathway as u64, sample_size as u64),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeedSequence {
    base: u64,
}

impl SeedSequence {
    pub fn new(base: u64) -> Self {
        Self { base }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn derive(&self, stream: SeedStream) -> u64 {
        let (tag, first, second) = stream.coordinates();
        let mut state = splitmix64(self.base ^ tag.wrapping_mul(GOLDEN_GAMMA));
        state = splitmix64(state ^ first);
        splitmix64(state ^ second.rotate_left(32))
    }

    pub fn rng(&self, stream: SeedStream) -> StdRng {
        StdRng::seed_from_u64(self.derive(stream))
    }
}
