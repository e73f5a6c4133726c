//! Seeded random number generation.
//!
//! All randomness in the engines flows through [`Random`]. Work that may run in
//! parallel draws from a stream derived from the model seed and a stable key
//! (column index, iteration), so results do not depend on scheduling.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// A deterministic pseudo-random number generator.
///
/// # Example
///
/// ```rust
/// use neocortex::utils::Random;
///
/// let mut rng = Random::new(42);
/// let f = rng.get_real64();
/// assert!((0.0..1.0).contains(&f));
///
/// // Streams keyed by the same value always agree.
/// let mut a = Random::from_stream(42, 7);
/// let mut b = Random::from_stream(42, 7);
/// assert_eq!(a.get_uint64(), b.get_uint64());
/// ```
pub struct Random {
    rng: ChaCha20Rng,
    seed: u64,
    /// Number of random values generated (for state reconstruction).
    steps: u64,
}

// Serialized as seed + steps; the generator is replayed on load.
#[cfg(feature = "serde")]
mod serde_impl {
    use super::*;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct RandomState {
        seed: u64,
        steps: u64,
    }

    impl Serialize for Random {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            RandomState {
                seed: self.seed,
                steps: self.steps,
            }
            .serialize(serializer)
        }
    }

    impl<'de> Deserialize<'de> for Random {
        fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: Deserializer<'de>,
        {
            let state = RandomState::deserialize(deserializer)?;
            let mut rng = ChaCha20Rng::seed_from_u64(state.seed);
            for _ in 0..state.steps {
                let _: u64 = rng.gen();
            }
            Ok(Random {
                rng,
                seed: state.seed,
                steps: state.steps,
            })
        }
    }
}

/// SplitMix64 finalizer.
fn mix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

impl Random {
    /// Creates a new random number generator with the given seed.
    ///
    /// A negative seed draws the actual seed from system randomness.
    #[must_use]
    pub fn new(seed: i64) -> Self {
        let actual_seed = if seed < 0 {
            rand::thread_rng().gen()
        } else {
            seed as u64
        };
        Self::from_seed(actual_seed)
    }

    fn from_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
            seed,
            steps: 0,
        }
    }

    /// Creates the generator of an independent stream keyed by `stream`.
    #[must_use]
    pub fn from_stream(seed: u64, stream: u64) -> Self {
        Self::from_seed(mix64(seed ^ mix64(stream)))
    }

    /// Returns the seed used for this generator.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Returns the number of random values generated.
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Generates a random u64.
    pub fn get_uint64(&mut self) -> u64 {
        self.steps += 1;
        self.rng.gen()
    }

    /// Generates a random usize in the range [0, n).
    pub fn get_usize(&mut self, n: usize) -> usize {
        self.steps += 1;
        if n == 0 {
            return 0;
        }
        self.rng.gen_range(0..n)
    }

    /// Generates a random f64 in [0, 1).
    pub fn get_real64(&mut self) -> f64 {
        self.steps += 1;
        self.rng.gen()
    }

    /// Shuffles a slice in place using Fisher-Yates algorithm.
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        let n = slice.len();
        if n <= 1 {
            return;
        }

        for i in (1..n).rev() {
            let j = self.get_usize(i + 1);
            slice.swap(i, j);
        }
    }

    /// Samples `k` unique items from a collection without replacement.
    ///
    /// If `k >= items.len()`, returns a shuffled copy of all items.
    pub fn sample<T>(&mut self, mut items: Vec<T>, k: usize) -> Vec<T> {
        let n = items.len();
        if k >= n {
            self.shuffle(&mut items);
            return items;
        }

        // Partial Fisher-Yates
        for i in 0..k {
            let j = self.get_usize(n - i) + i;
            items.swap(i, j);
        }

        items.truncate(k);
        items
    }
}

impl Default for Random {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Clone for Random {
    fn clone(&self) -> Self {
        Self {
            rng: self.rng.clone(),
            seed: self.seed,
            steps: self.steps,
        }
    }
}

impl PartialEq for Random {
    fn eq(&self, other: &Self) -> bool {
        self.seed == other.seed && self.steps == other.steps
    }
}

impl std::fmt::Debug for Random {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Random")
            .field("seed", &self.seed)
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}
