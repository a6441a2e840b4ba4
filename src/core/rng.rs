//! Deterministic Random Number Generator
//!
//! Uses Xorshift128+ algorithm for fast, high-quality, deterministic randomness.
//! Every draw in a tournament (coin flips, dice volleys, hit rolls, the
//! initial bracket shuffle) comes from one of these, seeded from the season,
//! so a resumed run replays the same bracket order.

use serde::{Serialize, Deserialize};
use sha2::{Sha256, Digest};

/// Deterministic PRNG using Xorshift128+ algorithm.
///
/// # Determinism Guarantee
///
/// Given the same seed, this RNG will produce the exact same sequence
/// of random numbers on any platform.
///
/// # Example
///
/// ```
/// use catsiege::core::rng::DeterministicRng;
///
/// let mut rng = DeterministicRng::new(12345);
/// let value = rng.next_u64();
/// assert_eq!(value, 6233086606872742541); // Always the same!
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Create a new RNG from a 64-bit seed.
    ///
    /// Uses SplitMix64 to initialize the internal state, ensuring
    /// good distribution even from weak seeds.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // Ensure state is never all zeros
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Generate the next 64-bit random value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    /// Generate a random u32.
    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        self.next_u64() as u32
    }

    /// Generate a random integer in range [0, max).
    #[inline]
    pub fn next_int(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        // Simple modulo - slight bias for very large max, but acceptable
        (self.next_u64() % max as u64) as u32
    }

    /// Generate a random integer in range [min, max].
    #[inline]
    pub fn next_int_range(&mut self, min: i32, max: i32) -> i32 {
        if min >= max {
            return min;
        }
        let range = (max - min + 1) as u32;
        min + self.next_int(range) as i32
    }

    /// Flip a fair coin.
    #[inline]
    pub fn coin_flip(&mut self) -> bool {
        self.next_u64() & 1 == 1
    }

    /// Roll a single six-sided die, returning a value in [1, 6].
    #[inline]
    pub fn roll_die(&mut self) -> u32 {
        1 + self.next_int(6)
    }

    /// Draw a hit roll in [0, 100) for the exchange damage table.
    #[inline]
    pub fn hit_roll(&mut self) -> u32 {
        self.next_int(100)
    }

    /// Shuffle a slice in place using Fisher-Yates algorithm.
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        let len = slice.len();
        for i in (1..len).rev() {
            let j = self.next_int((i + 1) as u32) as usize;
            slice.swap(i, j);
        }
    }

    /// Select a random element from a slice.
    pub fn choose<'a, T>(&mut self, slice: &'a [T]) -> Option<&'a T> {
        if slice.is_empty() {
            None
        } else {
            let idx = self.next_int(slice.len() as u32) as usize;
            Some(&slice[idx])
        }
    }

    /// Get current state (for checkpointing/debugging).
    pub fn state(&self) -> [u64; 2] {
        self.state
    }

    /// Restore from saved state.
    pub fn set_state(&mut self, state: [u64; 2]) {
        self.state = state;
    }
}

/// SplitMix64 for seed initialization.
/// Produces well-distributed values from sequential seeds.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Derive the RNG seed for a tournament season.
///
/// The seed is a function of the season label and the full sorted entrant
/// id list, so the same roster always produces the same bracket order and
/// battle outcomes: a restarted server resumes an identical run.
///
/// # Parameters
///
/// - `season`: Season label (e.g. "season-3")
/// - `entrant_ids`: All entrant IDs (MUST be sorted for determinism)
pub fn derive_tournament_seed(season: &str, entrant_ids: &[u32]) -> u64 {
    let mut hasher = Sha256::new();

    // Domain separator
    hasher.update(b"CATSIEGE_SEED_V1");

    // Season label
    hasher.update(season.as_bytes());

    // Entrant IDs (sorted for determinism)
    // IMPORTANT: Caller must ensure entrant_ids is sorted!
    for id in entrant_ids {
        hasher.update(id.to_le_bytes());
    }

    let hash = hasher.finalize();

    // Take first 8 bytes as seed
    u64::from_le_bytes(hash[0..8].try_into().unwrap())
}

/// Derive an independent per-match seed.
///
/// Matches in a round run concurrently, so each gets its own RNG stream
/// derived from the tournament seed, the round index, and the unordered
/// match key. Concurrency can then never perturb battle outcomes.
pub fn derive_match_seed(tournament_seed: u64, round: usize, match_key: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(b"CATSIEGE_MATCH_V1");
    hasher.update(tournament_seed.to_le_bytes());
    hasher.update((round as u64).to_le_bytes());
    hasher.update(match_key.as_bytes());

    let hash = hasher.finalize();
    u64::from_le_bytes(hash[0..8].try_into().unwrap())
}

// =============================================================================
// TESTS
// =============================================================================
