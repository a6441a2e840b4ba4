//! Core deterministic primitives.
//!
//! The RNG here drives every random outcome in the simulation. Keeping it
//! seeded and deterministic means a tournament can be replayed or resumed
//! from its snapshot without diverging.

pub mod rng;

// Re-export core types
pub use rng::{DeterministicRng, derive_tournament_seed, derive_match_seed};
