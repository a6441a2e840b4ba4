//! CPU Opponent
//!
//! A deterministic binary-search strategy: always guess the floor midpoint
//! of the live interval. Against a consistent interval this finds any
//! secret within `floor(log2(initial_range)) + 1` guesses.

use crate::guess::range::GuessRange;

/// The house opponent.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuOpponent;

impl CpuOpponent {
    /// The CPU's next guess: the floor midpoint of the interval.
    pub fn next_guess(range: &GuessRange) -> u32 {
        (range.min + range.max) / 2
    }
}
