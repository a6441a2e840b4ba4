//! Guess Interval
//!
//! The live `[min, max]` interval a guessing round narrows toward the
//! secret. Narrowing is exclusive: a wrong guess removes itself from the
//! interval (`min = guess + 1` / `max = guess - 1`), which keeps the CPU's
//! binary search at `floor(log2(range)) + 1` worst-case turns.

use serde::{Serialize, Deserialize};

use crate::core::rng::DeterministicRng;

/// Verdict for a single guess.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuessOutcome {
    /// The guess found the secret.
    Correct,
    /// The secret is higher.
    TooLow,
    /// The secret is lower.
    TooHigh,
}

/// The live guess interval.
///
/// Invariant: `min <= secret <= max` holds from creation until a correct
/// guess ends the round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuessRange {
    /// Lowest value the secret can still be.
    pub min: u32,
    /// Highest value the secret can still be.
    pub max: u32,
}

impl GuessRange {
    /// Full starting interval `[1, upper]`.
    pub fn new(upper: u32) -> Self {
        Self { min: 1, max: upper }
    }

    /// Number of candidates left in the interval.
    pub fn size(&self) -> u32 {
        self.max.saturating_sub(self.min) + 1
    }

    /// Is a guess inside the live interval?
    pub fn contains(&self, guess: u32) -> bool {
        (self.min..=self.max).contains(&guess)
    }

    /// Narrow the interval from a guess against the secret.
    ///
    /// Exact equality ends the round immediately; otherwise the guessed
    /// value itself is excluded from the surviving interval.
    pub fn narrow(&mut self, guess: u32, secret: u32) -> GuessOutcome {
        if guess == secret {
            self.min = secret;
            self.max = secret;
            return GuessOutcome::Correct;
        }

        if guess < secret {
            self.min = guess + 1;
            GuessOutcome::TooLow
        } else {
            self.max = guess - 1;
            GuessOutcome::TooHigh
        }
    }

    /// Draw a uniformly random guess from the live interval.
    ///
    /// Used by the turn clock when a player lets their countdown expire.
    /// The auto-guess is always valid, so an expired turn still progresses
    /// the game.
    pub fn random_guess(&self, rng: &mut DeterministicRng) -> u32 {
        self.min + rng.next_int(self.size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_range_spans_one_to_upper() {
        let r = GuessRange::new(256);
        assert_eq!(r.min, 1);
        assert_eq!(r.max, 256);
        assert_eq!(r.size(), 256);
    }

    #[test]
    fn test_narrow_too_low_excludes_guess() {
        let mut r = GuessRange::new(256);
        // difficulty=256, secret=137, guess 128: range becomes [129, 256]
        assert_eq!(r.narrow(128, 137), GuessOutcome::TooLow);
        assert_eq!(r.min, 129);
        assert_eq!(r.max, 256);
    }

    #[test]
    fn test_narrow_too_high_excludes_guess() {
        let mut r = GuessRange::new(100);
        assert_eq!(r.narrow(80, 42), GuessOutcome::TooHigh);
        assert_eq!(r.min, 1);
        assert_eq!(r.max, 79);
    }

    #[test]
    fn test_correct_guess_collapses_interval() {
        let mut r = GuessRange::new(100);
        assert_eq!(r.narrow(42, 42), GuessOutcome::Correct);
        assert_eq!(r.min, 42);
        assert_eq!(r.max, 42);
        assert_eq!(r.size(), 1);
    }

    #[test]
    fn test_invariant_holds_through_narrowing() {
        let secret = 73;
        let mut r = GuessRange::new(200);
        let mut rng = DeterministicRng::new(9);

        loop {
            let guess = r.random_guess(&mut rng);
            let outcome = r.narrow(guess, secret);
            assert!(r.min <= secret && secret <= r.max);
            if outcome == GuessOutcome::Correct {
                break;
            }
        }
    }

    #[test]
    fn test_random_guess_stays_in_range() {
        let r = GuessRange { min: 40, max: 45 };
        let mut rng = DeterministicRng::new(17);
        for _ in 0..200 {
            assert!(r.contains(r.random_guess(&mut rng)));
        }
    }
}
