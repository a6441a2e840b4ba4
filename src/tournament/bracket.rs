//! Bracket Construction
//!
//! Round sizes and per-round match pairings. Entrants arrive already
//! shuffled (the orchestrator shuffles once at initialization), so pairing
//! is strictly positional: (0,1), (2,3), ... with the last entrant of an
//! odd bracket receiving a bye.

use serde::{Serialize, Deserialize};

use crate::tournament::entrant::{Entrant, EntrantId};

/// Bracket construction errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BracketError {
    /// A tournament needs at least two entrants.
    #[error("Invalid entrant count: {0} (need at least 2)")]
    InvalidEntrantCount(usize),
}

/// A pairing of two entrants for one match.
///
/// The pair is unordered for identity purposes: `key()` normalizes the two
/// ids so a match is tracked exactly once regardless of slot order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchPair {
    /// First slot.
    pub left: Entrant,
    /// Second slot.
    pub right: Entrant,
}

impl MatchPair {
    /// Unordered id-pair key, used for completion tracking.
    pub fn key(&self) -> String {
        match_key(self.left.id, self.right.id)
    }
}

/// Build the unordered completion key for an entrant id pair.
pub fn match_key(a: EntrantId, b: EntrantId) -> String {
    format!("{}-{}", a.min(b), a.max(b))
}

/// The pairings for one round.
#[derive(Clone, Debug, Default)]
pub struct RoundPairing {
    /// Matches to fight, in bracket order.
    pub matches: Vec<MatchPair>,
    /// Entrant advancing automatically when the bracket has odd length.
    pub bye: Option<Entrant>,
}

/// Compute the bracket size of every round, from the initial entrant count
/// down to the champion.
///
/// Each round halves the field with ceiling division (byes advance), so
/// `compute_round_sizes(5)` is `[5, 3, 2, 1]`.
pub fn compute_round_sizes(n: usize) -> Result<Vec<usize>, BracketError> {
    if n < 2 {
        return Err(BracketError::InvalidEntrantCount(n));
    }

    let mut sizes = vec![n];
    let mut current = n;
    while current > 1 {
        current = current.div_ceil(2);
        sizes.push(current);
    }

    Ok(sizes)
}

/// Pair a bracket into consecutive matches.
///
/// Odd bracket length leaves the final entrant as a bye, advancing with
/// health reset to full. No shuffling happens here.
pub fn pair_round(bracket: &[Entrant]) -> RoundPairing {
    let mut pairing = RoundPairing::default();

    let mut chunks = bracket.chunks_exact(2);
    for chunk in &mut chunks {
        pairing.matches.push(MatchPair {
            left: chunk[0].clone(),
            right: chunk[1].clone(),
        });
    }

    if let Some(odd_one_out) = chunks.remainder().first() {
        let mut bye = odd_one_out.clone();
        bye.reset_for_round();
        pairing.bye = Some(bye);
    }

    pairing
}
