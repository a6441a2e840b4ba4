//! Tournament State
//!
//! The single serialized authority for a run. The orchestrator owns one of
//! these, the durable store persists it at checkpoints, and the transport
//! layer only ever sees read-only snapshots of it.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::tournament::bracket::MatchPair;
use crate::tournament::entrant::Entrant;

/// Durable record of an in-progress or completed tournament.
///
/// Everything needed to resume after a restart lives here: the
/// orchestrator holds no state that is not persisted by the time a round
/// starts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TournamentState {
    /// Season label this run belongs to.
    pub season: String,
    /// Seed all randomness derives from.
    pub seed: u64,
    /// Zero-based index of the round in progress (or just completed).
    pub current_round: usize,
    /// Bracket size of every round, `round_sizes[0]` being the full field.
    pub round_sizes: Vec<usize>,
    /// One bracket per round reached so far; `brackets[r]` holds the
    /// entrants entering round `r`.
    pub brackets: Vec<Vec<Entrant>>,
    /// Matches of the round in progress.
    pub current_matches: Vec<MatchPair>,
    /// Unordered id-pair keys of matches resolved in the current round.
    pub completed_matches: BTreeSet<String>,
    /// The match being broadcast live this round.
    pub featured_match: Option<MatchPair>,
    /// Final singleton bracket, set on completion.
    pub winners: Vec<Entrant>,
    /// False once the run has completed.
    pub is_running: bool,
    /// When this snapshot was written.
    pub last_update: DateTime<Utc>,
}

impl TournamentState {
    /// Create the initial state for a shuffled entrant field.
    pub fn new(season: String, seed: u64, entrants: Vec<Entrant>, round_sizes: Vec<usize>) -> Self {
        Self {
            season,
            seed,
            current_round: 0,
            round_sizes,
            brackets: vec![entrants],
            current_matches: Vec::new(),
            completed_matches: BTreeSet::new(),
            featured_match: None,
            winners: Vec::new(),
            is_running: true,
            last_update: Utc::now(),
        }
    }

    /// The bracket entering the current round.
    pub fn current_bracket(&self) -> &[Entrant] {
        self.brackets
            .get(self.current_round)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Mark a match key completed. Returns false if it was already marked;
    /// completion is recorded exactly once per unordered pair.
    pub fn mark_completed(&mut self, key: String) -> bool {
        self.completed_matches.insert(key)
    }

    /// Have all matches of the current round resolved?
    pub fn round_complete(&self) -> bool {
        self.current_matches
            .iter()
            .all(|m| self.completed_matches.contains(&m.key()))
    }

    /// Touch the snapshot timestamp.
    pub fn touch(&mut self) {
        self.last_update = Utc::now();
    }

    /// The champion, if the run has completed.
    pub fn champion(&self) -> Option<&Entrant> {
        if self.is_running {
            None
        } else {
            self.winners.first()
        }
    }
}
