//! Durable Tournament Store
//!
//! Exactly one tournament document per run, persisted as JSON and written
//! atomically (temp file + rename). The store is queried on process start
//! to detect and resume an in-progress run, and on demand to serve the most
//! recent completed run's winner.

use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::tournament::entrant::Entrant;
use crate::tournament::state::TournamentState;

/// Store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot could not be encoded or decoded.
    #[error("Snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// File-backed store for the single tournament document.
#[derive(Debug)]
pub struct TournamentStore {
    path: PathBuf,
}

impl TournamentStore {
    /// Open a store rooted at a data directory. The directory is created if
    /// missing.
    pub fn open(data_dir: PathBuf) -> Result<Self, StoreError> {
        fs::create_dir_all(&data_dir)?;
        Ok(Self {
            path: data_dir.join("tournament.json"),
        })
    }

    /// Persist a snapshot atomically.
    ///
    /// The document is written to a sibling temp file first and renamed
    /// over the live one, so a crash mid-write never leaves a torn
    /// snapshot behind.
    pub fn save(&self, state: &TournamentState) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;

        debug!(
            "Persisted snapshot: round {} of season {}",
            state.current_round, state.season
        );
        Ok(())
    }

    /// Load the latest snapshot, if one exists.
    pub fn load(&self) -> Result<Option<TournamentState>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        let state = serde_json::from_str(&raw)?;
        Ok(Some(state))
    }

    /// Is there an unfinished run on disk?
    pub fn in_progress(&self) -> Result<bool, StoreError> {
        Ok(self.load()?.map(|s| s.is_running).unwrap_or(false))
    }

    /// The champion of the most recent completed run, if any.
    pub fn latest_winner(&self) -> Result<Option<Entrant>, StoreError> {
        Ok(self
            .load()?
            .filter(|s| !s.is_running)
            .and_then(|s| s.winners.into_iter().next()))
    }
}
