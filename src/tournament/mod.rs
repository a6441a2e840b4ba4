//! Tournament Engine
//!
//! The NFT elimination tournament: brackets, battles, orchestration,
//! persistence.
//!
//! ## Module Structure
//!
//! - `entrant`: Competing units and health bookkeeping
//! - `roster`: Loading entrants from the external listing seam
//! - `bracket`: Round sizes and match pairing
//! - `battle`: Staged combat state machine and its events
//! - `state`: The durable tournament record
//! - `orchestrator`: Round-by-round progression and broadcast
//! - `store`: Snapshot persistence for restart/resume

pub mod entrant;
pub mod roster;
pub mod bracket;
pub mod battle;
pub mod state;
pub mod orchestrator;
pub mod store;

// Re-export key types
pub use entrant::{Entrant, EntrantId, ROUND_HEALTH};
pub use roster::{EntrantSource, EntrantRecord, FileRoster, RosterError, load_roster};
pub use bracket::{MatchPair, RoundPairing, BracketError, compute_round_sizes, pair_round};
pub use battle::{BattleSim, BattleEvent, BattleTiming, BattleError, HitOutcome};
pub use state::TournamentState;
pub use orchestrator::{
    TournamentOrchestrator, TournamentConfig, TournamentError, TournamentUpdate,
};
pub use store::{TournamentStore, StoreError};
