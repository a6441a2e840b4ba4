//! Guessing-Game Engine
//!
//! Turn-based number guessing against a binary-search CPU, with decaying
//! payout multipliers and points settlement.
//!
//! ## Module Structure
//!
//! - `range`: The live guess interval
//! - `cpu`: The midpoint opponent
//! - `multiplier`: Turn-indexed payout tables per difficulty
//! - `clock`: Per-turn countdown
//! - `session`: The game state machine
//! - `settlement`: Valuing outcomes and posting to the points ledger
//! - `service`: Session manager with TTL/turn-clock sweeping

pub mod range;
pub mod cpu;
pub mod multiplier;
pub mod clock;
pub mod session;
pub mod settlement;
pub mod service;

// Re-export key types
pub use range::{GuessRange, GuessOutcome};
pub use cpu::CpuOpponent;
pub use multiplier::Difficulty;
pub use clock::{TurnClock, TURN_SECONDS};
pub use session::{GuessSession, SessionError, GameEnd, TurnOutcome, SESSION_TTL_MINUTES};
pub use settlement::{
    settle, apply_settlement, Settlement, SettlementReport, PointsLedger, FileLedger,
    LedgerError, Balance, GameStats, CPU_WIN_FEE,
};
pub use service::{GuessService, GuessStart, GuessProgress, GuessNotice};
