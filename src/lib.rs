//! # CatSiege Arena Server
//!
//! Simulation backend for the CatSiege NFT tournament and its guessing
//! mini-game.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   CATSIEGE ARENA SERVER                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/            - Deterministic primitives                 │
//! │  └── rng.rs       - Seeded Xorshift128+ PRNG                 │
//! │                                                              │
//! │  tournament/      - Elimination tournament engine            │
//! │  ├── entrant.rs   - Competing units, health bookkeeping      │
//! │  ├── roster.rs    - External listing seam (batched fetch)    │
//! │  ├── bracket.rs   - Round sizes, pairing, byes               │
//! │  ├── battle.rs    - Staged combat state machine              │
//! │  ├── state.rs     - The durable tournament record            │
//! │  ├── orchestrator - Round progression, fan-out/fan-in        │
//! │  └── store.rs     - Snapshot persistence (restart/resume)    │
//! │                                                              │
//! │  guess/           - Number-guessing mini-game engine         │
//! │  ├── range.rs     - Live guess interval                      │
//! │  ├── cpu.rs       - Binary-search opponent                   │
//! │  ├── multiplier.rs- Decaying payout tables                   │
//! │  ├── clock.rs     - Per-turn countdown                       │
//! │  ├── session.rs   - Game state machine                       │
//! │  ├── settlement.rs- Points valuation + ledger seam           │
//! │  └── service.rs   - Session manager, expiry sweep            │
//! │                                                              │
//! │  network/         - WebSocket transport                      │
//! │  ├── protocol.rs  - Message types                            │
//! │  └── server.rs    - Observer broadcast, message routing      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! Every random outcome (bracket shuffle, coin flips, dice volleys, hit
//! rolls, guessing secrets) is drawn from a seeded Xorshift128+ stream.
//! Tournament battles additionally run on per-match seeds derived from the
//! season seed, so concurrent match execution can never perturb outcomes
//! and a restarted server replays an interrupted round identically from
//! its snapshot.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod tournament;
pub mod guess;
pub mod network;
pub mod config;

// Re-export commonly used types
pub use crate::core::rng::DeterministicRng;
pub use tournament::{
    Entrant, TournamentOrchestrator, TournamentState, TournamentStore, TournamentUpdate,
};
pub use guess::{Difficulty, GuessService, GuessSession, PointsLedger};
pub use network::{ArenaServer, ClientMessage, ServerMessage};
pub use config::ArenaConfig;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
