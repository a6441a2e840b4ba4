//! Network Layer
//!
//! WebSocket transport for tournament observers and guessing-game players.
//! This layer only converts and routes; all game semantics live in
//! `tournament/` and `guess/`.

pub mod protocol;
pub mod server;

pub use protocol::{
    ClientMessage, ServerMessage, ServerError, ErrorCode,
    FeaturedBattleInfo, FighterHealth, GuessStartedInfo, GuessResultInfo, GuessOverInfo,
};
pub use server::{ArenaServer, ArenaServerError};
