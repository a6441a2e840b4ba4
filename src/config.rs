//! Runtime Configuration
//!
//! Defaults suit local development; deployments override through
//! environment variables (`CATSIEGE_*`).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::guess::clock::TURN_SECONDS;
use crate::tournament::orchestrator::TournamentConfig;

/// Server-wide configuration.
#[derive(Debug, Clone)]
pub struct ArenaConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Directory for the tournament snapshot and ledger files.
    pub data_dir: PathBuf,
    /// Roster file the entrant source reads.
    pub roster_path: PathBuf,
    /// Stake every guessing session plays for.
    pub entry_price: f64,
    /// Seconds per player turn in the guessing game.
    pub turn_seconds: i64,
    /// Tournament pacing.
    pub tournament: TournamentConfig,
    /// Server version string.
    pub version: String,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().unwrap(),
            max_connections: 1000,
            data_dir: PathBuf::from("data"),
            roster_path: PathBuf::from("data/roster.json"),
            entry_price: 100.0,
            turn_seconds: TURN_SECONDS,
            tournament: TournamentConfig::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ArenaConfig {
    /// Build a config from the environment, falling back to defaults.
    ///
    /// Unparseable values are warned about and ignored rather than
    /// aborting startup.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("CATSIEGE_BIND_ADDR") {
            match addr.parse() {
                Ok(parsed) => config.bind_addr = parsed,
                Err(_) => warn!("Ignoring invalid CATSIEGE_BIND_ADDR '{}'", addr),
            }
        }
        if let Ok(dir) = std::env::var("CATSIEGE_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(path) = std::env::var("CATSIEGE_ROSTER") {
            config.roster_path = PathBuf::from(path);
        }
        if let Ok(price) = std::env::var("CATSIEGE_ENTRY_PRICE") {
            match price.parse() {
                Ok(parsed) => config.entry_price = parsed,
                Err(_) => warn!("Ignoring invalid CATSIEGE_ENTRY_PRICE '{}'", price),
            }
        }
        if let Ok(secs) = std::env::var("CATSIEGE_TURN_SECONDS") {
            match secs.parse() {
                Ok(parsed) => config.turn_seconds = parsed,
                Err(_) => warn!("Ignoring invalid CATSIEGE_TURN_SECONDS '{}'", secs),
            }
        }
        if let Ok(secs) = std::env::var("CATSIEGE_ROUND_PAUSE_SECS") {
            match secs.parse() {
                Ok(parsed) => config.tournament.inter_round_pause = Duration::from_secs(parsed),
                Err(_) => warn!("Ignoring invalid CATSIEGE_ROUND_PAUSE_SECS '{}'", secs),
            }
        }

        config
    }
}
