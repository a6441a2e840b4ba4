//! CatSiege Arena Server
//!
//! Binary entry point: configuration, durable store, guess service, and
//! the WebSocket server. An interrupted tournament run resumes from its
//! snapshot before the first client connects.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use catsiege::{ArenaConfig, ArenaServer, VERSION};
use catsiege::guess::{FileLedger, GuessService};
use catsiege::tournament::TournamentStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    let config = ArenaConfig::from_env();

    info!("CatSiege Arena Server v{}", VERSION);
    info!("Bind address: {}", config.bind_addr);
    info!("Data directory: {}", config.data_dir.display());
    info!("Roster: {}", config.roster_path.display());

    let store = Arc::new(
        TournamentStore::open(config.data_dir.clone())
            .context("Failed to open tournament store")?,
    );

    let ledger = Arc::new(
        FileLedger::open(config.data_dir.clone()).context("Failed to open points ledger")?,
    );

    // Guess secrets need per-process entropy; everything downstream of the
    // seed stays deterministic
    let rng_seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;

    let guess = Arc::new(GuessService::new(
        ledger,
        config.entry_price,
        config.turn_seconds,
        rng_seed,
    ));

    let server = ArenaServer::new(config, store, guess);
    server.run().await.context("Server terminated with error")?;

    Ok(())
}
