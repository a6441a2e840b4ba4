//! WebSocket Arena Server
//!
//! Accepts observer and player connections, fans tournament updates out to
//! everyone, and routes guessing-game messages to the session service.
//! Reconnection is stateless: a `sync_request` is answered from the durable
//! store alone, never from in-memory orchestrator state.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock, broadcast};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn, error, debug, instrument};

use crate::config::ArenaConfig;
use crate::guess::service::{GuessNotice, GuessProgress, GuessService};
use crate::guess::session::SessionError;
use crate::network::protocol::{
    ClientMessage, ServerMessage, ServerError, ErrorCode, FeaturedBattleInfo,
    FighterHealth, GuessStartedInfo, GuessResultInfo, GuessOverInfo,
};
use crate::tournament::battle::BattleEvent;
use crate::tournament::orchestrator::{
    TournamentOrchestrator, TournamentError, TournamentUpdate,
};
use crate::tournament::roster::{FileRoster, RosterError, load_roster};
use crate::tournament::store::{StoreError, TournamentStore};

/// Convert an orchestrator update to a wire message.
///
/// `Completed` yields nothing of its own; the terminal snapshot already
/// carries the winner.
fn convert_tournament_update(update: &TournamentUpdate) -> Option<ServerMessage> {
    match update {
        TournamentUpdate::Snapshot(state) => Some(ServerMessage::TournamentState {
            state: state.clone(),
        }),
        TournamentUpdate::FeaturedBattle { round, pair } => {
            Some(ServerMessage::FeaturedBattle(FeaturedBattleInfo {
                round: *round,
                left: pair.left.clone(),
                right: pair.right.clone(),
            }))
        }
        TournamentUpdate::Battle(event) => Some(convert_battle_event(event)),
        TournamentUpdate::BattleHealth { left, right } => Some(ServerMessage::BattleUpdate {
            left: FighterHealth {
                id: left.0,
                health: left.1,
            },
            right: FighterHealth {
                id: right.0,
                health: right.1,
            },
        }),
        TournamentUpdate::Completed { .. } => None,
    }
}

/// Convert a battle stage event to its wire message.
fn convert_battle_event(event: &BattleEvent) -> ServerMessage {
    match event {
        BattleEvent::CoinFlip {
            first_attacker,
            defender,
        } => ServerMessage::CoinFlip {
            first_attacker: *first_attacker,
            defender: *defender,
        },
        BattleEvent::DiceRoll {
            attacker,
            dice,
            damage,
        } => ServerMessage::DiceRoll {
            attacker: *attacker,
            dice: *dice,
            damage: *damage,
        },
        BattleEvent::HitRoll {
            attacker,
            roll,
            outcome,
        } => ServerMessage::HitRoll {
            attacker: *attacker,
            roll: *roll,
            outcome: *outcome,
        },
        BattleEvent::Hit {
            attacker,
            target,
            damage,
            critical,
            target_health,
        } => ServerMessage::NftHit {
            attacker: *attacker,
            target: *target,
            damage: *damage,
            critical: *critical,
            target_health: *target_health,
        },
        BattleEvent::Finished { winner, loser } => ServerMessage::BattleResult {
            winner: *winner,
            loser: *loser,
        },
    }
}

/// Messages a resolved guess turn produces: the turn result, plus the
/// game-over payload when the turn ended the session.
fn guess_progress_messages(progress: &GuessProgress) -> Vec<ServerMessage> {
    let mut messages = Vec::with_capacity(2);

    if let Some(outcome) = &progress.outcome {
        messages.push(ServerMessage::GuessResult(GuessResultInfo {
            session_id: progress.session_id,
            player_guess: outcome.player_guess,
            player_result: outcome.player_result,
            cpu_guess: outcome.cpu_guess,
            cpu_result: outcome.cpu_result,
            min: progress.range.min,
            max: progress.range.max,
            multiplier: outcome.multiplier,
            remaining_secs: progress.remaining_secs,
            auto_submitted: outcome.auto_submitted,
        }));
    }

    if let (Some(report), Some(secret)) = (&progress.report, progress.secret) {
        messages.push(ServerMessage::GuessOver(GuessOverInfo {
            session_id: progress.session_id,
            end: report.end,
            secret,
            earned: report.earned,
            displayed_multiplier: report.displayed_multiplier,
            new_balance: report.new_balance,
        }));
    }

    messages
}

/// Arena server errors.
#[derive(Debug, thiserror::Error)]
pub enum ArenaServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Durable store failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Connected client state.
struct ConnectedClient {
    /// Player identifier, once the client starts a guessing game.
    player: Option<String>,
    /// Connection time.
    #[allow(dead_code)]
    connected_at: Instant,
    /// Last activity.
    last_activity: Instant,
    /// Message sender (for direct messaging to client).
    #[allow(dead_code)]
    sender: mpsc::Sender<ServerMessage>,
}

/// The arena server.
pub struct ArenaServer {
    /// Server configuration.
    config: ArenaConfig,
    /// Durable tournament store.
    store: Arc<TournamentStore>,
    /// Guessing-game session service.
    guess: Arc<GuessService>,
    /// Tournament update channel (orchestrator -> observers).
    updates: broadcast::Sender<TournamentUpdate>,
    /// Whether a tournament run is in flight.
    tournament_running: Arc<AtomicBool>,
    /// Connected clients.
    clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl ArenaServer {
    /// Create a new arena server.
    pub fn new(config: ArenaConfig, store: Arc<TournamentStore>, guess: Arc<GuessService>) -> Self {
        let (updates, _) = broadcast::channel(1024);
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            store,
            guess,
            updates,
            tournament_running: Arc::new(AtomicBool::new(false)),
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Subscribe to tournament updates (observers, tests).
    pub fn subscribe_updates(&self) -> broadcast::Receiver<TournamentUpdate> {
        self.updates.subscribe()
    }

    /// Resume an interrupted tournament run, if the store holds one.
    ///
    /// Called on startup before serving connections, honoring the restart
    /// contract: the durable snapshot alone reconstructs the run.
    pub fn resume_if_in_progress(&self) -> Result<(), ArenaServerError> {
        let Some(state) = self.store.load()? else {
            return Ok(());
        };
        if !state.is_running {
            return Ok(());
        }

        self.tournament_running.store(true, Ordering::SeqCst);
        let orchestrator = TournamentOrchestrator::resume(
            state,
            self.store.clone(),
            self.updates.clone(),
            self.config.tournament.clone(),
        );
        let running = self.tournament_running.clone();

        tokio::spawn(async move {
            match orchestrator.run().await {
                Ok(champion) => info!("Resumed tournament finished; champion {}", champion.name),
                Err(e) => error!("Resumed tournament failed: {}", e),
            }
            running.store(false, Ordering::SeqCst);
        });

        Ok(())
    }

    /// Run the server.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), ArenaServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Arena server listening on {}", self.config.bind_addr);

        self.resume_if_in_progress()?;

        // Spawn the guess expiry sweep
        let sweep_handle = tokio::spawn(self.guess.clone().run_expiry_loop());

        // Spawn idle-connection cleanup
        let cleanup_clients = self.clients.clone();
        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_clients).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        sweep_handle.abort();
        cleanup_handle.abort();

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let store = self.store.clone();
        let guess = self.guess.clone();
        let config = self.config.clone();
        let updates_tx = self.updates.clone();
        let tournament_running = self.tournament_running.clone();
        let mut updates_rx = self.updates.subscribe();
        let mut notices_rx = self.guess.subscribe();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            // Register client
            {
                let mut clients = clients.write().await;
                clients.insert(addr, ConnectedClient {
                    player: None,
                    connected_at: Instant::now(),
                    last_activity: Instant::now(),
                    sender: msg_tx.clone(),
                });
            }

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            // The player this connection is guessing as, set on StartGuess
            let mut player: Option<String> = None;

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        let _ = msg_tx.send(ServerMessage::Error(ServerError {
                                            code: ErrorCode::InvalidInput,
                                            message: "Invalid message format".to_string(),
                                        })).await;
                                        continue;
                                    }
                                };

                                // Update activity
                                {
                                    let mut clients = clients.write().await;
                                    if let Some(client) = clients.get_mut(&addr) {
                                        client.last_activity = Instant::now();
                                    }
                                }

                                if let ClientMessage::StartGuess { player: name, .. } = &client_msg {
                                    player = Some(name.clone());
                                    let mut clients = clients.write().await;
                                    if let Some(client) = clients.get_mut(&addr) {
                                        client.player = Some(name.clone());
                                    }
                                }

                                Self::handle_client_message(
                                    addr,
                                    client_msg,
                                    &store,
                                    &guess,
                                    &config,
                                    &updates_tx,
                                    &tournament_running,
                                    &msg_tx,
                                ).await;
                            }
                            Some(Ok(Message::Ping(_))) => {
                                let _ = msg_tx.send(ServerMessage::Pong {
                                    timestamp: 0,
                                    server_time: std::time::SystemTime::now()
                                        .duration_since(std::time::UNIX_EPOCH)
                                        .unwrap_or_default()
                                        .as_millis() as u64,
                                }).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    update = updates_rx.recv() => {
                        match update {
                            Ok(update) => {
                                if let Some(msg) = convert_tournament_update(&update) {
                                    let _ = msg_tx.send(msg).await;
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                // Slow observer: drop the backlog, the next
                                // snapshot resynchronizes them
                                debug!("Observer {} lagged {} updates", addr, skipped);
                            }
                            Err(broadcast::error::RecvError::Closed) => {}
                        }
                    }
                    notice = notices_rx.recv() => {
                        if let Ok(notice) = notice {
                            Self::forward_guess_notice(notice, player.as_deref(), &msg_tx).await;
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Cleanup
            sender_task.abort();

            {
                let mut clients = clients.write().await;
                clients.remove(&addr);
            }

            info!("Client {} cleaned up", addr);
        });
    }

    /// Forward a sweep notice to the connection that owns the session.
    async fn forward_guess_notice(
        notice: GuessNotice,
        player: Option<&str>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let progress = match notice {
            GuessNotice::AutoTurn(progress) | GuessNotice::SessionExpired(progress) => progress,
        };

        if player == Some(progress.player.as_str()) {
            for msg in guess_progress_messages(&progress) {
                let _ = sender.send(msg).await;
            }
        }
    }

    /// Handle a client message.
    #[allow(clippy::too_many_arguments)]
    async fn handle_client_message(
        addr: SocketAddr,
        msg: ClientMessage,
        store: &Arc<TournamentStore>,
        guess: &Arc<GuessService>,
        config: &ArenaConfig,
        updates_tx: &broadcast::Sender<TournamentUpdate>,
        tournament_running: &Arc<AtomicBool>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        match msg {
            ClientMessage::StartTournament { season } => {
                Self::handle_start_tournament(
                    season,
                    store,
                    config,
                    updates_tx,
                    tournament_running,
                    sender,
                )
                .await;
            }
            ClientMessage::SyncRequest => {
                Self::handle_sync_request(store, sender).await;
            }
            ClientMessage::LatestWinner => {
                let winner = store.latest_winner().unwrap_or_else(|e| {
                    error!("Failed to read latest winner: {}", e);
                    None
                });
                let _ = sender.send(ServerMessage::LatestWinner { winner }).await;
            }
            ClientMessage::StartGuess { player, difficulty } => {
                let start = guess.start_session(player, difficulty).await;
                let _ = sender
                    .send(ServerMessage::GuessStarted(GuessStartedInfo {
                        session_id: start.session_id,
                        difficulty: start.difficulty,
                        min: start.range.min,
                        max: start.range.max,
                        multiplier: start.multiplier,
                        turn_seconds: start.turn_seconds,
                        entry_price: start.entry_price,
                    }))
                    .await;
            }
            ClientMessage::Guess { session_id, value } => {
                match guess.submit_guess(session_id, value).await {
                    Ok(progress) => {
                        for msg in guess_progress_messages(&progress) {
                            let _ = sender.send(msg).await;
                        }
                    }
                    Err(e) => {
                        let _ = sender.send(session_error_message(&e)).await;
                    }
                }
            }
            ClientMessage::ForfeitGuess { session_id } => {
                match guess.forfeit(session_id).await {
                    Ok(progress) => {
                        for msg in guess_progress_messages(&progress) {
                            let _ = sender.send(msg).await;
                        }
                    }
                    Err(e) => {
                        let _ = sender.send(session_error_message(&e)).await;
                    }
                }
            }
            ClientMessage::Ping { timestamp } => {
                let _ = sender
                    .send(ServerMessage::Pong {
                        timestamp,
                        server_time: std::time::SystemTime::now()
                            .duration_since(std::time::UNIX_EPOCH)
                            .unwrap_or_default()
                            .as_millis() as u64,
                    })
                    .await;
                debug!("Ping from {}", addr);
            }
        }
    }

    /// Start a tournament run, rejecting a concurrent start.
    async fn handle_start_tournament(
        season: String,
        store: &Arc<TournamentStore>,
        config: &ArenaConfig,
        updates_tx: &broadcast::Sender<TournamentUpdate>,
        tournament_running: &Arc<AtomicBool>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        // Claim the run slot first; a second start while one is in flight
        // is rejected, not queued
        if tournament_running.swap(true, Ordering::SeqCst) {
            let _ = sender
                .send(ServerMessage::Error(ServerError {
                    code: ErrorCode::TournamentAlreadyRunning,
                    message: "A tournament is already running".to_string(),
                }))
                .await;
            return;
        }

        let entrants = FileRoster::open(config.roster_path.clone())
            .and_then(|mut roster| load_roster(&mut roster));

        let entrants = match entrants {
            Ok(entrants) => entrants,
            Err(e) => {
                tournament_running.store(false, Ordering::SeqCst);
                let code = match e {
                    RosterError::InsufficientEntrants { .. } => ErrorCode::InsufficientEntrants,
                    _ => ErrorCode::InternalError,
                };
                error!("Tournament initialization failed: {}", e);
                let _ = sender
                    .send(ServerMessage::Error(ServerError {
                        code,
                        message: e.to_string(),
                    }))
                    .await;
                return;
            }
        };

        let orchestrator = match TournamentOrchestrator::new(
            season,
            entrants,
            store.clone(),
            updates_tx.clone(),
            config.tournament.clone(),
        ) {
            Ok(orchestrator) => orchestrator,
            Err(e) => {
                tournament_running.store(false, Ordering::SeqCst);
                let code = match e {
                    TournamentError::InsufficientEntrants { .. } => {
                        ErrorCode::InsufficientEntrants
                    }
                    _ => ErrorCode::InternalError,
                };
                error!("Tournament initialization failed: {}", e);
                let _ = sender
                    .send(ServerMessage::Error(ServerError {
                        code,
                        message: e.to_string(),
                    }))
                    .await;
                return;
            }
        };

        let running = tournament_running.clone();
        tokio::spawn(async move {
            match orchestrator.run().await {
                Ok(champion) => info!("Tournament finished; champion {}", champion.name),
                Err(e) => error!("Tournament run failed: {}", e),
            }
            running.store(false, Ordering::SeqCst);
        });
    }

    /// Answer a sync request from the durable store alone.
    async fn handle_sync_request(
        store: &Arc<TournamentStore>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        match store.load() {
            Ok(Some(state)) => {
                let _ = sender.send(ServerMessage::TournamentState { state }).await;
            }
            Ok(None) => {
                let _ = sender
                    .send(ServerMessage::Error(ServerError {
                        code: ErrorCode::InvalidInput,
                        message: "No tournament on record".to_string(),
                    }))
                    .await;
            }
            Err(e) => {
                error!("Failed to load snapshot for sync: {}", e);
                let _ = sender
                    .send(ServerMessage::Error(ServerError {
                        code: ErrorCode::InternalError,
                        message: "Snapshot unavailable".to_string(),
                    }))
                    .await;
            }
        }
    }

    /// Run cleanup loop for idle connections.
    async fn run_cleanup_loop(clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>) {
        let mut interval = interval(Duration::from_secs(60));

        loop {
            interval.tick().await;

            let now = Instant::now();
            let idle_timeout = Duration::from_secs(300); // 5 minutes

            let to_remove: Vec<_> = {
                let clients = clients.read().await;
                clients
                    .iter()
                    .filter(|(_, c)| now.duration_since(c.last_activity) > idle_timeout)
                    .map(|(addr, _)| *addr)
                    .collect()
            };

            for addr in to_remove {
                let mut clients = clients.write().await;
                if clients.remove(&addr).is_some() {
                    info!("Removed idle client {}", addr);
                }
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Is a tournament run in flight?
    pub fn tournament_in_flight(&self) -> bool {
        self.tournament_running.load(Ordering::SeqCst)
    }
}

/// Map a session error to its wire form.
fn session_error_message(error: &SessionError) -> ServerMessage {
    let code = match error {
        SessionError::SessionNotFound | SessionError::SessionInactive => {
            ErrorCode::SessionNotFound
        }
        SessionError::GuessOutOfRange { .. } => ErrorCode::GuessOutOfRange,
    };
    ServerMessage::Error(ServerError {
        code,
        message: error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use crate::guess::settlement::FileLedger;
    use crate::tournament::bracket::MatchPair;
    use crate::tournament::entrant::Entrant;

    fn test_server(tag: &str) -> ArenaServer {
        let dir = std::env::temp_dir().join(format!("catsiege-server-test-{tag}"));
        let _ = fs::remove_dir_all(&dir);

        let config = ArenaConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            data_dir: dir.clone(),
            roster_path: dir.join("roster.json"),
            ..Default::default()
        };
        let store = Arc::new(TournamentStore::open(dir.clone()).unwrap());
        let ledger = Arc::new(FileLedger::open(dir).unwrap());
        let guess = Arc::new(GuessService::new(ledger, config.entry_price, config.turn_seconds, 7));

        ArenaServer::new(config, store, guess)
    }

    fn entrant(id: u32) -> Entrant {
        Entrant::new(id, format!("Cat #{id}"), format!("mint-{id}"), String::new())
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = test_server("create");
        assert_eq!(server.connection_count().await, 0);
        assert!(!server.tournament_in_flight());
    }

    #[tokio::test]
    async fn test_server_shutdown() {
        let server = test_server("shutdown");
        server.shutdown();
        // Should not panic
    }

    #[test]
    fn test_convert_battle_events() {
        let coin = convert_battle_event(&BattleEvent::CoinFlip {
            first_attacker: 1,
            defender: 2,
        });
        assert!(matches!(coin, ServerMessage::CoinFlip { first_attacker: 1, .. }));

        let hit = convert_battle_event(&BattleEvent::Hit {
            attacker: 1,
            target: 2,
            damage: 3,
            critical: true,
            target_health: 9,
        });
        assert!(matches!(
            hit,
            ServerMessage::NftHit { critical: true, target_health: 9, .. }
        ));
    }

    #[test]
    fn test_convert_completed_update_is_silent() {
        let update = TournamentUpdate::Completed {
            winner: entrant(3),
        };
        assert!(convert_tournament_update(&update).is_none());
    }

    #[test]
    fn test_convert_featured_battle() {
        let update = TournamentUpdate::FeaturedBattle {
            round: 2,
            pair: MatchPair {
                left: entrant(0),
                right: entrant(1),
            },
        };
        let msg = convert_tournament_update(&update).unwrap();
        if let ServerMessage::FeaturedBattle(info) = msg {
            assert_eq!(info.round, 2);
            assert_eq!(info.left.id, 0);
        } else {
            panic!("Wrong message type");
        }
    }

    #[test]
    fn test_session_error_codes() {
        let msg = session_error_message(&SessionError::SessionNotFound);
        assert!(matches!(
            msg,
            ServerMessage::Error(ServerError { code: ErrorCode::SessionNotFound, .. })
        ));

        let msg = session_error_message(&SessionError::GuessOutOfRange {
            guess: 300,
            min: 1,
            max: 256,
        });
        assert!(matches!(
            msg,
            ServerMessage::Error(ServerError { code: ErrorCode::GuessOutOfRange, .. })
        ));
    }
}
