//! Guess Session Service
//!
//! Holds every in-flight guessing game, routes guesses into the session
//! state machines, settles finished games against the ledger, and sweeps
//! expired turn clocks and session TTLs on an interval. Auto-played turns
//! surface on a broadcast channel so the transport can notify the player.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::rng::DeterministicRng;
use crate::guess::multiplier::Difficulty;
use crate::guess::range::GuessRange;
use crate::guess::session::{GuessSession, SessionError, TurnOutcome};
use crate::guess::settlement::{apply_settlement, PointsLedger, SettlementReport};

/// How often the expiry sweep runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Snapshot handed back when a session starts.
#[derive(Clone, Debug)]
pub struct GuessStart {
    /// New session id.
    pub session_id: Uuid,
    /// Tier being played.
    pub difficulty: Difficulty,
    /// Opening interval.
    pub range: GuessRange,
    /// Multiplier the first guess is worth.
    pub multiplier: f64,
    /// Seconds per player turn.
    pub turn_seconds: i64,
    /// Stake the session plays for.
    pub entry_price: f64,
}

/// Snapshot handed back after a guess resolves.
#[derive(Clone, Debug)]
pub struct GuessProgress {
    /// Session the turn belongs to.
    pub session_id: Uuid,
    /// Player who owns the session.
    pub player: String,
    /// What the turn produced. `None` for a forfeit, which plays no turn.
    pub outcome: Option<TurnOutcome>,
    /// Interval after the exchange.
    pub range: GuessRange,
    /// Seconds left on the fresh turn clock.
    pub remaining_secs: i64,
    /// Settlement, when the turn ended the session.
    pub report: Option<SettlementReport>,
    /// The secret, revealed once the session ended.
    pub secret: Option<u32>,
}

/// Out-of-band notifications produced by the expiry sweep.
#[derive(Clone, Debug)]
pub enum GuessNotice {
    /// A turn clock ran out and a random guess was played.
    AutoTurn(GuessProgress),
    /// A session outlived its TTL and was closed (no turn played, no
    /// payout).
    SessionExpired(GuessProgress),
}

/// Manages all in-flight guessing games.
pub struct GuessService {
    sessions: RwLock<BTreeMap<Uuid, GuessSession>>,
    ledger: Arc<dyn PointsLedger>,
    entry_price: f64,
    turn_seconds: i64,
    rng: Mutex<DeterministicRng>,
    notices: broadcast::Sender<GuessNotice>,
}

impl GuessService {
    /// Create a service settling through the given ledger.
    pub fn new(ledger: Arc<dyn PointsLedger>, entry_price: f64, turn_seconds: i64, rng_seed: u64) -> Self {
        let (notices, _) = broadcast::channel(256);
        Self {
            sessions: RwLock::new(BTreeMap::new()),
            ledger,
            entry_price,
            turn_seconds,
            rng: Mutex::new(DeterministicRng::new(rng_seed)),
            notices,
        }
    }

    /// Subscribe to sweep notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<GuessNotice> {
        self.notices.subscribe()
    }

    /// Start a new game for a player.
    pub async fn start_session(&self, player: String, difficulty: Difficulty) -> GuessStart {
        let now = Utc::now();
        let mut session = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            GuessSession::new(player, difficulty, &mut rng, now)
        };
        session.turn_clock.limit_secs = self.turn_seconds;

        let start = GuessStart {
            session_id: session.id,
            difficulty,
            range: session.range,
            multiplier: session.current_multiplier,
            turn_seconds: self.turn_seconds,
            entry_price: self.entry_price,
        };

        debug!(
            "Started guess session {} for {} ({:?})",
            session.id, session.player, difficulty
        );

        self.sessions.write().await.insert(session.id, session);
        start
    }

    /// Submit a player guess.
    pub async fn submit_guess(
        &self,
        session_id: Uuid,
        guess: u32,
    ) -> Result<GuessProgress, SessionError> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&session_id)
            .ok_or(SessionError::SessionNotFound)?;

        let outcome = session.player_guess(guess, now)?;
        let progress = self.progress_of(session, outcome);

        if !session.is_active {
            sessions.remove(&session_id);
        }
        Ok(progress)
    }

    /// Forfeit a session.
    pub async fn forfeit(&self, session_id: Uuid) -> Result<GuessProgress, SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&session_id)
            .ok_or(SessionError::SessionNotFound)?;

        session.forfeit()?;

        let report = apply_settlement(session, self.ledger.as_ref(), self.entry_price);
        let progress = GuessProgress {
            session_id: session.id,
            player: session.player.clone(),
            outcome: None,
            range: session.range,
            remaining_secs: 0,
            report,
            secret: Some(session.secret()),
        };

        sessions.remove(&session_id);
        Ok(progress)
    }

    /// Number of in-flight sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// One pass of the expiry sweep: auto-play expired turn clocks, reap
    /// sessions past their TTL, settle whatever ended.
    pub async fn sweep(&self) {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let mut finished = Vec::new();

        let ids: Vec<Uuid> = sessions.keys().copied().collect();
        for id in ids {
            let Some(session) = sessions.get_mut(&id) else { continue };

            if session.ttl_expired(now) {
                session.expire();
                let report = apply_settlement(session, self.ledger.as_ref(), self.entry_price);
                info!("Reaped expired guess session {}", id);
                let _ = self.notices.send(GuessNotice::SessionExpired(GuessProgress {
                    session_id: id,
                    player: session.player.clone(),
                    outcome: None,
                    range: session.range,
                    remaining_secs: 0,
                    report,
                    secret: Some(session.secret()),
                }));
                finished.push(id);
                continue;
            }

            if session.turn_expired(now) {
                let outcome = {
                    let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
                    session.auto_guess(&mut rng, now)
                };
                // An expired turn always yields a valid in-range guess
                if let Ok(outcome) = outcome {
                    let progress = self.progress_of(session, outcome);
                    if !session.is_active {
                        finished.push(id);
                    }
                    let _ = self.notices.send(GuessNotice::AutoTurn(progress));
                }
            }
        }

        for id in finished {
            sessions.remove(&id);
        }
    }

    /// Run the sweep on an interval until the task is aborted.
    pub async fn run_expiry_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            self.sweep().await;
        }
    }

    /// Build the progress snapshot for a just-resolved turn, settling the
    /// session if it ended.
    fn progress_of(&self, session: &mut GuessSession, outcome: TurnOutcome) -> GuessProgress {
        let now = Utc::now();
        let (report, secret) = if session.is_active {
            (None, None)
        } else {
            (
                apply_settlement(session, self.ledger.as_ref(), self.entry_price),
                Some(session.secret()),
            )
        };

        GuessProgress {
            session_id: session.id,
            player: session.player.clone(),
            outcome: Some(outcome),
            range: session.range,
            remaining_secs: session.turn_clock.remaining_secs(now),
            report,
            secret,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::guess::settlement::{Balance, GameStats, LedgerError};

    #[derive(Default)]
    struct CountingLedger {
        updates: AtomicUsize,
    }

    impl PointsLedger for CountingLedger {
        fn update_points(&self, _player: &str, delta: f64) -> Result<Balance, LedgerError> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            Ok(Balance { new_balance: delta })
        }

        fn record_game_stats(&self, _player: &str, _stats: &GameStats) -> Result<(), LedgerError> {
            Ok(())
        }
    }

    fn service(seed: u64) -> (Arc<GuessService>, Arc<CountingLedger>) {
        let ledger = Arc::new(CountingLedger::default());
        let svc = Arc::new(GuessService::new(ledger.clone(), 100.0, 15, seed));
        (svc, ledger)
    }

    #[tokio::test]
    async fn test_start_and_count() {
        let (svc, _) = service(1);
        let start = svc.start_session("alice".into(), Difficulty::Cadet).await;

        assert_eq!(start.range, GuessRange::new(64));
        assert_eq!(start.multiplier, 5.0);
        assert_eq!(svc.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_guess_unknown_session() {
        let (svc, _) = service(2);
        let err = svc.submit_guess(Uuid::new_v4(), 10).await.unwrap_err();
        assert!(matches!(err, SessionError::SessionNotFound));
    }

    #[tokio::test]
    async fn test_win_settles_and_removes_session() {
        let (svc, ledger) = service(3);
        let start = svc.start_session("alice".into(), Difficulty::Cadet).await;

        // Binary-search from the outside until the session resolves
        let mut range = GuessRange::new(64);
        let mut progress = None;
        for _ in 0..10 {
            let guess = (range.min + range.max) / 2;
            let p = svc.submit_guess(start.session_id, guess).await.unwrap();
            range = p.range;
            let done = p.outcome.as_ref().and_then(|o| o.end).is_some();
            progress = Some(p);
            if done {
                break;
            }
        }

        let progress = progress.unwrap();
        assert!(progress.outcome.as_ref().and_then(|o| o.end).is_some());
        assert!(progress.report.is_some());
        assert!(progress.secret.is_some());
        assert_eq!(ledger.updates.load(Ordering::SeqCst), 1);
        assert_eq!(svc.session_count().await, 0);

        // The session is gone; a replayed guess cannot double-settle
        let err = svc.submit_guess(start.session_id, 1).await.unwrap_err();
        assert!(matches!(err, SessionError::SessionNotFound));
        assert_eq!(ledger.updates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_forfeit_removes_without_payout() {
        let (svc, ledger) = service(4);
        let start = svc.start_session("bob".into(), Difficulty::Raider).await;

        let progress = svc.forfeit(start.session_id).await.unwrap();
        assert!(progress.report.is_some());
        assert_eq!(progress.report.unwrap().earned, 0.0);
        assert_eq!(ledger.updates.load(Ordering::SeqCst), 0);
        assert_eq!(svc.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_sweep_auto_plays_expired_turns() {
        let ledger = Arc::new(CountingLedger::default());
        // Zero-second turns: every sweep plays a turn for the player
        let svc = Arc::new(GuessService::new(ledger.clone(), 100.0, 0, 5));
        let mut notices = svc.subscribe();

        svc.start_session("carol".into(), Difficulty::Cadet).await;

        // Sessions resolve within the turn budget, so a bounded number of
        // sweeps settles everything
        for _ in 0..12 {
            svc.sweep().await;
            if svc.session_count().await == 0 {
                break;
            }
        }
        assert_eq!(svc.session_count().await, 0);

        let mut saw_auto_turn = false;
        while let Ok(notice) = notices.try_recv() {
            if let GuessNotice::AutoTurn(p) = notice {
                assert!(p.outcome.unwrap().auto_submitted);
                saw_auto_turn = true;
            }
        }
        assert!(saw_auto_turn);
    }

    #[tokio::test]
    async fn test_sweep_leaves_live_clocks_alone() {
        let (svc, _) = service(6);
        svc.start_session("dave".into(), Difficulty::Cadet).await;

        svc.sweep().await;
        // 15s clock has not expired; the session is untouched
        assert_eq!(svc.session_count().await, 1);
    }
}
