//! Tournament Orchestration
//!
//! Drives a run round by round: pair the bracket, persist the checkpoint,
//! broadcast the snapshot, fan out every match concurrently, wait for all
//! of them, advance the survivors. The orchestrator owns its
//! [`TournamentState`] outright; the durable store is the only
//! persistence boundary, and observers receive read-only snapshots over a
//! broadcast channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{info, warn, instrument};

use crate::core::rng::{DeterministicRng, derive_tournament_seed, derive_match_seed};
use crate::tournament::bracket::{compute_round_sizes, pair_round, BracketError, MatchPair};
use crate::tournament::battle::{
    resolve_battle, BattleError, BattleEvent, BattleSim, BattleTiming,
};
use crate::tournament::entrant::Entrant;
use crate::tournament::roster::MIN_ENTRANTS;
use crate::tournament::state::TournamentState;
use crate::tournament::store::{StoreError, TournamentStore};

/// Orchestration errors.
#[derive(Debug, thiserror::Error)]
pub enum TournamentError {
    /// Fewer than two usable entrants; no tournament is created.
    #[error("Insufficient entrants: found {found}, need at least {MIN_ENTRANTS}")]
    InsufficientEntrants {
        /// Usable entrants supplied.
        found: usize,
    },

    /// A tournament is already running; the request is rejected, not queued.
    #[error("A tournament is already running")]
    AlreadyRunning,

    /// Durable store failure at a checkpoint.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Bracket construction failure.
    #[error("Bracket error: {0}")]
    Bracket(#[from] BracketError),

    /// Battle invariant violation.
    #[error("Battle error: {0}")]
    Battle(#[from] BattleError),

    /// A battle task panicked or was cancelled.
    #[error("Battle task failed: {0}")]
    TaskFailed(String),
}

/// Updates emitted to observers as the run progresses.
///
/// The network layer converts these to wire messages; nothing here knows
/// about WebSockets.
#[derive(Clone, Debug)]
pub enum TournamentUpdate {
    /// Full state snapshot (round start, round end, completion).
    Snapshot(TournamentState),
    /// The match being broadcast live this round.
    FeaturedBattle {
        /// Round the match belongs to.
        round: usize,
        /// The featured pairing.
        pair: MatchPair,
    },
    /// A stage event from the featured battle.
    Battle(BattleEvent),
    /// Featured fighters' health after a stage.
    BattleHealth {
        /// Left slot: (entrant id, health).
        left: (u32, i32),
        /// Right slot: (entrant id, health).
        right: (u32, i32),
    },
    /// The run completed.
    Completed {
        /// The champion.
        winner: Entrant,
    },
}

/// Pacing for a run.
#[derive(Clone, Debug)]
pub struct TournamentConfig {
    /// Stage pacing for the featured battle.
    pub battle_timing: BattleTiming,
    /// Pause between rounds, letting spectators absorb results.
    pub inter_round_pause: Duration,
}

impl Default for TournamentConfig {
    fn default() -> Self {
        Self {
            battle_timing: BattleTiming::default(),
            inter_round_pause: Duration::from_secs(8),
        }
    }
}

impl TournamentConfig {
    /// Zero pacing for tests.
    pub fn instant() -> Self {
        Self {
            battle_timing: BattleTiming::instant(),
            inter_round_pause: Duration::ZERO,
        }
    }
}

/// Drives one tournament run to completion.
#[derive(Debug)]
pub struct TournamentOrchestrator {
    state: TournamentState,
    store: Arc<TournamentStore>,
    updates: broadcast::Sender<TournamentUpdate>,
    config: TournamentConfig,
}

impl TournamentOrchestrator {
    /// Initialize a fresh run from a loaded roster.
    ///
    /// The entrant field is shuffled exactly once here with the seeded RNG;
    /// pairing later in the run is strictly positional. The initial
    /// snapshot is persisted before this returns, so a crash immediately
    /// after initialization still resumes.
    pub fn new(
        season: String,
        mut entrants: Vec<Entrant>,
        store: Arc<TournamentStore>,
        updates: broadcast::Sender<TournamentUpdate>,
        config: TournamentConfig,
    ) -> Result<Self, TournamentError> {
        if entrants.len() < MIN_ENTRANTS {
            return Err(TournamentError::InsufficientEntrants {
                found: entrants.len(),
            });
        }

        let mut ids: Vec<u32> = entrants.iter().map(|e| e.id).collect();
        ids.sort_unstable();
        let seed = derive_tournament_seed(&season, &ids);

        let mut rng = DeterministicRng::new(seed);
        rng.shuffle(&mut entrants);

        let round_sizes = compute_round_sizes(entrants.len())?;
        let state = TournamentState::new(season, seed, entrants, round_sizes);
        store.save(&state)?;

        info!(
            "Initialized tournament '{}' with {} entrants (seed {})",
            state.season,
            state.brackets[0].len(),
            hex::encode(seed.to_be_bytes()),
        );

        Ok(Self {
            state,
            store,
            updates,
            config,
        })
    }

    /// Reconstruct a run from the latest durable snapshot.
    ///
    /// The current round restarts from its opening checkpoint; progress
    /// within the interrupted round is lost by design.
    pub fn resume(
        state: TournamentState,
        store: Arc<TournamentStore>,
        updates: broadcast::Sender<TournamentUpdate>,
        config: TournamentConfig,
    ) -> Self {
        info!(
            "Resuming tournament '{}' at round {}",
            state.season, state.current_round
        );
        Self {
            state,
            store,
            updates,
            config,
        }
    }

    /// Read-only view of the current state.
    pub fn state(&self) -> &TournamentState {
        &self.state
    }

    /// Run the tournament to completion, returning the champion.
    #[instrument(skip(self), fields(season = %self.state.season))]
    pub async fn run(mut self) -> Result<Entrant, TournamentError> {
        loop {
            let bracket = self.state.current_bracket().to_vec();

            if bracket.len() <= 1 {
                return self.complete(bracket);
            }

            self.run_round(bracket).await?;
            tokio::time::sleep(self.config.inter_round_pause).await;
        }
    }

    /// Run a single round: checkpoint, broadcast, fan out, fan in, advance.
    async fn run_round(&mut self, bracket: Vec<Entrant>) -> Result<(), TournamentError> {
        let round = self.state.current_round;
        let pairing = pair_round(&bracket);

        info!(
            "Round {}: {} matches, {} bye",
            round,
            pairing.matches.len(),
            if pairing.bye.is_some() { 1 } else { 0 }
        );

        // Checkpoint the round before any battle starts. Resume replays
        // the round from exactly this snapshot.
        self.state.current_matches = pairing.matches.clone();
        self.state.completed_matches.clear();
        self.state.featured_match = pairing.matches.first().cloned();
        self.state.touch();
        self.store.save(&self.state)?;

        self.publish(TournamentUpdate::Snapshot(self.state.clone()));
        if let Some(featured) = &self.state.featured_match {
            self.publish(TournamentUpdate::FeaturedBattle {
                round,
                pair: featured.clone(),
            });
        }

        // Fan out: every match runs concurrently on its own derived RNG
        // stream. Only the featured match (index 0) broadcasts its stages.
        let mut handles = Vec::with_capacity(pairing.matches.len());
        for (idx, pair) in pairing.matches.iter().cloned().enumerate() {
            let seed = derive_match_seed(self.state.seed, round, &pair.key());
            let handle = if idx == 0 {
                let updates = self.updates.clone();
                let timing = self.config.battle_timing;
                tokio::spawn(async move {
                    run_featured_battle(pair, seed, timing, updates).await
                })
            } else {
                tokio::spawn(async move {
                    let mut rng = DeterministicRng::new(seed);
                    resolve_battle(pair, &mut rng).map(|(w, l, _)| (w, l))
                })
            };
            handles.push(handle);
        }

        // Fan in: the round advances only after every match resolved.
        let mut next_bracket = Vec::with_capacity(bracket.len().div_ceil(2));
        for handle in handles {
            let (winner, loser) = handle
                .await
                .map_err(|e| TournamentError::TaskFailed(e.to_string()))??;

            let key = crate::tournament::bracket::match_key(winner.id, loser.id);
            if !self.state.mark_completed(key) {
                warn!(
                    "Match {}-{} reported completion twice",
                    winner.id, loser.id
                );
            }

            let mut advancing = winner;
            advancing.reset_for_round();
            next_bracket.push(advancing);
        }

        if let Some(bye) = pairing.bye {
            next_bracket.push(bye);
        }

        // Round-end checkpoint with the survivors in place.
        self.state.brackets.push(next_bracket);
        self.state.current_round += 1;
        self.state.current_matches.clear();
        self.state.featured_match = None;
        self.state.touch();
        self.store.save(&self.state)?;

        self.publish(TournamentUpdate::Snapshot(self.state.clone()));

        Ok(())
    }

    /// Finalize the run and persist the champion.
    fn complete(&mut self, bracket: Vec<Entrant>) -> Result<Entrant, TournamentError> {
        let champion = bracket.into_iter().next().ok_or_else(|| {
            // A run can only reach an empty bracket through a corrupted
            // snapshot; surface it rather than panicking.
            TournamentError::TaskFailed("final bracket is empty".to_string())
        })?;

        self.state.winners = vec![champion.clone()];
        self.state.is_running = false;
        self.state.touch();
        self.store.save(&self.state)?;

        self.publish(TournamentUpdate::Snapshot(self.state.clone()));
        self.publish(TournamentUpdate::Completed {
            winner: champion.clone(),
        });

        info!(
            "Tournament '{}' complete: {} takes the crown",
            self.state.season, champion.name
        );

        Ok(champion)
    }

    fn publish(&self, update: TournamentUpdate) {
        // No receivers is fine; observers come and go.
        let _ = self.updates.send(update);
    }
}

/// Step the featured battle with pacing, broadcasting every stage.
async fn run_featured_battle(
    pair: MatchPair,
    seed: u64,
    timing: BattleTiming,
    updates: broadcast::Sender<TournamentUpdate>,
) -> Result<(Entrant, Entrant), BattleError> {
    let mut rng = DeterministicRng::new(seed);
    let mut sim = BattleSim::new(pair, timing)?;

    loop {
        let step = sim.step(&mut rng);

        let (left, right) = sim.health_pairs();
        for event in step.events {
            let _ = updates.send(TournamentUpdate::Battle(event));
        }
        let _ = updates.send(TournamentUpdate::BattleHealth { left, right });

        if step.done {
            break;
        }
        if !step.pause.is_zero() {
            tokio::time::sleep(step.pause).await;
        }
    }

    Ok(sim
        .into_outcome()
        .unwrap_or_else(|| unreachable!("featured loop exits only when done")))
}
