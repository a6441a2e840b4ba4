//! Guess Session
//!
//! One player versus the house. The player and CPU strictly alternate; a
//! player guess and the CPU's reply resolve inside a single transition, so
//! the session is never left waiting on the CPU. All time is injected,
//! keeping transitions pure and the tests clock-free.

use chrono::{DateTime, Duration, Utc};
use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::core::rng::DeterministicRng;
use crate::guess::clock::TurnClock;
use crate::guess::cpu::CpuOpponent;
use crate::guess::multiplier::Difficulty;
use crate::guess::range::{GuessOutcome, GuessRange};

/// Minutes an untouched session survives before the reaper claims it.
pub const SESSION_TTL_MINUTES: i64 = 10;

/// Session errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// The session already ended.
    #[error("Session is no longer active")]
    SessionInactive,

    /// Guess outside the live interval.
    #[error("Guess {guess} outside live range [{min}, {max}]")]
    GuessOutOfRange {
        /// The rejected guess.
        guess: u32,
        /// Current interval floor.
        min: u32,
        /// Current interval ceiling.
        max: u32,
    },

    /// No session with the requested id (service level).
    #[error("Session not found")]
    SessionNotFound,
}

/// How a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameEnd {
    /// Player found the secret first.
    PlayerWon,
    /// CPU found the secret first.
    CpuWon,
    /// Player ran out the turn budget; settles as a CPU win.
    TurnsExhausted,
    /// Player walked away.
    Forfeited,
    /// Session TTL elapsed without resolution.
    Expired,
}

impl GameEnd {
    /// Did the player win?
    pub fn player_won(self) -> bool {
        matches!(self, GameEnd::PlayerWon)
    }
}

/// What one full turn (player guess + CPU reply) produced.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TurnOutcome {
    /// The player's guess.
    pub player_guess: u32,
    /// Verdict on the player's guess.
    pub player_result: GuessOutcome,
    /// CPU's reply guess, if the player missed and turns remain.
    pub cpu_guess: Option<u32>,
    /// Verdict on the CPU's guess.
    pub cpu_result: Option<GuessOutcome>,
    /// Terminal result, if the turn ended the session.
    pub end: Option<GameEnd>,
    /// Multiplier in effect after this turn.
    pub multiplier: f64,
    /// Whether the guess was auto-submitted by the turn clock.
    pub auto_submitted: bool,
}

/// A single guessing game in flight.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GuessSession {
    /// Session identifier.
    pub id: Uuid,
    /// Player this session belongs to.
    pub player: String,
    /// Difficulty tier.
    pub difficulty: Difficulty,
    /// The number to find. Revealed to the client only at game over.
    secret: u32,
    /// Live guess interval.
    pub range: GuessRange,
    /// Player guesses made so far.
    pub player_turns: usize,
    /// Player + CPU guesses combined.
    pub total_turns: usize,
    /// True while the CPU's reply is being resolved.
    pub is_cpu_turn: bool,
    /// False once the session ended.
    pub is_active: bool,
    /// Multiplier the next player guess is worth.
    pub current_multiplier: f64,
    /// Terminal result, once ended.
    pub end: Option<GameEnd>,
    /// Exactly-once settlement guard.
    settled: bool,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// Countdown for the current player turn.
    pub turn_clock: TurnClock,
}

impl GuessSession {
    /// Start a session with a freshly drawn secret.
    pub fn new(
        player: String,
        difficulty: Difficulty,
        rng: &mut DeterministicRng,
        now: DateTime<Utc>,
    ) -> Self {
        let secret = 1 + rng.next_int(difficulty.range());

        Self {
            id: Uuid::new_v4(),
            player,
            difficulty,
            secret,
            range: GuessRange::new(difficulty.range()),
            player_turns: 0,
            total_turns: 0,
            is_cpu_turn: false,
            is_active: true,
            current_multiplier: difficulty.multiplier(0),
            end: None,
            settled: false,
            created_at: now,
            turn_clock: TurnClock::start(now),
        }
    }

    /// The secret. Exposed for game-over payloads and tests only.
    pub fn secret(&self) -> u32 {
        self.secret
    }

    /// Multiplier the session should settle at.
    ///
    /// The value of the turn the winning (or final) guess was made on.
    pub fn settlement_multiplier(&self) -> f64 {
        let index = self.player_turns.saturating_sub(1);
        self.difficulty.multiplier(index)
    }

    /// Submit a player guess and resolve the CPU's reply.
    pub fn player_guess(
        &mut self,
        guess: u32,
        now: DateTime<Utc>,
    ) -> Result<TurnOutcome, SessionError> {
        self.guess_inner(guess, now, false)
    }

    /// Auto-submit a random in-range guess for an expired turn clock.
    pub fn auto_guess(
        &mut self,
        rng: &mut DeterministicRng,
        now: DateTime<Utc>,
    ) -> Result<TurnOutcome, SessionError> {
        let guess = self.range.random_guess(rng);
        self.guess_inner(guess, now, true)
    }

    fn guess_inner(
        &mut self,
        guess: u32,
        now: DateTime<Utc>,
        auto_submitted: bool,
    ) -> Result<TurnOutcome, SessionError> {
        if !self.is_active {
            return Err(SessionError::SessionInactive);
        }
        if !self.range.contains(guess) {
            return Err(SessionError::GuessOutOfRange {
                guess,
                min: self.range.min,
                max: self.range.max,
            });
        }

        self.player_turns += 1;
        self.total_turns += 1;

        let player_result = self.range.narrow(guess, self.secret);
        let mut outcome = TurnOutcome {
            player_guess: guess,
            player_result,
            cpu_guess: None,
            cpu_result: None,
            end: None,
            multiplier: self.settlement_multiplier(),
            auto_submitted,
        };

        if player_result == GuessOutcome::Correct {
            self.finish(GameEnd::PlayerWon);
            outcome.end = self.end;
            return Ok(outcome);
        }

        if self.player_turns >= self.difficulty.max_player_turns() {
            self.finish(GameEnd::TurnsExhausted);
            outcome.end = self.end;
            return Ok(outcome);
        }

        // CPU replies with the midpoint of the narrowed interval
        self.is_cpu_turn = true;
        let cpu_guess = CpuOpponent::next_guess(&self.range);
        let cpu_result = self.range.narrow(cpu_guess, self.secret);
        self.total_turns += 1;
        outcome.cpu_guess = Some(cpu_guess);
        outcome.cpu_result = Some(cpu_result);

        if cpu_result == GuessOutcome::Correct {
            self.finish(GameEnd::CpuWon);
            outcome.end = self.end;
            return Ok(outcome);
        }

        // Back to the player on a fresh clock
        self.is_cpu_turn = false;
        self.current_multiplier = self.difficulty.multiplier(self.player_turns);
        self.turn_clock = TurnClock::with_limit(now, self.turn_clock.limit_secs);
        outcome.multiplier = self.current_multiplier;

        Ok(outcome)
    }

    /// Player walks away; ends immediately.
    pub fn forfeit(&mut self) -> Result<GameEnd, SessionError> {
        if !self.is_active {
            return Err(SessionError::SessionInactive);
        }
        self.finish(GameEnd::Forfeited);
        Ok(GameEnd::Forfeited)
    }

    /// Has the per-turn countdown run out?
    pub fn turn_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_cpu_turn && self.turn_clock.expired(now)
    }

    /// Has the whole session outlived its TTL?
    pub fn ttl_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.created_at + Duration::minutes(SESSION_TTL_MINUTES)
    }

    /// End the session as expired (TTL reaper).
    pub fn expire(&mut self) {
        if self.is_active {
            self.finish(GameEnd::Expired);
        }
    }

    /// Flip the exactly-once settlement guard.
    ///
    /// Returns false if the session was already settled; the caller must
    /// not touch the ledger again. The guard does not distinguish
    /// "succeeded" from "attempted and gave up"; both count as settled.
    pub fn mark_settled(&mut self) -> bool {
        if self.settled {
            return false;
        }
        self.settled = true;
        true
    }

    /// Has settlement been attempted?
    pub fn is_settled(&self) -> bool {
        self.settled
    }

    fn finish(&mut self, end: GameEnd) {
        self.is_active = false;
        self.is_cpu_turn = false;
        self.end = Some(end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::guess::clock::TURN_SECONDS;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn session(seed: u64) -> GuessSession {
        let mut rng = DeterministicRng::new(seed);
        GuessSession::new("alice".into(), Difficulty::Warlord, &mut rng, at(0))
    }

    #[test]
    fn test_new_session_shape() {
        let s = session(1);
        assert!(s.is_active);
        assert!(!s.is_cpu_turn);
        assert_eq!(s.player_turns, 0);
        assert_eq!(s.range, GuessRange::new(256));
        assert!((1..=256).contains(&s.secret()));
        assert_eq!(s.current_multiplier, 10.0);
        assert!(!s.is_settled());
    }

    #[test]
    fn test_correct_guess_wins_immediately() {
        let mut s = session(2);
        let secret = s.secret();

        let outcome = s.player_guess(secret, at(1)).unwrap();
        assert_eq!(outcome.player_result, GuessOutcome::Correct);
        assert_eq!(outcome.end, Some(GameEnd::PlayerWon));
        assert!(outcome.cpu_guess.is_none());
        assert!(!s.is_active);
        // First-turn win settles at the top of the table
        assert_eq!(outcome.multiplier, 10.0);
    }

    #[test]
    fn test_wrong_guess_gets_cpu_reply() {
        let mut s = session(3);
        let secret = s.secret();
        let wrong = if secret == 1 { 256 } else { secret - 1 };

        let outcome = s.player_guess(wrong, at(1)).unwrap();
        if outcome.end.is_none() {
            let cpu = outcome.cpu_guess.unwrap();
            assert!(s.range.contains(s.secret()));
            assert!(!s.is_cpu_turn);
            // CPU guessed the midpoint of the post-player interval and it
            // has since been excluded
            assert!(!s.range.contains(cpu) || s.secret() == cpu);
            assert_eq!(s.player_turns, 1);
            assert_eq!(s.total_turns, 2);
            // Multiplier decayed for the next turn
            assert_eq!(s.current_multiplier, 8.0);
        }
    }

    #[test]
    fn test_out_of_range_guess_rejected() {
        let mut s = session(4);
        let err = s.player_guess(300, at(1)).unwrap_err();
        assert!(matches!(err, SessionError::GuessOutOfRange { guess: 300, .. }));
        // Rejected input burns no turn
        assert_eq!(s.player_turns, 0);
    }

    #[test]
    fn test_guess_after_end_rejected() {
        let mut s = session(5);
        let secret = s.secret();
        s.player_guess(secret, at(1)).unwrap();

        let err = s.player_guess(secret, at(2)).unwrap_err();
        assert!(matches!(err, SessionError::SessionInactive));
    }

    #[test]
    fn test_game_always_ends_within_budget() {
        // Whatever the seed, the CPU's reply or the turn budget bounds the
        // session length
        for seed in 0..40 {
            let mut s = session(seed);
            let mut rng = DeterministicRng::new(seed + 1000);
            let mut turns = 0;

            while s.is_active {
                s.auto_guess(&mut rng, at(turns as i64)).unwrap();
                turns += 1;
                assert!(turns <= s.difficulty.max_player_turns());
            }

            let end = s.end.unwrap();
            assert!(matches!(
                end,
                GameEnd::PlayerWon | GameEnd::CpuWon | GameEnd::TurnsExhausted
            ));
        }
    }

    #[test]
    fn test_forfeit() {
        let mut s = session(6);
        assert_eq!(s.forfeit().unwrap(), GameEnd::Forfeited);
        assert!(!s.is_active);
        assert!(s.forfeit().is_err());
    }

    #[test]
    fn test_turn_clock_resets_after_exchange() {
        let mut s = session(7);
        let secret = s.secret();
        let wrong = if secret == 1 { 256 } else { secret - 1 };

        let outcome = s.player_guess(wrong, at(10)).unwrap();
        if outcome.end.is_none() {
            assert_eq!(s.turn_clock.started_at, at(10));
            assert!(!s.turn_expired(at(10)));
            assert!(s.turn_expired(at(10 + TURN_SECONDS)));
        }
    }

    #[test]
    fn test_ttl_expiry() {
        let mut s = session(8);
        assert!(!s.ttl_expired(at(60)));
        assert!(s.ttl_expired(at(SESSION_TTL_MINUTES * 60)));

        s.expire();
        assert!(!s.is_active);
        assert_eq!(s.end, Some(GameEnd::Expired));
    }

    #[test]
    fn test_settlement_guard_exactly_once() {
        let mut s = session(9);
        s.forfeit().unwrap();

        assert!(s.mark_settled());
        assert!(!s.mark_settled());
        assert!(s.is_settled());
    }

    #[test]
    fn test_secret_always_reachable() {
        // min <= secret <= max holds after every exchange
        let mut s = session(10);
        let mut rng = DeterministicRng::new(77);

        while s.is_active {
            let secret = s.secret();
            s.auto_guess(&mut rng, at(0)).unwrap();
            if s.is_active {
                assert!(s.range.min <= secret && secret <= s.range.max);
            }
        }
    }
}
