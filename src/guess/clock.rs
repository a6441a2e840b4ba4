//! Turn Clock
//!
//! Per-turn countdown for the player. The clock itself is a pure value
//! (deadline math against an injected "now"), so session logic tests never
//! wait on real time. The service's expiry sweep auto-submits a random
//! in-range guess when a deadline passes, so an expired turn always
//! progresses the game and is never an error.

use chrono::{DateTime, Duration, Utc};
use serde::{Serialize, Deserialize};

/// Seconds a player has to submit each guess.
pub const TURN_SECONDS: i64 = 15;

/// Countdown for a single player turn.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TurnClock {
    /// When the turn began.
    pub started_at: DateTime<Utc>,
    /// Allowed turn length in seconds.
    pub limit_secs: i64,
}

impl TurnClock {
    /// Start a clock at `now` with the standard limit.
    pub fn start(now: DateTime<Utc>) -> Self {
        Self::with_limit(now, TURN_SECONDS)
    }

    /// Start a clock with a custom limit (tests, config overrides).
    pub fn with_limit(now: DateTime<Utc>, limit_secs: i64) -> Self {
        Self {
            started_at: now,
            limit_secs,
        }
    }

    /// Deadline this clock expires at.
    pub fn deadline(&self) -> DateTime<Utc> {
        self.started_at + Duration::seconds(self.limit_secs)
    }

    /// Has the countdown run out?
    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline()
    }

    /// Whole seconds left on the clock (zero once expired).
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.deadline() - now).num_seconds().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_fresh_clock_not_expired() {
        let clock = TurnClock::start(at(0));
        assert!(!clock.expired(at(0)));
        assert_eq!(clock.remaining_secs(at(0)), TURN_SECONDS);
    }

    #[test]
    fn test_expires_exactly_at_deadline() {
        let clock = TurnClock::start(at(0));
        assert!(!clock.expired(at(TURN_SECONDS - 1)));
        assert!(clock.expired(at(TURN_SECONDS)));
        assert!(clock.expired(at(TURN_SECONDS + 30)));
    }

    #[test]
    fn test_remaining_clamps_at_zero() {
        let clock = TurnClock::start(at(0));
        assert_eq!(clock.remaining_secs(at(5)), 10);
        assert_eq!(clock.remaining_secs(at(100)), 0);
    }

    #[test]
    fn test_custom_limit() {
        let clock = TurnClock::with_limit(at(0), 2);
        assert!(!clock.expired(at(1)));
        assert!(clock.expired(at(2)));
    }
}
