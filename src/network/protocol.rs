//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! All messages are serialized as JSON for debugging ease,
//! with optional binary (bincode) for production.

use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::guess::multiplier::Difficulty;
use crate::guess::range::GuessOutcome;
use crate::guess::session::GameEnd;
use crate::tournament::battle::HitOutcome;
use crate::tournament::entrant::{Entrant, EntrantId};
use crate::tournament::state::TournamentState;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Kick off a tournament for a season.
    StartTournament {
        /// Season label for the run.
        season: String,
    },

    /// Request the current tournament state (reconnection).
    SyncRequest,

    /// Request the most recent completed run's champion.
    LatestWinner,

    /// Start a guessing game.
    StartGuess {
        /// Player identifier.
        player: String,
        /// Difficulty tier to play.
        difficulty: Difficulty,
    },

    /// Submit a guess for an in-flight session.
    Guess {
        /// Session being played.
        session_id: Uuid,
        /// The guessed number.
        value: u32,
    },

    /// Walk away from a session.
    ForfeitGuess {
        /// Session being abandoned.
        session_id: Uuid,
    },

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back.
        timestamp: u64,
    },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full tournament snapshot.
    TournamentState {
        /// The durable state as of the latest checkpoint.
        state: TournamentState,
    },

    /// The match being broadcast live this round.
    FeaturedBattle(FeaturedBattleInfo),

    /// Featured fighters' current health.
    BattleUpdate {
        /// Left slot health.
        left: FighterHealth,
        /// Right slot health.
        right: FighterHealth,
    },

    /// Coin flip decided the first attacker.
    CoinFlip {
        /// Winner of the flip.
        first_attacker: EntrantId,
        /// The entrant defending first.
        defender: EntrantId,
    },

    /// Opening volley dice.
    DiceRoll {
        /// Attacker who rolled.
        attacker: EntrantId,
        /// The two dice faces.
        dice: [u32; 2],
        /// Total damage.
        damage: i32,
    },

    /// An exchange hit roll.
    HitRoll {
        /// Attacker this tick.
        attacker: EntrantId,
        /// Raw roll in [0, 100).
        roll: u32,
        /// Outcome tier.
        outcome: HitOutcome,
    },

    /// Damage landed.
    NftHit {
        /// Attacker this tick.
        attacker: EntrantId,
        /// Defender hit.
        target: EntrantId,
        /// Damage applied.
        damage: i32,
        /// Critical hit?
        critical: bool,
        /// Defender health after the hit.
        target_health: i32,
    },

    /// The featured battle resolved.
    BattleResult {
        /// Surviving entrant.
        winner: EntrantId,
        /// Eliminated entrant.
        loser: EntrantId,
    },

    /// Most recent completed run's champion.
    LatestWinner {
        /// The champion, if a completed run exists.
        winner: Option<Entrant>,
    },

    /// A guessing session started.
    GuessStarted(GuessStartedInfo),

    /// A guess (player's or auto-submitted) resolved.
    GuessResult(GuessResultInfo),

    /// A guessing session ended.
    GuessOver(GuessOverInfo),

    /// Pong response.
    Pong {
        /// Echoed client timestamp.
        timestamp: u64,
        /// Server wall clock (ms since epoch).
        server_time: u64,
    },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Why the server is going away.
        reason: String,
    },
}

/// One fighter's current health.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FighterHealth {
    /// Entrant identifier.
    pub id: EntrantId,
    /// Remaining health.
    pub health: i32,
}

/// The featured match announcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturedBattleInfo {
    /// Round the match belongs to.
    pub round: usize,
    /// Left slot.
    pub left: Entrant,
    /// Right slot.
    pub right: Entrant,
}

/// Opening state of a guessing session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuessStartedInfo {
    /// New session id.
    pub session_id: Uuid,
    /// Tier being played.
    pub difficulty: Difficulty,
    /// Interval floor.
    pub min: u32,
    /// Interval ceiling.
    pub max: u32,
    /// Multiplier the first guess is worth.
    pub multiplier: f64,
    /// Seconds per player turn.
    pub turn_seconds: i64,
    /// Stake the session plays for.
    pub entry_price: f64,
}

/// One resolved turn of a guessing session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuessResultInfo {
    /// Session the turn belongs to.
    pub session_id: Uuid,
    /// The player's guess.
    pub player_guess: u32,
    /// Verdict on the player's guess.
    pub player_result: GuessOutcome,
    /// CPU's reply guess, if any.
    pub cpu_guess: Option<u32>,
    /// Verdict on the CPU's guess.
    pub cpu_result: Option<GuessOutcome>,
    /// Interval floor after the exchange.
    pub min: u32,
    /// Interval ceiling after the exchange.
    pub max: u32,
    /// Multiplier the next guess is worth.
    pub multiplier: f64,
    /// Seconds left on the turn clock.
    pub remaining_secs: i64,
    /// Whether the turn clock played this guess.
    pub auto_submitted: bool,
}

/// Terminal state of a guessing session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuessOverInfo {
    /// Session that ended.
    pub session_id: Uuid,
    /// How it ended.
    pub end: GameEnd,
    /// The secret, revealed.
    pub secret: u32,
    /// Points credited.
    pub earned: f64,
    /// Multiplier shown to the player.
    pub displayed_multiplier: f64,
    /// Balance after settlement; `None` when the ledger write failed.
    pub new_balance: Option<f64>,
}

/// Server error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Invalid input.
    InvalidInput,
    /// A tournament is already in progress.
    TournamentAlreadyRunning,
    /// Not enough entrants to build a bracket.
    InsufficientEntrants,
    /// No such guessing session.
    SessionNotFound,
    /// Guess outside the live interval.
    GuessOutOfRange,
    /// Internal error.
    InternalError,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Serialize to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_json_roundtrip() {
        let msg = ClientMessage::Guess {
            session_id: Uuid::nil(),
            value: 137,
        };

        let json = msg.to_json().unwrap();
        let parsed = ClientMessage::from_json(&json).unwrap();

        if let ClientMessage::Guess { value, .. } = parsed {
            assert_eq!(value, 137);
        } else {
            panic!("Wrong message type");
        }
    }

    #[test]
    fn test_server_message_json_roundtrip() {
        let msg = ServerMessage::NftHit {
            attacker: 3,
            target: 7,
            damage: 2,
            critical: false,
            target_health: 21,
        };

        let json = msg.to_json().unwrap();
        let parsed = ServerMessage::from_json(&json).unwrap();

        if let ServerMessage::NftHit { target, target_health, .. } = parsed {
            assert_eq!(target, 7);
            assert_eq!(target_health, 21);
        } else {
            panic!("Wrong message type");
        }
    }

    #[test]
    fn test_tag_naming_is_snake_case() {
        let msg = ClientMessage::SyncRequest;
        assert!(msg.to_json().unwrap().contains("sync_request"));

        let msg = ServerMessage::BattleResult { winner: 1, loser: 2 };
        assert!(msg.to_json().unwrap().contains("battle_result"));

        let msg = ServerMessage::Error(ServerError {
            code: ErrorCode::TournamentAlreadyRunning,
            message: "A tournament is already running".to_string(),
        });
        assert!(msg.to_json().unwrap().contains("tournament_already_running"));
    }

    #[test]
    fn test_battle_event_messages() {
        let msgs = vec![
            ServerMessage::CoinFlip {
                first_attacker: 0,
                defender: 1,
            },
            ServerMessage::DiceRoll {
                attacker: 0,
                dice: [3, 5],
                damage: 8,
            },
            ServerMessage::HitRoll {
                attacker: 1,
                roll: 85,
                outcome: HitOutcome::Critical,
            },
            ServerMessage::BattleUpdate {
                left: FighterHealth { id: 0, health: 20 },
                right: FighterHealth { id: 1, health: 13 },
            },
            ServerMessage::BattleResult { winner: 0, loser: 1 },
        ];

        for msg in msgs {
            let json = msg.to_json().unwrap();
            let _ = ServerMessage::from_json(&json).unwrap();
        }
    }

    #[test]
    fn test_guess_messages_roundtrip() {
        let msg = ServerMessage::GuessResult(GuessResultInfo {
            session_id: Uuid::nil(),
            player_guess: 128,
            player_result: GuessOutcome::TooLow,
            cpu_guess: Some(192),
            cpu_result: Some(GuessOutcome::TooHigh),
            min: 129,
            max: 191,
            multiplier: 8.0,
            remaining_secs: 15,
            auto_submitted: false,
        });

        let json = msg.to_json().unwrap();
        let parsed = ServerMessage::from_json(&json).unwrap();
        if let ServerMessage::GuessResult(info) = parsed {
            assert_eq!(info.cpu_guess, Some(192));
            assert_eq!(info.min, 129);
        } else {
            panic!("Wrong message type");
        }
    }

    #[test]
    fn test_client_binary_roundtrip() {
        // Note: bincode does not support #[serde(tag = "...")] enums;
        // binary transport is limited to untagged payload structs.
        let info = GuessStartedInfo {
            session_id: Uuid::nil(),
            difficulty: Difficulty::Warlord,
            min: 1,
            max: 256,
            multiplier: 10.0,
            turn_seconds: 15,
            entry_price: 100.0,
        };

        let bytes = bincode::serialize(&info).unwrap();
        let parsed: GuessStartedInfo = bincode::deserialize(&bytes).unwrap();
        assert_eq!(parsed.max, 256);
    }
}
