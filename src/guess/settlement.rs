//! Points Settlement
//!
//! Values a finished session and posts the result to the points ledger.
//! The core never reads or writes user records directly; everything goes
//! through the two [`PointsLedger`] calls. Settlement happens exactly once
//! per session; a failed ledger write is reported as a zero delta and the
//! session stays settled so a retry storm can never double-pay.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Serialize, Deserialize};
use tracing::{error, warn};

use crate::guess::multiplier::Difficulty;
use crate::guess::session::{GameEnd, GuessSession};

/// Fee shaved off a CPU-win payout.
pub const CPU_WIN_FEE: f64 = 0.10;

/// Ledger errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    /// The ledger write did not go through.
    #[error("Ledger write failed: {0}")]
    WriteFailed(String),
}

/// Balance after a ledger update.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Balance {
    /// Points balance after the delta was applied.
    pub new_balance: f64,
}

/// Per-game statistics recorded alongside the points delta.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameStats {
    /// Player guesses the session took.
    pub turns_to_win: usize,
    /// Multiplier the session settled at.
    pub ending_multiplier: f64,
    /// Difficulty tier played.
    pub difficulty: Difficulty,
    /// Stake the session was played for.
    pub entry_price: f64,
}

/// The points-ledger surface the mini-games settle through.
pub trait PointsLedger: Send + Sync {
    /// Apply a points delta, returning the new balance.
    fn update_points(&self, player: &str, delta: f64) -> Result<Balance, LedgerError>;

    /// Record per-game statistics.
    fn record_game_stats(&self, player: &str, stats: &GameStats) -> Result<(), LedgerError>;
}

/// The valued outcome of a session, before it reaches the ledger.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Settlement {
    /// Points delta to credit.
    pub earned: f64,
    /// Multiplier to show the player.
    pub displayed_multiplier: f64,
}

/// Value a finished game.
///
/// A player win pays `entry_price * multiplier`. A CPU win still credits
/// the player the multiplier-scaled amount reduced by [`CPU_WIN_FEE`]
/// (the softened consolation the product shipped with), and the displayed
/// multiplier is reduced by the same fee.
pub fn settle(has_won: bool, multiplier: f64, entry_price: f64) -> Settlement {
    if has_won {
        Settlement {
            earned: entry_price * multiplier,
            displayed_multiplier: multiplier,
        }
    } else {
        Settlement {
            earned: entry_price * multiplier * (1.0 - CPU_WIN_FEE),
            displayed_multiplier: multiplier * (1.0 - CPU_WIN_FEE),
        }
    }
}

/// What the client is told after settlement.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettlementReport {
    /// How the session ended.
    pub end: GameEnd,
    /// Points credited. Zero when the ledger write failed or the session
    /// was forfeited/expired.
    pub earned: f64,
    /// Multiplier shown to the player.
    pub displayed_multiplier: f64,
    /// Balance after the write; `None` when the write failed, in which
    /// case the client keeps showing its pre-settlement balance.
    pub new_balance: Option<f64>,
}

/// Settle a finished session against the ledger, exactly once.
///
/// Returns `None` if the session is still active or was already settled.
/// Forfeited and expired sessions settle without a ledger payout. A
/// failed `update_points` is logged and reported as `earned = 0`; the
/// session is still marked settled, by design.
pub fn apply_settlement(
    session: &mut GuessSession,
    ledger: &dyn PointsLedger,
    entry_price: f64,
) -> Option<SettlementReport> {
    let end = session.end?;
    if !session.mark_settled() {
        return None;
    }

    if matches!(end, GameEnd::Forfeited | GameEnd::Expired) {
        return Some(SettlementReport {
            end,
            earned: 0.0,
            displayed_multiplier: 0.0,
            new_balance: None,
        });
    }

    let valued = settle(end.player_won(), session.settlement_multiplier(), entry_price);

    let stats = GameStats {
        turns_to_win: session.player_turns,
        ending_multiplier: valued.displayed_multiplier,
        difficulty: session.difficulty,
        entry_price,
    };

    match ledger.update_points(&session.player, valued.earned) {
        Ok(balance) => {
            if let Err(e) = ledger.record_game_stats(&session.player, &stats) {
                // Stats are best-effort; the points already landed
                warn!("Failed to record game stats for {}: {}", session.player, e);
            }
            Some(SettlementReport {
                end,
                earned: valued.earned,
                displayed_multiplier: valued.displayed_multiplier,
                new_balance: Some(balance.new_balance),
            })
        }
        Err(e) => {
            error!(
                "Ledger update failed for {} (session {}): {}",
                session.player, session.id, e
            );
            Some(SettlementReport {
                end,
                earned: 0.0,
                displayed_multiplier: valued.displayed_multiplier,
                new_balance: None,
            })
        }
    }
}

/// File-backed ledger for single-node deployments.
///
/// Balances live in one JSON document; stats append to a sibling log.
/// The production deployment points this seam at the real ledger service.
pub struct FileLedger {
    path: PathBuf,
    balances: Mutex<BTreeMap<String, f64>>,
}

impl FileLedger {
    /// Open (or create) a ledger file in the data directory.
    pub fn open(data_dir: PathBuf) -> Result<Self, LedgerError> {
        fs::create_dir_all(&data_dir)
            .map_err(|e| LedgerError::WriteFailed(e.to_string()))?;
        let path = data_dir.join("ledger.json");

        let balances = if path.exists() {
            let raw = fs::read_to_string(&path)
                .map_err(|e| LedgerError::WriteFailed(e.to_string()))?;
            serde_json::from_str(&raw)
                .map_err(|e| LedgerError::WriteFailed(e.to_string()))?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            balances: Mutex::new(balances),
        })
    }

    fn persist(&self, balances: &BTreeMap<String, f64>) -> Result<(), LedgerError> {
        let json = serde_json::to_string_pretty(balances)
            .map_err(|e| LedgerError::WriteFailed(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| LedgerError::WriteFailed(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| LedgerError::WriteFailed(e.to_string()))?;
        Ok(())
    }
}

impl PointsLedger for FileLedger {
    fn update_points(&self, player: &str, delta: f64) -> Result<Balance, LedgerError> {
        let mut balances = self
            .balances
            .lock()
            .map_err(|_| LedgerError::WriteFailed("ledger lock poisoned".to_string()))?;

        let entry = balances.entry(player.to_string()).or_insert(0.0);
        *entry += delta;
        let new_balance = *entry;

        self.persist(&balances)?;
        Ok(Balance { new_balance })
    }

    fn record_game_stats(&self, player: &str, stats: &GameStats) -> Result<(), LedgerError> {
        let line = serde_json::json!({
            "player": player,
            "stats": stats,
            "at": chrono::Utc::now(),
        });
        let log = self.path.with_file_name("game_stats.jsonl");
        let mut existing = fs::read_to_string(&log).unwrap_or_default();
        existing.push_str(&line.to_string());
        existing.push('\n');
        fs::write(&log, existing).map_err(|e| LedgerError::WriteFailed(e.to_string()))?;
        Ok(())
    }
}
