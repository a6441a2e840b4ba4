//! Tournament Entrants
//!
//! Each entrant represents one NFT competing in the elimination bracket.

use serde::{Serialize, Deserialize};

/// Unique entrant identifier, assigned at roster load time.
pub type EntrantId = u32;

/// Health every entrant starts a round with.
pub const ROUND_HEALTH: i32 = 32;

/// A single competing unit in the tournament bracket.
///
/// Entrants are owned by the bracket they currently reside in; a winner is
/// cloned (not moved) into the next round's bracket with health reset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entrant {
    /// Stable identifier within this tournament run.
    pub id: EntrantId,
    /// Display name from the token metadata.
    pub name: String,
    /// Mint address of the underlying NFT.
    pub mint: String,
    /// Image URI from the token metadata.
    pub image: String,
    /// Remaining health in the current round.
    pub health: i32,
    /// Matches won across the run.
    pub wins: u32,
    /// Matches lost across the run.
    pub losses: u32,
}

impl Entrant {
    /// Create a fresh entrant at full round health.
    pub fn new(id: EntrantId, name: String, mint: String, image: String) -> Self {
        Self {
            id,
            name,
            mint,
            image,
            health: ROUND_HEALTH,
            wins: 0,
            losses: 0,
        }
    }

    /// Is this entrant out of the fight?
    #[inline]
    pub fn is_eliminated(&self) -> bool {
        self.health <= 0
    }

    /// Apply damage, clamping at the elimination floor.
    pub fn take_damage(&mut self, damage: i32) {
        self.health -= damage;
        if self.health < 0 {
            self.health = 0;
        }
    }

    /// Restore full health for the next round.
    pub fn reset_for_round(&mut self) {
        self.health = ROUND_HEALTH;
    }
}
