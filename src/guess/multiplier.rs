//! Multiplier Schedule
//!
//! Turn-indexed payout multipliers per difficulty tier. Values decay as
//! the player burns turns; past the end of a table the last entry applies.
//! The table length doubles as the player's turn budget for that tier.

use serde::{Serialize, Deserialize};

/// Difficulty tiers, named by the upper bound of the secret range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    /// Secret in [1, 64].
    Cadet,
    /// Secret in [1, 128].
    Raider,
    /// Secret in [1, 256].
    Warlord,
}

/// Payout tables, one per tier, indexed by player-turn count (0-based).
///
/// Each table is monotonically non-increasing; the binary-search turn
/// budget for the tier fits inside it with a little slack for human play.
const CADET_MULTIPLIERS: &[f64] = &[5.0, 4.0, 3.0, 2.5, 2.0, 1.5, 1.2, 1.0];
const RAIDER_MULTIPLIERS: &[f64] = &[8.0, 6.0, 5.0, 4.0, 3.0, 2.5, 2.0, 1.5, 1.0];
const WARLORD_MULTIPLIERS: &[f64] = &[10.0, 8.0, 6.0, 5.0, 4.0, 3.0, 2.5, 2.0, 1.5, 1.0];

impl Difficulty {
    /// Upper bound of the secret range for this tier.
    pub fn range(self) -> u32 {
        match self {
            Difficulty::Cadet => 64,
            Difficulty::Raider => 128,
            Difficulty::Warlord => 256,
        }
    }

    /// The payout table for this tier.
    fn table(self) -> &'static [f64] {
        match self {
            Difficulty::Cadet => CADET_MULTIPLIERS,
            Difficulty::Raider => RAIDER_MULTIPLIERS,
            Difficulty::Warlord => WARLORD_MULTIPLIERS,
        }
    }

    /// Multiplier for a 0-based player-turn index.
    ///
    /// Turn counts beyond the table clamp to the last entry rather than
    /// erroring.
    pub fn multiplier(self, turn_index: usize) -> f64 {
        let table = self.table();
        table[turn_index.min(table.len() - 1)]
    }

    /// Player turns allowed before the session ends as a CPU win.
    pub fn max_player_turns(self) -> usize {
        self.table().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL_TIERS: [Difficulty; 3] =
        [Difficulty::Cadet, Difficulty::Raider, Difficulty::Warlord];

    #[test]
    fn test_ranges() {
        assert_eq!(Difficulty::Cadet.range(), 64);
        assert_eq!(Difficulty::Raider.range(), 128);
        assert_eq!(Difficulty::Warlord.range(), 256);
    }

    #[test]
    fn test_first_turn_pays_most() {
        assert_eq!(Difficulty::Cadet.multiplier(0), 5.0);
        assert_eq!(Difficulty::Raider.multiplier(0), 8.0);
        assert_eq!(Difficulty::Warlord.multiplier(0), 10.0);
    }

    #[test]
    fn test_monotonically_non_increasing() {
        for tier in ALL_TIERS {
            for t in 1..tier.max_player_turns() {
                assert!(
                    tier.multiplier(t) <= tier.multiplier(t - 1),
                    "{tier:?} increases at turn {t}"
                );
            }
        }
    }

    #[test]
    fn test_clamps_past_table_end() {
        for tier in ALL_TIERS {
            let last = tier.multiplier(tier.max_player_turns() - 1);
            assert_eq!(tier.multiplier(tier.max_player_turns()), last);
            assert_eq!(tier.multiplier(500), last);
        }
    }

    #[test]
    fn test_turn_budget_covers_binary_search() {
        // A perfect player can always win inside the budget
        for tier in ALL_TIERS {
            let search_turns = 32 - tier.range().leading_zeros() as usize;
            assert!(tier.max_player_turns() >= search_turns);
        }
    }

    proptest! {
        /// Clamping means the schedule is total over any turn index.
        #[test]
        fn prop_schedule_total_and_decaying(t1 in 0usize..1000, t2 in 0usize..1000) {
            for tier in ALL_TIERS {
                let (lo, hi) = (t1.min(t2), t1.max(t2));
                prop_assert!(tier.multiplier(hi) <= tier.multiplier(lo));
                prop_assert!(tier.multiplier(hi) >= 1.0);
            }
        }
    }
}
