//! Battle Simulation
//!
//! Resolves one match as a sequence of explicit stages: a coin flip for
//! first attacker, an opening two-dice volley, then alternating hit rolls
//! until a defender runs out of health. Each call to [`BattleSim::step`]
//! advances exactly one stage and reports the events it produced plus the
//! pause to schedule before the next stage. Pacing exists for spectators,
//! not for the math, so tests drive the machine with
//! [`BattleTiming::instant`] and never touch the clock.

use std::time::Duration;

use serde::{Serialize, Deserialize};

use crate::core::rng::DeterministicRng;
use crate::tournament::bracket::MatchPair;
use crate::tournament::entrant::{Entrant, EntrantId};

/// Battle simulation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BattleError {
    /// A match was started with an entrant already at zero health.
    /// The orchestrator's round invariants make this unreachable.
    #[error("Entrant {0} is already eliminated")]
    EntrantAlreadyEliminated(EntrantId),
}

/// Outcome tier of a single exchange hit roll.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitOutcome {
    /// Roll < 10: no damage.
    Miss,
    /// Roll in [10, 31): 1 damage.
    Light,
    /// Roll in [31, 71): 2 damage.
    Medium,
    /// Roll >= 71: 3 damage.
    Critical,
}

impl HitOutcome {
    /// Map a raw [0, 100) roll to its outcome tier.
    pub fn from_roll(roll: u32) -> Self {
        match roll {
            0..=9 => HitOutcome::Miss,
            10..=30 => HitOutcome::Light,
            31..=70 => HitOutcome::Medium,
            _ => HitOutcome::Critical,
        }
    }

    /// Damage dealt by this outcome.
    pub fn damage(self) -> i32 {
        match self {
            HitOutcome::Miss => 0,
            HitOutcome::Light => 1,
            HitOutcome::Medium => 2,
            HitOutcome::Critical => 3,
        }
    }
}

/// A structured battle event.
///
/// These are the authoritative record of what happened: the presentation
/// layer renders them directly and never re-derives semantics from
/// formatted text.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BattleEvent {
    /// Coin flip decided who attacks first.
    CoinFlip {
        /// Winner of the flip, attacking first.
        first_attacker: EntrantId,
        /// The other entrant, defending first.
        defender: EntrantId,
    },

    /// Opening volley dice were rolled.
    DiceRoll {
        /// Attacker who rolled.
        attacker: EntrantId,
        /// The two dice faces.
        dice: [u32; 2],
        /// Total damage (sum of the dice).
        damage: i32,
    },

    /// An exchange hit roll was drawn.
    HitRoll {
        /// Attacker this tick.
        attacker: EntrantId,
        /// Raw roll in [0, 100).
        roll: u32,
        /// Outcome tier.
        outcome: HitOutcome,
    },

    /// Damage landed on a defender.
    Hit {
        /// Attacker this tick.
        attacker: EntrantId,
        /// Defender taking the damage.
        target: EntrantId,
        /// Damage applied.
        damage: i32,
        /// Was this a critical hit?
        critical: bool,
        /// Defender's health after the hit.
        target_health: i32,
    },

    /// The battle resolved.
    Finished {
        /// Surviving entrant.
        winner: EntrantId,
        /// Eliminated entrant.
        loser: EntrantId,
    },
}

/// Spectator pacing between battle stages.
#[derive(Clone, Copy, Debug)]
pub struct BattleTiming {
    /// Pause after the coin flip is announced.
    pub coin_flip_delay: Duration,
    /// Pause after the opening volley lands.
    pub volley_delay: Duration,
    /// Interval between exchange ticks.
    pub exchange_interval: Duration,
}

impl Default for BattleTiming {
    fn default() -> Self {
        Self {
            coin_flip_delay: Duration::from_millis(2500),
            volley_delay: Duration::from_millis(2000),
            exchange_interval: Duration::from_millis(1200),
        }
    }
}

impl BattleTiming {
    /// Zero delays for tests and silent (non-featured) matches.
    pub fn instant() -> Self {
        Self {
            coin_flip_delay: Duration::ZERO,
            volley_delay: Duration::ZERO,
            exchange_interval: Duration::ZERO,
        }
    }
}

/// Stage the simulation is currently in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BattlePhase {
    CoinFlip,
    OpeningVolley,
    Exchange,
    Done,
}

/// Result of advancing the simulation one stage.
#[derive(Debug)]
pub struct BattleStep {
    /// Events produced by this stage, in order.
    pub events: Vec<BattleEvent>,
    /// Pause to schedule before the next stage.
    pub pause: Duration,
    /// True once the battle has resolved.
    pub done: bool,
}

/// State machine for one match.
///
/// Strictly sequential stages: `CoinFlip -> OpeningVolley -> Exchange*`.
/// The entrants are owned copies; the orchestrator folds the outcome back
/// into the bracket after the fan-in.
#[derive(Debug)]
pub struct BattleSim {
    fighters: [Entrant; 2],
    /// Index into `fighters` of the entrant attacking this stage.
    attacker: usize,
    phase: BattlePhase,
    timing: BattleTiming,
}

impl BattleSim {
    /// Create a simulation for a pairing.
    pub fn new(pair: MatchPair, timing: BattleTiming) -> Result<Self, BattleError> {
        for e in [&pair.left, &pair.right] {
            if e.is_eliminated() {
                return Err(BattleError::EntrantAlreadyEliminated(e.id));
            }
        }

        Ok(Self {
            fighters: [pair.left, pair.right],
            attacker: 0,
            phase: BattlePhase::CoinFlip,
            timing,
        })
    }

    /// Advance one stage.
    ///
    /// Calling after the battle resolved is a no-op returning `done`.
    pub fn step(&mut self, rng: &mut DeterministicRng) -> BattleStep {
        match self.phase {
            BattlePhase::CoinFlip => self.step_coin_flip(rng),
            BattlePhase::OpeningVolley => self.step_opening_volley(rng),
            BattlePhase::Exchange => self.step_exchange(rng),
            BattlePhase::Done => BattleStep {
                events: Vec::new(),
                pause: Duration::ZERO,
                done: true,
            },
        }
    }

    fn step_coin_flip(&mut self, rng: &mut DeterministicRng) -> BattleStep {
        self.attacker = if rng.coin_flip() { 0 } else { 1 };
        self.phase = BattlePhase::OpeningVolley;

        BattleStep {
            events: vec![BattleEvent::CoinFlip {
                first_attacker: self.fighters[self.attacker].id,
                defender: self.fighters[1 - self.attacker].id,
            }],
            pause: self.timing.coin_flip_delay,
            done: false,
        }
    }

    fn step_opening_volley(&mut self, rng: &mut DeterministicRng) -> BattleStep {
        let dice = [rng.roll_die(), rng.roll_die()];
        let damage = (dice[0] + dice[1]) as i32;

        let attacker_id = self.fighters[self.attacker].id;
        let defender = &mut self.fighters[1 - self.attacker];
        defender.take_damage(damage);

        let mut events = vec![
            BattleEvent::DiceRoll {
                attacker: attacker_id,
                dice,
                damage,
            },
            BattleEvent::Hit {
                attacker: attacker_id,
                target: defender.id,
                damage,
                critical: false,
                target_health: defender.health,
            },
        ];

        if defender.is_eliminated() {
            // A 12-point volley cannot fell a 32-health entrant, but the
            // terminal check stays stage-local so health constants can move.
            events.push(self.finish(1 - self.attacker));
            return BattleStep {
                events,
                pause: Duration::ZERO,
                done: true,
            };
        }

        self.phase = BattlePhase::Exchange;
        // Roles swap: the opening defender strikes first in the exchange
        self.attacker = 1 - self.attacker;

        BattleStep {
            events,
            pause: self.timing.volley_delay,
            done: false,
        }
    }

    fn step_exchange(&mut self, rng: &mut DeterministicRng) -> BattleStep {
        let roll = rng.hit_roll();
        let outcome = HitOutcome::from_roll(roll);
        let damage = outcome.damage();

        let attacker_id = self.fighters[self.attacker].id;
        let defender = &mut self.fighters[1 - self.attacker];
        defender.take_damage(damage);

        let mut events = vec![
            BattleEvent::HitRoll {
                attacker: attacker_id,
                roll,
                outcome,
            },
            BattleEvent::Hit {
                attacker: attacker_id,
                target: defender.id,
                damage,
                critical: outcome == HitOutcome::Critical,
                target_health: defender.health,
            },
        ];

        if defender.is_eliminated() {
            events.push(self.finish(1 - self.attacker));
            return BattleStep {
                events,
                pause: Duration::ZERO,
                done: true,
            };
        }

        // Swap roles for the next tick
        self.attacker = 1 - self.attacker;

        BattleStep {
            events,
            pause: self.timing.exchange_interval,
            done: false,
        }
    }

    fn finish(&mut self, loser: usize) -> BattleEvent {
        self.phase = BattlePhase::Done;
        let winner = 1 - loser;
        self.fighters[winner].wins += 1;
        self.fighters[loser].losses += 1;

        BattleEvent::Finished {
            winner: self.fighters[winner].id,
            loser: self.fighters[loser].id,
        }
    }

    /// Current health of both fighters, in slot order.
    pub fn health(&self) -> (i32, i32) {
        (self.fighters[0].health, self.fighters[1].health)
    }

    /// `(id, health)` of both fighters, in slot order.
    pub fn health_pairs(&self) -> ((EntrantId, i32), (EntrantId, i32)) {
        (
            (self.fighters[0].id, self.fighters[0].health),
            (self.fighters[1].id, self.fighters[1].health),
        )
    }

    /// The surviving entrant, once the battle resolved.
    pub fn winner(&self) -> Option<&Entrant> {
        if self.phase != BattlePhase::Done {
            return None;
        }
        self.fighters.iter().find(|e| !e.is_eliminated())
    }

    /// Consume the simulation, returning (winner, loser).
    ///
    /// Returns `None` if the battle has not resolved.
    pub fn into_outcome(self) -> Option<(Entrant, Entrant)> {
        if self.phase != BattlePhase::Done {
            return None;
        }
        let [a, b] = self.fighters;
        if a.is_eliminated() {
            Some((b, a))
        } else {
            Some((a, b))
        }
    }
}

/// Drive a battle to completion without pacing.
///
/// Used for silent (non-featured) matches and tests; featured matches are
/// stepped by the orchestrator so each stage can be broadcast and paced.
pub fn resolve_battle(
    pair: MatchPair,
    rng: &mut DeterministicRng,
) -> Result<(Entrant, Entrant, Vec<BattleEvent>), BattleError> {
    let mut sim = BattleSim::new(pair, BattleTiming::instant())?;
    let mut events = Vec::new();

    loop {
        let step = sim.step(rng);
        events.extend(step.events);
        if step.done {
            break;
        }
    }

    let (winner, loser) = sim
        .into_outcome()
        .unwrap_or_else(|| unreachable!("battle loop exits only when done"));
    Ok((winner, loser, events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tournament::entrant::ROUND_HEALTH;

    fn pair() -> MatchPair {
        MatchPair {
            left: Entrant::new(0, "Whiskers".into(), "m0".into(), String::new()),
            right: Entrant::new(1, "Mittens".into(), "m1".into(), String::new()),
        }
    }

    #[test]
    fn test_hit_outcome_thresholds() {
        assert_eq!(HitOutcome::from_roll(0), HitOutcome::Miss);
        assert_eq!(HitOutcome::from_roll(9), HitOutcome::Miss);
        assert_eq!(HitOutcome::from_roll(10), HitOutcome::Light);
        assert_eq!(HitOutcome::from_roll(30), HitOutcome::Light);
        assert_eq!(HitOutcome::from_roll(31), HitOutcome::Medium);
        assert_eq!(HitOutcome::from_roll(70), HitOutcome::Medium);
        assert_eq!(HitOutcome::from_roll(71), HitOutcome::Critical);
        assert_eq!(HitOutcome::from_roll(99), HitOutcome::Critical);
    }

    #[test]
    fn test_hit_outcome_damage() {
        assert_eq!(HitOutcome::Miss.damage(), 0);
        assert_eq!(HitOutcome::Light.damage(), 1);
        assert_eq!(HitOutcome::Medium.damage(), 2);
        assert_eq!(HitOutcome::Critical.damage(), 3);
    }

    #[test]
    fn test_rejects_eliminated_entrant() {
        let mut p = pair();
        p.left.health = 0;
        let err = BattleSim::new(p, BattleTiming::instant()).unwrap_err();
        assert!(matches!(err, BattleError::EntrantAlreadyEliminated(0)));
    }

    #[test]
    fn test_stage_order() {
        let mut sim = BattleSim::new(pair(), BattleTiming::instant()).unwrap();
        let mut rng = DeterministicRng::new(7);

        let first = sim.step(&mut rng);
        assert!(matches!(first.events[0], BattleEvent::CoinFlip { .. }));

        let second = sim.step(&mut rng);
        assert!(matches!(second.events[0], BattleEvent::DiceRoll { .. }));
        assert!(matches!(second.events[1], BattleEvent::Hit { .. }));

        let third = sim.step(&mut rng);
        assert!(matches!(third.events[0], BattleEvent::HitRoll { .. }));
    }

    #[test]
    fn test_opening_volley_damage_in_range() {
        let mut sim = BattleSim::new(pair(), BattleTiming::instant()).unwrap();
        let mut rng = DeterministicRng::new(99);

        sim.step(&mut rng); // coin flip
        let volley = sim.step(&mut rng);

        if let BattleEvent::DiceRoll { dice, damage, .. } = &volley.events[0] {
            assert!((1..=6).contains(&dice[0]));
            assert!((1..=6).contains(&dice[1]));
            assert_eq!(*damage, (dice[0] + dice[1]) as i32);
            assert!((2..=12).contains(damage));
        } else {
            panic!("expected DiceRoll");
        }

        // Exactly one fighter took the volley
        let (h0, h1) = sim.health();
        assert!(h0 == ROUND_HEALTH || h1 == ROUND_HEALTH);
        assert!(h0 < ROUND_HEALTH || h1 < ROUND_HEALTH);
    }

    #[test]
    fn test_exchange_alternates_attackers() {
        let mut sim = BattleSim::new(pair(), BattleTiming::instant()).unwrap();
        let mut rng = DeterministicRng::new(3);

        sim.step(&mut rng); // coin flip
        sim.step(&mut rng); // volley

        let mut last_attacker = None;
        for _ in 0..6 {
            let step = sim.step(&mut rng);
            if step.done {
                break;
            }
            if let BattleEvent::HitRoll { attacker, .. } = step.events[0] {
                if let Some(prev) = last_attacker {
                    assert_ne!(attacker, prev, "attackers must alternate");
                }
                last_attacker = Some(attacker);
            }
        }
    }

    #[test]
    fn test_battle_always_terminates_with_one_survivor() {
        for seed in 0..50 {
            let mut rng = DeterministicRng::new(seed);
            let (winner, loser, events) = resolve_battle(pair(), &mut rng).unwrap();

            assert!(winner.health > 0);
            assert_eq!(loser.health, 0);
            assert_eq!(winner.wins, 1);
            assert_eq!(loser.losses, 1);
            assert!(matches!(
                events.last(),
                Some(BattleEvent::Finished { .. })
            ));
        }
    }

    #[test]
    fn test_battle_deterministic_per_seed() {
        let mut rng1 = DeterministicRng::new(314);
        let mut rng2 = DeterministicRng::new(314);

        let (w1, _, e1) = resolve_battle(pair(), &mut rng1).unwrap();
        let (w2, _, e2) = resolve_battle(pair(), &mut rng2).unwrap();

        assert_eq!(w1.id, w2.id);
        assert_eq!(e1.len(), e2.len());
    }

    #[test]
    fn test_step_after_done_is_noop() {
        let mut rng = DeterministicRng::new(1);
        let mut sim = BattleSim::new(pair(), BattleTiming::instant()).unwrap();

        loop {
            if sim.step(&mut rng).done {
                break;
            }
        }

        let extra = sim.step(&mut rng);
        assert!(extra.done);
        assert!(extra.events.is_empty());
        assert!(sim.winner().is_some());
    }
}
