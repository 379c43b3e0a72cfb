//! The shared damage formula.
//!
//! Pure and deterministic: both peers evaluate this with their own local
//! knowledge and reconcile the results over the wire.  The shared seeded
//! generator is reserved for future randomized factors (criticals,
//! variance) and is deliberately not consulted here — but both sides seed
//! it identically before any damage is computed so a later revision stays
//! deterministic.

use crate::combatant::{Combatant, Move};
use crate::types::Category;

/// Stat multiplier applied by one boost for one round.
pub const BOOST_MULTIPLIER: f64 = 1.5;

/// Per-round (attacker, defender) snapshot pair; does not outlive the round.
#[derive(Debug)]
pub struct BattleState<'a> {
    pub attacker: &'a Combatant,
    pub defender: &'a Combatant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DamageOutcome {
    pub damage: u32,
    pub defender_hp_remaining: u32,
    pub status_message: String,
}

/// Evaluate the formula for one attack.
///
/// The move's element picks the stat pair through the category partition;
/// boosts scale their stat by 1.5; defense is clamped to at least 1; the
/// raw quotient is rounded half-to-even; any positive-effectiveness hit
/// deals at least 1 damage.
pub fn compute_damage(
    state: &BattleState<'_>,
    mv: &Move,
    attack_boosted: bool,
    defense_boosted: bool,
) -> DamageOutcome {
    let (atk, def) = match mv.category() {
        Category::Physical => (
            state.attacker.physical_attack,
            state.defender.physical_defense,
        ),
        Category::Special => (
            state.attacker.special_attack,
            state.defender.special_defense,
        ),
    };
    let mut atk = f64::from(atk);
    if attack_boosted {
        atk *= BOOST_MULTIPLIER;
    }
    let mut def = f64::from(def);
    if defense_boosted {
        def *= BOOST_MULTIPLIER;
    }
    if def <= 0.0 {
        def = 1.0;
    }
    let mult = state.defender.multiplier_against(mv.element);
    let raw = atk * mult / def;
    let rounded = raw.round_ties_even();
    let damage = if rounded < 1.0 && mult > 0.0 {
        1
    } else {
        rounded as u32
    };
    DamageOutcome {
        damage,
        defender_hp_remaining: state.defender.current_hp.saturating_sub(damage),
        status_message: status_line(&state.attacker.name, &mv.name, mult),
    }
}

/// The narrative line derived from the effectiveness multiplier.
pub fn status_line(attacker: &str, move_name: &str, mult: f64) -> String {
    let base = format!("{attacker} used {move_name}!");
    if mult == 0.0 {
        format!("{base} It had no effect...")
    } else if mult < 1.0 {
        format!("{base} It's not very effective...")
    } else if mult > 1.0 {
        format!("{base} It was super effective!")
    } else {
        base
    }
}
