//! Per-side boost accounting.
//!
//! Each side starts a session with five attack boosts and five defense
//! boosts.  Attack boosts are consumed when the attack is issued; defense
//! boosts are *armed* first and consumed only when the next incoming attack
//! actually arrives.  Counters never go back up.

pub const INITIAL_BOOSTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no boosts remaining")]
pub struct BoostsExhausted;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoostLedger {
    attack_remaining: u32,
    defense_remaining: u32,
    attack_applied: bool,
    defense_armed: bool,
}

impl Default for BoostLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl BoostLedger {
    pub fn new() -> Self {
        BoostLedger {
            attack_remaining: INITIAL_BOOSTS,
            defense_remaining: INITIAL_BOOSTS,
            attack_applied: false,
            defense_armed: false,
        }
    }

    pub fn attack_remaining(&self) -> u32 {
        self.attack_remaining
    }

    pub fn defense_remaining(&self) -> u32 {
        self.defense_remaining
    }

    /// Whether this turn's outgoing attack is boosted.
    pub fn attack_applied(&self) -> bool {
        self.attack_applied
    }

    /// Consume one attack boost for the attack being issued right now.
    /// The applied flag must be set before the damage computation runs.
    pub fn use_attack_boost(&mut self) -> Result<(), BoostsExhausted> {
        if self.attack_remaining == 0 {
            return Err(BoostsExhausted);
        }
        self.attack_remaining -= 1;
        self.attack_applied = true;
        Ok(())
    }

    /// Arm a defense boost for the next incoming attack.  The counter is
    /// untouched until the attack arrives; arming twice is idempotent.
    pub fn arm_defense(&mut self) -> Result<(), BoostsExhausted> {
        if self.defense_remaining == 0 {
            return Err(BoostsExhausted);
        }
        self.defense_armed = true;
        Ok(())
    }

    /// Called when an incoming attack arrives.  Consumes the armed boost,
    /// if any, and reports whether the defense is boosted this round.
    pub fn consume_armed_defense(&mut self) -> bool {
        if !self.defense_armed {
            return false;
        }
        self.defense_armed = false;
        // arm_defense refuses to arm at zero, so the counter is positive here
        self.defense_remaining -= 1;
        true
    }

    /// Round teardown: the applied flag is per-turn, armed state survives
    /// until consumed.
    pub fn clear_turn_flags(&mut self) {
        self.attack_applied = false;
    }
}
