//! Session state: role, phase, turn ownership, boost accounting, and the
//! pending-attack slot.
//!
//! All mutation happens on the dispatcher or through the driver intent
//! API, both behind the engine's single state mutex.

use duel_core::boosts::BoostLedger;
use duel_core::combatant::{Combatant, Move};
use duel_protocol::message::StatBoosts;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fmt;
use std::net::SocketAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Joiner,
    Spectator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Handshaking,
    Setup,
    WaitingForMove,
    ProcessingTurn,
    Terminated,
}

/// Which side of this session launched the pending attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Mine,
    Theirs,
}

/// The defender-side (and attacker-side) memory of an in-flight attack
/// round, held between ATTACK_ANNOUNCE and round commit.
#[derive(Debug, Clone)]
pub struct PendingAttack {
    pub attacking_side: Side,
    pub mv: Move,
    pub damage: u32,
    pub defender_hp_remaining: u32,
    pub status_message: String,
}

/// Why the engine refused a driver intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotYourTurn,
    WrongPhase,
    NoBoostsRemaining,
    NoOpponentYet,
    SessionTerminated,
    RoleForbidden,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Rejection::NotYourTurn => "not-your-turn",
            Rejection::WrongPhase => "wrong-phase",
            Rejection::NoBoostsRemaining => "no-boosts-remaining",
            Rejection::NoOpponentYet => "no-opponent-yet",
            Rejection::SessionTerminated => "session-terminated",
            Rejection::RoleForbidden => "role-forbidden",
        };
        f.write_str(reason)
    }
}

pub struct SessionState {
    pub role: Role,
    pub phase: Phase,
    pub is_my_turn: bool,
    pub display_name: String,
    pub communication_mode: String,
    /// Lowercase catalogue key this side announced (or will announce) in
    /// BATTLE_SETUP.
    pub my_key: Option<String>,
    pub seed: Option<u64>,
    /// Shared generator, seeded identically on both peers before any
    /// damage is computed.  Reserved for future randomized factors.
    pub rng: Option<StdRng>,
    pub remote: Option<SocketAddr>,
    /// Host only: an attached read-only observer.
    pub spectator: Option<SocketAddr>,
    /// Host only: a joiner awaiting interactive approval.
    pub pending_join: Option<SocketAddr>,
    pub me: Option<Combatant>,
    pub opponent: Option<Combatant>,
    pub my_boosts: BoostLedger,
    /// Best-effort view of the opponent's remaining boosts, from their
    /// BATTLE_SETUP.
    pub opponent_boosts: Option<StatBoosts>,
    pub pending: Option<PendingAttack>,
    /// Guards against emitting BATTLE_SETUP twice.
    pub setup_sent: bool,
}

impl SessionState {
    pub fn new(
        role: Role,
        display_name: String,
        communication_mode: String,
        me: Option<Combatant>,
        my_key: Option<String>,
        remote: Option<SocketAddr>,
    ) -> Self {
        SessionState {
            role,
            phase: Phase::Handshaking,
            is_my_turn: false,
            display_name,
            communication_mode,
            my_key,
            seed: None,
            rng: None,
            remote,
            spectator: None,
            pending_join: None,
            me,
            opponent: None,
            my_boosts: BoostLedger::new(),
            opponent_boosts: None,
            pending: None,
            setup_sent: false,
        }
    }

    /// Seed the shared generator; must happen before any damage math.
    pub fn seed_rng(&mut self, seed: u64) {
        self.seed = Some(seed);
        self.rng = Some(StdRng::seed_from_u64(seed));
    }

    pub fn validate_attack(&self, use_attack_boost: bool) -> Result<(), Rejection> {
        if self.phase == Phase::Terminated {
            return Err(Rejection::SessionTerminated);
        }
        if self.role == Role::Spectator {
            return Err(Rejection::RoleForbidden);
        }
        if self.opponent.is_none() {
            return Err(Rejection::NoOpponentYet);
        }
        if self.phase != Phase::WaitingForMove {
            return Err(Rejection::WrongPhase);
        }
        if !self.is_my_turn {
            return Err(Rejection::NotYourTurn);
        }
        if use_attack_boost && self.my_boosts.attack_remaining() == 0 {
            return Err(Rejection::NoBoostsRemaining);
        }
        Ok(())
    }

    pub fn validate_arm_defense(&self) -> Result<(), Rejection> {
        if self.phase == Phase::Terminated {
            return Err(Rejection::SessionTerminated);
        }
        if self.role == Role::Spectator {
            return Err(Rejection::RoleForbidden);
        }
        if self.opponent.is_none() {
            return Err(Rejection::NoOpponentYet);
        }
        if self.phase != Phase::WaitingForMove {
            return Err(Rejection::WrongPhase);
        }
        if self.my_boosts.defense_remaining() == 0 {
            return Err(Rejection::NoBoostsRemaining);
        }
        Ok(())
    }

    pub fn validate_chat(&self) -> Result<(), Rejection> {
        if self.phase == Phase::Terminated {
            return Err(Rejection::SessionTerminated);
        }
        if self.remote.is_none() {
            return Err(Rejection::NoOpponentYet);
        }
        Ok(())
    }

    /// Round teardown when the game continues: flip turn ownership, clear
    /// the pending slot and the per-turn boost flags, return to waiting.
    pub fn end_round(&mut self) {
        self.is_my_turn = !self.is_my_turn;
        self.phase = Phase::WaitingForMove;
        self.pending = None;
        self.my_boosts.clear_turn_flags();
    }

    pub fn terminate(&mut self) {
        self.phase = Phase::Terminated;
        self.pending = None;
    }

    /// Both BATTLE_SETUPs are in: enter the battle.  Turn ownership starts
    /// with the host.
    pub fn enter_battle(&mut self) {
        self.phase = Phase::WaitingForMove;
        self.is_my_turn = self.role == Role::Host;
    }
}
