//! Engine events surfaced to the driver over a broadcast channel.

use duel_protocol::message::{CalculationReport, ChatContent};
use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Host only, when auto-accept is off: a joiner wants in.
    JoinRequested { from: SocketAddr },
    SpectatorJoined { from: SocketAddr },
    /// The shared seed is agreed; both generators are initialized.
    HandshakeComplete { seed: u64 },
    /// Both BATTLE_SETUPs exchanged; the battle is live.
    BattleStarted { opponent: String, my_turn: bool },
    /// An ATTACK_ANNOUNCE arrived; this side is the defender this round.
    AttackIncoming { attacker: String, move_name: String },
    /// The peer's independent calculation arrived.
    ReportReceived { report: CalculationReport },
    /// The round committed.  `reconciled` is set when the attacker's
    /// values overrode a divergent local computation.
    RoundResolved {
        status_message: String,
        damage: u32,
        defender_hp_remaining: u32,
        attacker_is_me: bool,
        reconciled: bool,
    },
    TurnChanged { my_turn: bool },
    ChatReceived {
        sender: String,
        content: ChatContent,
    },
    /// A spawned reliable send exhausted its retries.
    TransportFailure { context: &'static str },
    GameOver { winner: String, loser: String },
}
