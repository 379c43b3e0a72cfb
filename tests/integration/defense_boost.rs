//! Defense-boost arming, consumption, and effect, observed on the wire.
//!
//! # Scenarios
//! 1. An unarmed round computes against the bare defense stat.
//! 2. Arming leaves the counter untouched; the next incoming attack
//!    consumes it and multiplies the defense stat by 1.5 for that round
//!    exactly.
//! 3. The counter decrements once per consumed boost.

use duel_core::catalogue::{Catalogue, CombatantTemplate};
use duel_core::types::ElementType;
use duel_protocol::message::{CalculationReport, Message, StatBoosts, kind};
use duel_test_utils::RawPeer;
use peer::engine::{Engine, EngineConfig};
use peer::session::{Phase, Role};
use peer::socket::AddressingMode;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Harness helpers
// ---------------------------------------------------------------------------

fn test_catalogue() -> Arc<Catalogue> {
    let mut catalogue = Catalogue::default();
    catalogue.insert(
        "blaze",
        CombatantTemplate {
            display_name: "Blaze".to_owned(),
            max_hp: 100,
            physical_attack: 80,
            special_attack: 100,
            physical_defense: 60,
            special_defense: 30,
            primary_type: ElementType::Fire,
            secondary_type: None,
            type_multipliers: HashMap::new(),
            moves: vec!["ember".to_owned()],
        },
    );
    catalogue.insert(
        "aqua",
        CombatantTemplate {
            display_name: "Aqua".to_owned(),
            max_hp: 40,
            physical_attack: 40,
            special_attack: 30,
            physical_defense: 20,
            special_defense: 10,
            primary_type: ElementType::Water,
            secondary_type: None,
            type_multipliers: HashMap::from([(ElementType::Fire, 2.0)]),
            moves: vec!["water gun".to_owned()],
        },
    );
    Arc::new(catalogue)
}

struct Harness {
    engine: Engine,
    peer: RawPeer,
    engine_addr: SocketAddr,
    /// Raw peer's next outbound sequence number.
    next_seq: u64,
}

impl Harness {
    async fn send(&mut self, message: &Message) {
        self.peer
            .send_message(message, Some(self.next_seq), self.engine_addr)
            .await
            .unwrap();
        self.next_seq += 1;
    }

    async fn recv(&self, message_type: &str) -> duel_protocol::codec::RawMessage {
        self.peer
            .recv_type(message_type, Duration::from_secs(2), true)
            .await
            .unwrap_or_else(|| panic!("expected {message_type}"))
    }
}

/// The engine plays the joiner (Aqua); the raw peer plays the host
/// (Blaze).  Completes handshake + setup and waits out the engine's
/// BATTLE_SETUP.
async fn start_defender() -> Harness {
    let peer = RawPeer::bind_local().await.unwrap();
    let engine = Engine::start(
        EngineConfig {
            role: Role::Joiner,
            display_name: "joiner".to_owned(),
            combatant: Some("aqua".to_owned()),
            bind: "127.0.0.1:0".parse().unwrap(),
            remote: Some(peer.local_addr()),
            mode: AddressingMode::Direct,
            seed: None,
            auto_accept: true,
        },
        test_catalogue(),
    )
    .await
    .unwrap();
    let engine_addr = engine.local_addr();
    let mut harness = Harness {
        engine,
        peer,
        engine_addr,
        next_seq: 1,
    };

    // the joiner dials us; answer the handshake while the send waits
    let start = harness.engine.start_handshake();
    let accept = async {
        let request = harness
            .peer
            .recv_type(kind::HANDSHAKE_REQUEST, Duration::from_secs(2), true)
            .await
            .expect("handshake request");
        assert_eq!(request.sequence_number(), Some(1));
    };
    let (started, ()) = tokio::join!(start, accept);
    started.unwrap();

    harness.send(&Message::HandshakeResponse { seed: 7 }).await;
    let setup = harness.recv(kind::BATTLE_SETUP).await;
    assert_eq!(setup.get("pokemon_name"), Some("aqua"));
    assert_eq!(
        setup.get("stat_boosts"),
        Some(r#"{"attack":5,"defense":5}"#)
    );

    harness
        .send(&Message::BattleSetup {
            communication_mode: "direct".to_owned(),
            pokemon_name: "blaze".to_owned(),
            stat_boosts: StatBoosts {
                attack: 5,
                defense: 5,
            },
        })
        .await;

    // battle is live once the engine processes our setup
    for _ in 0..200 {
        if harness.engine.battle_view().await.phase == Phase::WaitingForMove {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
        harness.engine.battle_view().await.phase,
        Phase::WaitingForMove
    );
    harness
}

/// Drive one incoming attack round and return the engine's report.
async fn incoming_attack(harness: &mut Harness) -> CalculationReport {
    harness
        .send(&Message::AttackAnnounce {
            move_name: "ember".to_owned(),
        })
        .await;
    harness.recv(kind::DEFENSE_ANNOUNCE).await;
    let raw = harness.recv(kind::CALCULATION_REPORT).await;
    let Message::CalculationReport(report) = Message::from_raw(&raw).unwrap() else {
        panic!("expected report");
    };
    // confirm the defender's numbers so the round commits as computed
    harness.send(&Message::CalculationConfirm).await;
    report
}

/// The engine holds the turn after a committed round; play it back to the
/// raw peer so the next incoming attack is legal.
async fn return_turn(harness: &mut Harness) {
    for _ in 0..200 {
        let view = harness.engine.battle_view().await;
        if view.phase == Phase::WaitingForMove && view.my_turn {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let attack = harness.engine.attack("water gun", false);
    let drive = async {
        harness
            .peer
            .recv_type(kind::ATTACK_ANNOUNCE, Duration::from_secs(2), true)
            .await
            .expect("announce");
    };
    let (sent, ()) = tokio::join!(attack, drive);
    sent.unwrap();

    harness.send(&Message::DefenseAnnounce).await;
    let raw = harness.recv(kind::CALCULATION_REPORT).await;
    let Message::CalculationReport(report) = Message::from_raw(&raw).unwrap() else {
        panic!("expected report");
    };
    // echo the attacker's numbers back so the round agrees
    harness
        .send(&Message::CalculationReport(report))
        .await;
    harness.recv(kind::CALCULATION_CONFIRM).await;
}

// ---------------------------------------------------------------------------
// Test
// ---------------------------------------------------------------------------

#[tokio::test]
async fn defense_boost_arms_consumes_and_scales_exactly_one_round() {
    let mut harness = start_defender().await;

    // round 1, unarmed: (100 * 2.0) / 10 = 20
    let report = incoming_attack(&mut harness).await;
    assert_eq!(report.damage_dealt, 20);
    assert_eq!(report.defender_hp_remaining, 20);
    let view = harness.engine.battle_view().await;
    assert_eq!(view.defense_boosts_remaining, 5);
    assert_eq!(view.my_hp, Some(20));

    return_turn(&mut harness).await;

    // arm: counter untouched until the attack lands
    harness.engine.arm_defense().await.unwrap();
    assert_eq!(
        harness.engine.battle_view().await.defense_boosts_remaining,
        5
    );

    // round 2, armed: (100 * 2.0) / (10 * 1.5) = 13.33 → 13
    let report = incoming_attack(&mut harness).await;
    assert_eq!(report.damage_dealt, 13);
    assert_eq!(report.defender_hp_remaining, 7);
    let view = harness.engine.battle_view().await;
    assert_eq!(view.defense_boosts_remaining, 4);
    assert_eq!(view.my_hp, Some(7));

    return_turn(&mut harness).await;

    // round 3, unarmed again: the boost was exactly one round
    let report = incoming_attack(&mut harness).await;
    assert_eq!(report.damage_dealt, 20);
    assert_eq!(
        harness.engine.battle_view().await.defense_boosts_remaining,
        4
    );
}
