//! Reliable-channel behavior against a raw peer that misbehaves on purpose.
//!
//! # Scenarios
//! 1. Lost ACK: the peer withholds the ACK for an ATTACK_ANNOUNCE; the
//!    engine retransmits the identical datagram at the timeout and accepts
//!    the late ACK without burning a sequence number.
//! 2. Duplicate ATTACK_ANNOUNCE: both copies are acked, the round runs
//!    exactly once.
//! 3. Outbound sequence numbers increase strictly across the session.

use duel_core::catalogue::{Catalogue, CombatantTemplate};
use duel_core::types::ElementType;
use duel_protocol::codec::RawMessage;
use duel_protocol::message::{CalculationReport, Message, StatBoosts, kind};
use duel_test_utils::RawPeer;
use peer::engine::{Engine, EngineConfig};
use peer::session::Role;
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

async fn start_host() -> Engine {
    Engine::start(
        EngineConfig {
            role: Role::Host,
            display_name: "host".to_owned(),
            combatant: Some("blaze".to_owned()),
            bind: "127.0.0.1:0".parse().unwrap(),
            remote: None,
            mode: AddressingMode::Direct,
            seed: Some(777),
            auto_accept: true,
        },
        test_catalogue(),
    )
    .await
    .unwrap()
}

/// Raw joiner-side handshake and setup, acking everything.  Uses raw
/// sequence numbers 1 and 2; the engine's own messages start at 1 too.
async fn raw_handshake_and_setup(peer: &RawPeer, host: SocketAddr) {
    peer.send_message(&Message::HandshakeRequest, Some(1), host)
        .await
        .unwrap();
    let response = peer
        .recv_type(kind::HANDSHAKE_RESPONSE, Duration::from_secs(2), true)
        .await
        .expect("handshake response");
    assert_eq!(response.get("seed"), Some("777"));

    peer.send_message(
        &Message::BattleSetup {
            communication_mode: "direct".to_owned(),
            pokemon_name: "aqua".to_owned(),
            stat_boosts: StatBoosts {
                attack: 5,
                defense: 5,
            },
        },
        Some(2),
        host,
    )
    .await
    .unwrap();
    let setup = peer
        .recv_type(kind::BATTLE_SETUP, Duration::from_secs(2), true)
        .await
        .expect("host setup");
    assert_eq!(setup.get("pokemon_name"), Some("blaze"));
}

fn defender_report() -> CalculationReport {
    // matches the host's own computation: (100 * 2.0) / 10 = 20
    CalculationReport {
        attacker: "Blaze".to_owned(),
        move_used: "ember".to_owned(),
        remaining_health: 100,
        damage_dealt: 20,
        defender_hp_remaining: 20,
        status_message: "Blaze used ember! It was super effective!".to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Test: lost ACK forces a retransmit of the identical datagram
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lost_ack_triggers_identical_retransmit_and_no_sequence_gap() {
    let host = start_host().await;
    let peer = RawPeer::bind_local().await.unwrap();
    let host_addr = host.local_addr();
    raw_handshake_and_setup(&peer, host_addr).await;

    let attack = {
        let host = Arc::new(host);
        let task_host = Arc::clone(&host);
        let task = tokio::spawn(async move { task_host.attack("ember", false).await });
        (host, task)
    };
    let (host, attack_task) = attack;

    // first copy arrives; withhold the ACK
    let (first, _) = peer
        .recv_raw(Duration::from_secs(2))
        .await
        .expect("announce");
    assert_eq!(first.message_type(), Some(kind::ATTACK_ANNOUNCE));
    let sequence = first.sequence_number().expect("sequenced");

    // the retry shows up around the 500 ms mark, bit-identical
    let (second, _) = peer
        .recv_raw(Duration::from_secs(2))
        .await
        .expect("retransmit");
    assert_eq!(second, first);

    // late ACK: the send resolves and the sequence is not burned
    peer.ack(sequence, host_addr).await.unwrap();
    attack_task.await.unwrap().unwrap();

    // finish the round; the host's next message uses sequence + 1
    peer.send_message(&Message::DefenseAnnounce, Some(3), host_addr)
        .await
        .unwrap();
    let report = peer
        .recv_type(kind::CALCULATION_REPORT, Duration::from_secs(2), true)
        .await
        .expect("host report");
    assert_eq!(report.sequence_number(), Some(sequence + 1));

    drop(host);
}

// ---------------------------------------------------------------------------
// Test: duplicated ATTACK_ANNOUNCE is acked twice, dispatched once
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_attack_announce_is_acked_twice_but_runs_once() {
    let host = start_host().await;
    let peer = RawPeer::bind_local().await.unwrap();
    let host_addr = host.local_addr();
    raw_handshake_and_setup(&peer, host_addr).await;

    // play one round so the turn passes to the raw peer
    host.attack("ember", false).await.unwrap();
    peer.recv_type(kind::ATTACK_ANNOUNCE, Duration::from_secs(2), true)
        .await
        .expect("announce");
    peer.send_message(&Message::DefenseAnnounce, Some(3), host_addr)
        .await
        .unwrap();
    peer.recv_type(kind::CALCULATION_REPORT, Duration::from_secs(2), true)
        .await
        .expect("host report");
    peer.send_message(
        &Message::CalculationReport(defender_report()),
        Some(4),
        host_addr,
    )
    .await
    .unwrap();
    peer.recv_type(kind::CALCULATION_CONFIRM, Duration::from_secs(2), true)
        .await
        .expect("confirm");

    // now the raw peer attacks — and the wire duplicates the datagram
    let mut announce = Message::AttackAnnounce {
        move_name: "water gun".to_owned(),
    }
    .to_raw();
    announce.set("sequence_number", "5");
    let bytes = announce.encode().unwrap();
    peer.send_bytes(&bytes, host_addr).await.unwrap();
    peer.send_bytes(&bytes, host_addr).await.unwrap();

    // both copies acked (the duplicate after re-ack is dropped pre-dispatch)
    let mut acks = 0;
    let mut defenses: Vec<RawMessage> = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        let Some((raw, _)) = peer.recv_raw(Duration::from_millis(200)).await else {
            continue;
        };
        if raw.is_ack() {
            assert_eq!(raw.ack_number(), Some(5));
            acks += 1;
        } else {
            if let Some(sequence) = raw.sequence_number() {
                peer.ack(sequence, host_addr).await.unwrap();
            }
            if raw.message_type() == Some(kind::DEFENSE_ANNOUNCE) {
                defenses.push(raw);
            }
        }
        if acks >= 2 && !defenses.is_empty() {
            break;
        }
    }
    assert_eq!(acks, 2, "every copy gets an ACK");
    assert_eq!(defenses.len(), 1, "the round runs exactly once");

    drop(host);
}

// ---------------------------------------------------------------------------
// Test: outbound sequence numbers increase strictly across the session
// ---------------------------------------------------------------------------

#[tokio::test]
async fn engine_sequences_are_strictly_increasing() {
    let host = start_host().await;
    let peer = RawPeer::bind_local().await.unwrap();
    let host_addr = host.local_addr();

    peer.send_message(&Message::HandshakeRequest, Some(1), host_addr)
        .await
        .unwrap();
    let response = peer
        .recv_type(kind::HANDSHAKE_RESPONSE, Duration::from_secs(2), true)
        .await
        .unwrap();
    assert_eq!(response.sequence_number(), Some(1));

    peer.send_message(
        &Message::BattleSetup {
            communication_mode: "direct".to_owned(),
            pokemon_name: "aqua".to_owned(),
            stat_boosts: StatBoosts {
                attack: 5,
                defense: 5,
            },
        },
        Some(2),
        host_addr,
    )
    .await
    .unwrap();
    let setup = peer
        .recv_type(kind::BATTLE_SETUP, Duration::from_secs(2), true)
        .await
        .unwrap();
    assert_eq!(setup.sequence_number(), Some(2));

    host.attack("ember", false).await.unwrap();
    let announce = peer
        .recv_type(kind::ATTACK_ANNOUNCE, Duration::from_secs(2), true)
        .await
        .unwrap();
    assert_eq!(announce.sequence_number(), Some(3));

    peer.send_message(&Message::DefenseAnnounce, Some(3), host_addr)
        .await
        .unwrap();
    let report = peer
        .recv_type(kind::CALCULATION_REPORT, Duration::from_secs(2), true)
        .await
        .unwrap();
    assert_eq!(report.sequence_number(), Some(4));

    peer.send_message(
        &Message::CalculationReport(defender_report()),
        Some(4),
        host_addr,
    )
    .await
    .unwrap();
    let confirm = peer
        .recv_type(kind::CALCULATION_CONFIRM, Duration::from_secs(2), true)
        .await
        .unwrap();
    assert_eq!(confirm.sequence_number(), Some(5));

    drop(host);
}
