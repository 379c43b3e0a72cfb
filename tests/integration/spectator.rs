//! Spectator attach, observation, and restrictions.
//!
//! # Scenarios
//! 1. A spectator handshakes with the host mid-session and is
//!    auto-accepted with the same seed.
//! 2. The host forwards its calculation reports; the spectator observes
//!    each round.
//! 3. Attack/defense intents from the spectator are rejected by the
//!    driver interface; chat is allowed.
//! 4. GAME_OVER reaches the spectator and terminates it.

use duel_core::catalogue::{Catalogue, CombatantTemplate};
use duel_core::types::ElementType;
use peer::engine::{Engine, EngineConfig, IntentError};
use peer::events::EngineEvent;
use peer::session::{Phase, Rejection, Role};
use peer::socket::AddressingMode;
use duel_protocol::message::ChatContent;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

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

async fn wait_for_phase(engine: &Engine, phase: Phase) {
    for _ in 0..500 {
        if engine.battle_view().await.phase == phase {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {phase:?}");
}

async fn wait_for_turn(engine: &Engine, my_turn: bool) {
    for _ in 0..500 {
        let view = engine.battle_view().await;
        if view.phase == Phase::WaitingForMove && view.my_turn == my_turn {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for turn flip");
}

async fn expect_event<F, T>(rx: &mut broadcast::Receiver<EngineEvent>, mut pick: F) -> T
where
    F: FnMut(EngineEvent) -> Option<T>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Ok(event)) => {
                if let Some(value) = pick(event) {
                    return value;
                }
            }
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(broadcast::error::RecvError::Closed)) => panic!("event stream closed"),
            Err(_) => panic!("expected event within 5s"),
        }
    }
}

// ---------------------------------------------------------------------------
// Test
// ---------------------------------------------------------------------------

#[tokio::test]
async fn spectator_observes_but_cannot_fight() {
    let catalogue = test_catalogue();
    let host = Engine::start(
        EngineConfig {
            role: Role::Host,
            display_name: "host".to_owned(),
            combatant: Some("blaze".to_owned()),
            bind: "127.0.0.1:0".parse().unwrap(),
            remote: None,
            mode: AddressingMode::Direct,
            seed: Some(4242),
            auto_accept: true,
        },
        catalogue.clone(),
    )
    .await
    .unwrap();
    let joiner = Engine::start(
        EngineConfig {
            role: Role::Joiner,
            display_name: "joiner".to_owned(),
            combatant: Some("aqua".to_owned()),
            bind: "127.0.0.1:0".parse().unwrap(),
            remote: Some(host.local_addr()),
            mode: AddressingMode::Direct,
            seed: None,
            auto_accept: true,
        },
        catalogue.clone(),
    )
    .await
    .unwrap();
    joiner.start_handshake().await.unwrap();
    wait_for_turn(&host, true).await;
    wait_for_turn(&joiner, false).await;

    let mut host_events = host.subscribe();

    // spectator attaches mid-session
    let spectator = Engine::start(
        EngineConfig {
            role: Role::Spectator,
            display_name: "railbird".to_owned(),
            combatant: None,
            bind: "127.0.0.1:0".parse().unwrap(),
            remote: Some(host.local_addr()),
            mode: AddressingMode::Direct,
            seed: None,
            auto_accept: true,
        },
        catalogue,
    )
    .await
    .unwrap();
    let mut spectator_events = spectator.subscribe();
    spectator.start_handshake().await.unwrap();
    wait_for_phase(&spectator, Phase::WaitingForMove).await;

    expect_event(&mut host_events, |event| match event {
        EngineEvent::SpectatorJoined { from } => Some(from),
        _ => None,
    })
    .await;
    // the seed is stored (ignored for game logic) from HANDSHAKE_RESPONSE
    let seed = expect_event(&mut spectator_events, |event| match event {
        EngineEvent::HandshakeComplete { seed } => Some(seed),
        _ => None,
    })
    .await;
    assert_eq!(seed, 4242);

    // the driver interface refuses battle intents from a spectator
    assert!(matches!(
        spectator.attack("ember", false).await.unwrap_err(),
        IntentError::Rejected(Rejection::RoleForbidden)
    ));
    assert!(matches!(
        spectator.arm_defense().await.unwrap_err(),
        IntentError::Rejected(Rejection::RoleForbidden)
    ));

    // chat is fine, and lands at the host
    spectator
        .send_chat(ChatContent::Text("go Aqua!".to_owned()))
        .await
        .unwrap();
    let (sender, text) = expect_event(&mut host_events, |event| match event {
        EngineEvent::ChatReceived {
            sender,
            content: ChatContent::Text(text),
        } => Some((sender, text)),
        _ => None,
    })
    .await;
    assert_eq!(sender, "railbird");
    assert_eq!(text, "go Aqua!");

    // a round resolves and the host forwards its report
    host.attack("ember", false).await.unwrap();
    let report = expect_event(&mut spectator_events, |event| match event {
        EngineEvent::ReportReceived { report } => Some(report),
        _ => None,
    })
    .await;
    assert_eq!(report.attacker, "Blaze");
    assert_eq!(report.damage_dealt, 20);

    // finish the game: joiner replies, host lands the KO
    wait_for_turn(&joiner, true).await;
    joiner.attack("water gun", false).await.unwrap();
    wait_for_turn(&host, true).await;
    host.attack("ember", false).await.unwrap();

    let (winner, loser) = expect_event(&mut spectator_events, |event| match event {
        EngineEvent::GameOver { winner, loser } => Some((winner, loser)),
        _ => None,
    })
    .await;
    assert_eq!(winner, "Blaze");
    assert_eq!(loser, "Aqua");
    wait_for_phase(&spectator, Phase::Terminated).await;
    tokio::time::timeout(Duration::from_secs(2), spectator.wait_shutdown())
        .await
        .expect("spectator should shut down on GAME_OVER");
}
