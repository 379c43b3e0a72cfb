//! Inbound message dispatch.
//!
//! Maps each received message kind, in the current session phase, to state
//! updates and outbound responses.  This layer never propagates errors:
//! malformed or out-of-place traffic is logged and dropped, and the
//! session continues.
//!
//! Responses that need ACK round-tripping are emitted on freshly spawned
//! send tasks so the dispatch path never blocks on its own retries.
//! Responses whose relative order matters (DEFENSE_ANNOUNCE before the
//! defender's CALCULATION_REPORT, a confirm/resolution before GAME_OVER)
//! share one spawned task and go out back to back.

use crate::channel::ReliableChannel;
use crate::events::EngineEvent;
use crate::queue::{Arrival, ArrivalQueue};
use crate::session::{Phase, PendingAttack, Role, SessionState, Side};
use duel_core::catalogue::Catalogue;
use duel_core::combatant::Move;
use duel_core::damage::{BattleState, compute_damage};
use duel_protocol::message::{
    CalculationReport, ChatContent, Message, ResolutionRequest, StatBoosts,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast, watch};
use tracing::{debug, info, trace, warn};

pub struct Dispatcher {
    state: Arc<Mutex<SessionState>>,
    channel: Arc<ReliableChannel>,
    catalogue: Arc<Catalogue>,
    events: broadcast::Sender<EngineEvent>,
    shutdown: watch::Sender<bool>,
    auto_accept: bool,
    /// The seed this host hands out in HANDSHAKE_RESPONSE.
    host_seed: u64,
}

pub async fn run_dispatch_loop(
    dispatcher: Arc<Dispatcher>,
    queue: Arc<ArrivalQueue>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            arrival = queue.pop() => dispatcher.handle(arrival).await,
        }
    }
    debug!("dispatch loop stopped");
}

impl Dispatcher {
    pub fn new(
        state: Arc<Mutex<SessionState>>,
        channel: Arc<ReliableChannel>,
        catalogue: Arc<Catalogue>,
        events: broadcast::Sender<EngineEvent>,
        shutdown: watch::Sender<bool>,
        auto_accept: bool,
        host_seed: u64,
    ) -> Self {
        Dispatcher {
            state,
            channel,
            catalogue,
            events,
            shutdown,
            auto_accept,
            host_seed,
        }
    }

    pub async fn handle(&self, arrival: Arrival) {
        let Arrival { from, msg: raw } = arrival;
        if raw.is_ack() {
            // a live ACK is consumed by the waiting send; anything that
            // reaches us here is stale
            trace!(%from, ack = ?raw.ack_number(), "stray ACK discarded");
            return;
        }
        let message = match Message::from_raw(&raw) {
            Ok(message) => message,
            Err(error) => {
                warn!(%from, %error, "malformed message dropped");
                return;
            }
        };

        let mut state = self.state.lock().await;
        if state.phase == Phase::Terminated {
            // a fainted defender parks here and keeps acking until the
            // attacker's GAME_OVER arrives; everything else is dropped
            if let Message::GameOver { winner, loser } = message {
                self.on_game_over(&mut state, winner, loser);
            } else {
                trace!(%from, kind = message.kind(), "session terminated, inbound dropped");
            }
            return;
        }

        // Only a handshake may come from an unknown address (a joiner or
        // spectator dialing in, or the host answering a broadcast dial).
        let known = state.remote == Some(from) || state.spectator == Some(from);
        let adoptable = matches!(message, Message::HandshakeRequest)
            || (matches!(message, Message::HandshakeResponse { .. })
                && state.phase == Phase::Handshaking);
        if !known && !adoptable {
            warn!(%from, kind = message.kind(), "message from unknown peer dropped");
            return;
        }

        match message {
            Message::HandshakeRequest => self.on_handshake_request(&mut state, from),
            Message::HandshakeResponse { seed } => {
                self.on_handshake_response(&mut state, from, seed);
            }
            Message::BattleSetup {
                communication_mode,
                pokemon_name,
                stat_boosts,
            } => self.on_battle_setup(&mut state, from, &pokemon_name, &communication_mode, stat_boosts),
            Message::AttackAnnounce { move_name } => {
                self.on_attack_announce(&mut state, from, move_name);
            }
            Message::DefenseAnnounce => self.on_defense_announce(&mut state),
            Message::CalculationReport(report) => self.on_calculation_report(&mut state, report),
            Message::CalculationConfirm => self.on_calculation_confirm(&mut state),
            Message::ResolutionRequest(request) => {
                self.on_resolution_request(&mut state, request);
            }
            Message::GameOver { winner, loser } => self.on_game_over(&mut state, winner, loser),
            Message::Chat {
                sender_name,
                content,
            } => self.on_chat(&state, sender_name, content),
            Message::Ack { .. } => {}
        }
    }

    // -----------------------------------------------------------------------
    // Handshake & setup
    // -----------------------------------------------------------------------

    fn on_handshake_request(&self, state: &mut SessionState, from: SocketAddr) {
        if state.role != Role::Host {
            warn!(%from, "HANDSHAKE_REQUEST at a non-host, dropped");
            return;
        }
        if state.remote == Some(from) {
            // the joiner retried: our response must have gone missing
            debug!(%from, "repeat handshake from the joiner, responding again");
            self.spawn_send(
                Message::HandshakeResponse {
                    seed: state.seed.unwrap_or(self.host_seed),
                },
                from,
            );
            return;
        }
        if state.remote.is_none() {
            if self.auto_accept {
                self.accept_join(state, from);
            } else if state.pending_join.is_none() {
                state.pending_join = Some(from);
                let _ = self.events.send(EngineEvent::JoinRequested { from });
                info!(%from, "join requested, awaiting approval");
            } else {
                debug!(%from, "join already pending, request dropped");
            }
            return;
        }
        // an opponent is bound: this is a spectator attaching, always
        // auto-accepted with the same seed
        match state.spectator {
            Some(spectator) if spectator != from => {
                warn!(%from, "spectator slot taken, handshake dropped");
            }
            _ => {
                state.spectator = Some(from);
                let _ = self.events.send(EngineEvent::SpectatorJoined { from });
                self.spawn_send(
                    Message::HandshakeResponse {
                        seed: state.seed.unwrap_or(self.host_seed),
                    },
                    from,
                );
                info!(%from, "spectator attached");
            }
        }
    }

    /// Bind the joiner, hand out the seed, move to setup.  Also the path
    /// taken by the driver's explicit approval.
    pub fn accept_join(&self, state: &mut SessionState, from: SocketAddr) {
        state.remote = Some(from);
        state.pending_join = None;
        state.phase = Phase::Setup;
        state.seed_rng(self.host_seed);
        let _ = self.events.send(EngineEvent::HandshakeComplete {
            seed: self.host_seed,
        });
        self.spawn_send(
            Message::HandshakeResponse {
                seed: self.host_seed,
            },
            from,
        );
        info!(%from, seed = self.host_seed, "joiner accepted");
    }

    fn on_handshake_response(&self, state: &mut SessionState, from: SocketAddr, seed: u64) {
        if state.role == Role::Host || state.phase != Phase::Handshaking {
            warn!(%from, "unexpected HANDSHAKE_RESPONSE dropped");
            return;
        }
        // pin the host's concrete address: a broadcast dial answers from
        // its real endpoint
        state.remote = Some(from);
        state.seed_rng(seed);
        let _ = self.events.send(EngineEvent::HandshakeComplete { seed });
        match state.role {
            Role::Joiner => {
                // the joiner sends BATTLE_SETUP first
                state.phase = Phase::Setup;
                state.setup_sent = true;
                let setup = self.my_setup(state);
                self.spawn_send(setup, from);
                info!(%from, seed, "handshake complete, setup sent");
            }
            Role::Spectator => {
                // seed stored but unused for game logic: observe only
                state.phase = Phase::WaitingForMove;
                info!(%from, seed, "attached as spectator");
            }
            Role::Host => {}
        }
    }

    fn on_battle_setup(
        &self,
        state: &mut SessionState,
        from: SocketAddr,
        pokemon_name: &str,
        communication_mode: &str,
        stat_boosts: StatBoosts,
    ) {
        if state.role == Role::Spectator || state.phase != Phase::Setup {
            warn!(%from, phase = ?state.phase, "BATTLE_SETUP out of phase, dropped");
            return;
        }
        let Some(template) = self.catalogue.lookup(pokemon_name) else {
            warn!(%from, pokemon_name, "unknown combatant, BATTLE_SETUP dropped");
            return;
        };
        state.opponent = Some(template.instantiate());
        state.opponent_boosts = Some(stat_boosts);
        debug!(
            %from,
            pokemon_name,
            communication_mode,
            "opponent configured"
        );
        if state.role == Role::Host && !state.setup_sent {
            state.setup_sent = true;
            let setup = self.my_setup(state);
            self.spawn_send(setup, from);
        }
        state.enter_battle();
        let opponent = state
            .opponent
            .as_ref()
            .map(|c| c.name.clone())
            .unwrap_or_default();
        let _ = self.events.send(EngineEvent::BattleStarted {
            opponent,
            my_turn: state.is_my_turn,
        });
        info!(my_turn = state.is_my_turn, "battle started");
    }

    fn my_setup(&self, state: &SessionState) -> Message {
        Message::BattleSetup {
            communication_mode: state.communication_mode.clone(),
            pokemon_name: state.my_key.clone().unwrap_or_default(),
            stat_boosts: StatBoosts {
                attack: state.my_boosts.attack_remaining(),
                defense: state.my_boosts.defense_remaining(),
            },
        }
    }

    // -----------------------------------------------------------------------
    // Attack round
    // -----------------------------------------------------------------------

    fn on_attack_announce(&self, state: &mut SessionState, from: SocketAddr, move_name: String) {
        if state.role == Role::Spectator {
            warn!(%from, "spectator received ATTACK_ANNOUNCE, dropped");
            return;
        }
        if state.phase != Phase::WaitingForMove || state.is_my_turn {
            warn!(
                %from,
                phase = ?state.phase,
                my_turn = state.is_my_turn,
                "ATTACK_ANNOUNCE out of turn, dropped"
            );
            return;
        }
        // armed defense boost is consumed by the incoming attack
        let defense_boosted = state.my_boosts.consume_armed_defense();

        let (mv, outcome, report) = {
            let (Some(me), Some(opponent)) = (state.me.as_ref(), state.opponent.as_ref()) else {
                warn!(%from, "attack before setup completed, dropped");
                return;
            };
            // move category comes from the attacker's primary type tag
            let mv = Move::from_primary_type(move_name.clone(), opponent.primary_type);
            let outcome = compute_damage(
                &BattleState {
                    attacker: opponent,
                    defender: me,
                },
                &mv,
                // the attacker's per-turn boost is not on the wire; this
                // side computes from its own knowledge only
                false,
                defense_boosted,
            );
            let report = CalculationReport {
                attacker: opponent.name.clone(),
                move_used: mv.name.clone(),
                remaining_health: opponent.current_hp,
                damage_dealt: outcome.damage,
                defender_hp_remaining: outcome.defender_hp_remaining,
                status_message: outcome.status_message.clone(),
            };
            (mv, outcome, report)
        };

        state.phase = Phase::ProcessingTurn;
        state.pending = Some(PendingAttack {
            attacking_side: Side::Theirs,
            mv,
            damage: outcome.damage,
            defender_hp_remaining: outcome.defender_hp_remaining,
            status_message: outcome.status_message,
        });
        let _ = self.events.send(EngineEvent::AttackIncoming {
            attacker: report.attacker.clone(),
            move_name,
        });

        let mut batch = vec![
            (Message::DefenseAnnounce, from),
            (Message::CalculationReport(report.clone()), from),
        ];
        if state.role == Role::Host {
            if let Some(spectator) = state.spectator {
                batch.push((Message::CalculationReport(report), spectator));
            }
        }
        self.spawn_send_sequence(batch, false);
    }

    fn on_defense_announce(&self, state: &mut SessionState) {
        let Some(pending) = state.pending.as_ref() else {
            debug!("DEFENSE_ANNOUNCE with no round in flight, ignored");
            return;
        };
        if state.phase != Phase::ProcessingTurn || pending.attacking_side != Side::Mine {
            debug!("DEFENSE_ANNOUNCE received in error, ignored");
            return;
        }
        let Some(me) = state.me.as_ref() else {
            return;
        };
        // the attacker's independent calculation goes out now
        let report = CalculationReport {
            attacker: me.name.clone(),
            move_used: pending.mv.name.clone(),
            remaining_health: me.current_hp,
            damage_dealt: pending.damage,
            defender_hp_remaining: pending.defender_hp_remaining,
            status_message: pending.status_message.clone(),
        };
        let Some(remote) = state.remote else {
            return;
        };
        let mut batch = vec![(Message::CalculationReport(report.clone()), remote)];
        if state.role == Role::Host {
            if let Some(spectator) = state.spectator {
                batch.push((Message::CalculationReport(report), spectator));
            }
        }
        self.spawn_send_sequence(batch, false);
    }

    fn on_calculation_report(&self, state: &mut SessionState, report: CalculationReport) {
        if state.role == Role::Spectator {
            let _ = self.events.send(EngineEvent::ReportReceived { report });
            return;
        }
        if state.phase != Phase::ProcessingTurn {
            warn!(phase = ?state.phase, "CALCULATION_REPORT out of phase, dropped");
            return;
        }
        let Some(pending) = state.pending.as_ref() else {
            warn!("CALCULATION_REPORT with no pending attack, dropped");
            return;
        };
        let _ = self.events.send(EngineEvent::ReportReceived {
            report: report.clone(),
        });

        match pending.attacking_side {
            Side::Theirs => {
                // defender: the attacker reported its own remaining health
                if let Some(opponent) = state.opponent.as_mut() {
                    opponent.set_hp(report.remaining_health);
                }
            }
            Side::Mine => self.reconcile_as_attacker(state, &report),
        }
    }

    /// The attacker compares the defender's numbers with its own and
    /// either confirms or imposes its values, then commits the round.
    fn reconcile_as_attacker(&self, state: &mut SessionState, report: &CalculationReport) {
        let Some(pending) = state.pending.as_ref() else {
            return;
        };
        let agreed = report.damage_dealt == pending.damage
            && report.defender_hp_remaining == pending.defender_hp_remaining;
        if !agreed {
            info!(
                ours = pending.damage,
                theirs = report.damage_dealt,
                "calculation mismatch, imposing our values"
            );
        }
        let damage = pending.damage;
        let final_hp = pending.defender_hp_remaining;
        let status_message = pending.status_message.clone();
        let (my_name, move_used) = {
            let me_name = state
                .me
                .as_ref()
                .map(|c| c.name.clone())
                .unwrap_or_default();
            (me_name, pending.mv.name.clone())
        };
        let Some(remote) = state.remote else {
            return;
        };

        let response = if agreed {
            Message::CalculationConfirm
        } else {
            Message::ResolutionRequest(ResolutionRequest {
                attacker: my_name.clone(),
                move_used,
                damage_dealt: damage,
                defender_hp_remaining: final_hp,
            })
        };

        // the agreed value lands in our view of the defender
        let loser_name = match state.opponent.as_mut() {
            Some(opponent) => {
                opponent.set_hp(final_hp);
                opponent.name.clone()
            }
            None => String::new(),
        };
        let _ = self.events.send(EngineEvent::RoundResolved {
            status_message,
            damage,
            defender_hp_remaining: final_hp,
            attacker_is_me: true,
            reconciled: !agreed,
        });

        if final_hp == 0 {
            // the round that zeroes the defender also ends the game
            state.terminate();
            let _ = self.events.send(EngineEvent::GameOver {
                winner: my_name.clone(),
                loser: loser_name.clone(),
            });
            let game_over = Message::GameOver {
                winner: my_name,
                loser: loser_name,
            };
            let mut batch = vec![(response, remote), (game_over.clone(), remote)];
            if state.role == Role::Host {
                if let Some(spectator) = state.spectator {
                    batch.push((game_over, spectator));
                }
            }
            self.spawn_send_sequence(batch, true);
        } else {
            state.end_round();
            let _ = self.events.send(EngineEvent::TurnChanged {
                my_turn: state.is_my_turn,
            });
            self.spawn_send(response, remote);
        }
    }

    fn on_calculation_confirm(&self, state: &mut SessionState) {
        self.commit_as_defender(state, None);
    }

    fn on_resolution_request(&self, state: &mut SessionState, request: ResolutionRequest) {
        self.commit_as_defender(state, Some(request));
    }

    /// Defender-side round commit: either our own values stood
    /// (CALCULATION_CONFIRM) or the attacker's are adopted as
    /// authoritative (RESOLUTION_REQUEST).
    fn commit_as_defender(&self, state: &mut SessionState, imposed: Option<ResolutionRequest>) {
        if state.role == Role::Spectator {
            return;
        }
        let Some(pending) = state.pending.as_ref() else {
            warn!("round commit with no pending attack, dropped");
            return;
        };
        if state.phase != Phase::ProcessingTurn || pending.attacking_side != Side::Theirs {
            warn!(phase = ?state.phase, "round commit out of place, dropped");
            return;
        }
        let reconciled = imposed.is_some();
        let (damage, final_hp) = match &imposed {
            Some(request) => (request.damage_dealt, request.defender_hp_remaining),
            None => (pending.damage, pending.defender_hp_remaining),
        };
        let status_message = pending.status_message.clone();
        if let Some(me) = state.me.as_mut() {
            me.set_hp(final_hp);
        }
        let _ = self.events.send(EngineEvent::RoundResolved {
            status_message,
            damage,
            defender_hp_remaining: final_hp,
            attacker_is_me: false,
            reconciled,
        });
        if final_hp == 0 {
            // fainted: hold in terminated and keep acking until the
            // attacker's GAME_OVER lands
            state.terminate();
        } else {
            state.end_round();
            let _ = self.events.send(EngineEvent::TurnChanged {
                my_turn: state.is_my_turn,
            });
        }
    }

    // -----------------------------------------------------------------------
    // Game over & chat
    // -----------------------------------------------------------------------

    fn on_game_over(&self, state: &mut SessionState, winner: String, loser: String) {
        info!(%winner, %loser, "game over received");
        state.terminate();
        let _ = self.events.send(EngineEvent::GameOver {
            winner: winner.clone(),
            loser: loser.clone(),
        });
        if state.role == Role::Host {
            if let Some(spectator) = state.spectator {
                self.spawn_send_sequence(
                    vec![(Message::GameOver { winner, loser }, spectator)],
                    true,
                );
                return;
            }
        }
        let _ = self.shutdown.send(true);
    }

    fn on_chat(&self, state: &SessionState, sender_name: String, content: ChatContent) {
        let permitted = match state.role {
            Role::Spectator => state.phase != Phase::Handshaking,
            _ => matches!(state.phase, Phase::WaitingForMove | Phase::ProcessingTurn),
        };
        if !permitted {
            warn!(phase = ?state.phase, "CHAT_MESSAGE out of phase, dropped");
            return;
        }
        let _ = self.events.send(EngineEvent::ChatReceived {
            sender: sender_name,
            content,
        });
    }

    // -----------------------------------------------------------------------
    // Outbound helpers
    // -----------------------------------------------------------------------

    fn spawn_send(&self, message: Message, to: SocketAddr) {
        self.spawn_send_sequence(vec![(message, to)], false);
    }

    /// Ship a batch of reliable sends on a fresh task, in order, so the
    /// dispatch path never waits on an ACK round-trip.
    fn spawn_send_sequence(&self, batch: Vec<(Message, SocketAddr)>, shutdown_after: bool) {
        let channel = Arc::clone(&self.channel);
        let events = self.events.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            for (message, to) in batch {
                let kind = message.kind();
                if let Err(error) = channel.send_with_ack(&message, to).await {
                    warn!(kind, %to, %error, "outbound send failed");
                    let _ = events.send(EngineEvent::TransportFailure { context: kind });
                }
            }
            if shutdown_after {
                let _ = shutdown.send(true);
            }
        });
    }
}
