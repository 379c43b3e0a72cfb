//! Engine wiring and the driver-facing handle.
//!
//! [`Engine::start`] binds the socket, spawns the receive and dispatch
//! tasks, and returns a handle exposing the three driver intents
//! (attack / arm-defense / chat) plus the host's join approval.  Each
//! intent is accepted or rejected synchronously with a [`Rejection`]
//! reason; transport failures surface as explicit results, never as
//! session termination.

use crate::channel::{ChannelError, ReliableChannel};
use crate::dispatcher::{Dispatcher, run_dispatch_loop};
use crate::events::EngineEvent;
use crate::queue::ArrivalQueue;
use crate::receive::run_receive_loop;
use crate::roles::RoleCapabilities;
use crate::session::{Phase, Rejection, Role, SessionState, Side};
use crate::socket::{AddressingMode, DatagramSocket};
use duel_core::catalogue::Catalogue;
use duel_core::combatant::Move;
use duel_core::damage::{BattleState, compute_damage};
use duel_protocol::message::{ChatContent, Message};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast, watch};
use tracing::info;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub role: Role,
    pub display_name: String,
    /// Lowercase catalogue key; None only for spectators.
    pub combatant: Option<String>,
    pub bind: SocketAddr,
    /// Dial target for joiners and spectators; learned from the handshake
    /// for hosts.
    pub remote: Option<SocketAddr>,
    pub mode: AddressingMode,
    /// Host only: pin the shared seed instead of drawing one.
    pub seed: Option<u64>,
    pub auto_accept: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("socket: {0}")]
    Io(#[from] std::io::Error),
    #[error("combatant `{0}` is not in the catalogue")]
    UnknownCombatant(String),
    #[error("{0:?} requires a combatant")]
    MissingCombatant(Role),
    #[error("{0:?} requires a remote address to dial")]
    MissingRemote(Role),
}

#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    #[error("rejected: {0}")]
    Rejected(Rejection),
    #[error(transparent)]
    Transport(#[from] ChannelError),
}

/// A point-in-time snapshot of the battle for drivers and tests.
#[derive(Debug, Clone)]
pub struct BattleView {
    pub phase: Phase,
    pub my_turn: bool,
    pub my_hp: Option<u32>,
    pub opponent_hp: Option<u32>,
    pub attack_boosts_remaining: u32,
    pub defense_boosts_remaining: u32,
}

pub struct Engine {
    state: Arc<Mutex<SessionState>>,
    channel: Arc<ReliableChannel>,
    dispatcher: Arc<Dispatcher>,
    events: broadcast::Sender<EngineEvent>,
    shutdown: watch::Sender<bool>,
    capabilities: RoleCapabilities,
    local_addr: SocketAddr,
}

impl Engine {
    pub async fn start(
        config: EngineConfig,
        catalogue: Arc<Catalogue>,
    ) -> Result<Engine, EngineError> {
        let me = match (config.role, &config.combatant) {
            (Role::Spectator, _) => None,
            (role, None) => return Err(EngineError::MissingCombatant(role)),
            (_, Some(key)) => Some(
                catalogue
                    .lookup(key)
                    .ok_or_else(|| EngineError::UnknownCombatant(key.clone()))?
                    .instantiate(),
            ),
        };
        if config.role != Role::Host && config.remote.is_none() {
            return Err(EngineError::MissingRemote(config.role));
        }

        let socket = Arc::new(DatagramSocket::bind(config.bind, config.mode).await?);
        let local_addr = socket.local_addr()?;
        let queue = Arc::new(ArrivalQueue::new());
        let channel = Arc::new(ReliableChannel::new(Arc::clone(&socket), Arc::clone(&queue)));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (events, _) = broadcast::channel(64);

        let state = Arc::new(Mutex::new(SessionState::new(
            config.role,
            config.display_name.clone(),
            config.mode.as_str().to_owned(),
            me,
            config.combatant.clone().map(|k| k.to_lowercase()),
            config.remote,
        )));

        let host_seed = config.seed.unwrap_or_else(rand::random);
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&state),
            Arc::clone(&channel),
            catalogue,
            events.clone(),
            shutdown.clone(),
            config.auto_accept,
            host_seed,
        ));

        tokio::spawn(run_receive_loop(
            socket,
            Arc::clone(&queue),
            shutdown_rx.clone(),
        ));
        tokio::spawn(run_dispatch_loop(
            Arc::clone(&dispatcher),
            queue,
            shutdown_rx,
        ));

        info!(
            role = ?config.role,
            %local_addr,
            mode = config.mode.as_str(),
            "engine started"
        );
        Ok(Engine {
            state,
            channel,
            dispatcher,
            events,
            shutdown,
            capabilities: RoleCapabilities::for_role(config.role),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub async fn battle_view(&self) -> BattleView {
        let state = self.state.lock().await;
        BattleView {
            phase: state.phase,
            my_turn: state.is_my_turn,
            my_hp: state.me.as_ref().map(|c| c.current_hp),
            opponent_hp: state.opponent.as_ref().map(|c| c.current_hp),
            attack_boosts_remaining: state.my_boosts.attack_remaining(),
            defense_boosts_remaining: state.my_boosts.defense_remaining(),
        }
    }

    /// Joiners and spectators dial in with a reliable HANDSHAKE_REQUEST.
    pub async fn start_handshake(&self) -> Result<(), IntentError> {
        if !self.capabilities.originate_handshake {
            return Err(IntentError::Rejected(Rejection::RoleForbidden));
        }
        let remote = {
            let state = self.state.lock().await;
            state.remote.ok_or(IntentError::Rejected(Rejection::NoOpponentYet))?
        };
        self.channel
            .send_with_ack(&Message::HandshakeRequest, remote)
            .await?;
        Ok(())
    }

    /// Driver intent: attack with `move_name`, optionally spending an
    /// attack boost.  The boost flag is set before the local damage
    /// computation so both the wire announcement and our pending values
    /// reflect it.
    pub async fn attack(&self, move_name: &str, use_attack_boost: bool) -> Result<(), IntentError> {
        if !self.capabilities.issue_attack {
            return Err(IntentError::Rejected(Rejection::RoleForbidden));
        }
        let (announce, remote) = {
            let mut state = self.state.lock().await;
            state
                .validate_attack(use_attack_boost)
                .map_err(IntentError::Rejected)?;
            if use_attack_boost {
                state
                    .my_boosts
                    .use_attack_boost()
                    .map_err(|_| IntentError::Rejected(Rejection::NoBoostsRemaining))?;
            }
            let (mv, outcome) = {
                let (Some(me), Some(opponent)) = (state.me.as_ref(), state.opponent.as_ref())
                else {
                    return Err(IntentError::Rejected(Rejection::NoOpponentYet));
                };
                let mv = Move::from_primary_type(move_name, me.primary_type);
                let outcome = compute_damage(
                    &BattleState {
                        attacker: me,
                        defender: opponent,
                    },
                    &mv,
                    state.my_boosts.attack_applied(),
                    // the defender's armed boost is invisible from here
                    false,
                );
                (mv, outcome)
            };
            let remote = state
                .remote
                .ok_or(IntentError::Rejected(Rejection::NoOpponentYet))?;
            state.phase = Phase::ProcessingTurn;
            state.pending = Some(crate::session::PendingAttack {
                attacking_side: Side::Mine,
                mv,
                damage: outcome.damage,
                defender_hp_remaining: outcome.defender_hp_remaining,
                status_message: outcome.status_message,
            });
            (
                Message::AttackAnnounce {
                    move_name: move_name.to_owned(),
                },
                remote,
            )
        };
        // the driver task carries the ACK round-trip, not the dispatcher
        self.channel.send_with_ack(&announce, remote).await?;
        Ok(())
    }

    /// Driver intent: arm a defense boost for the next incoming attack.
    pub async fn arm_defense(&self) -> Result<(), IntentError> {
        if !self.capabilities.arm_defense {
            return Err(IntentError::Rejected(Rejection::RoleForbidden));
        }
        let mut state = self.state.lock().await;
        state.validate_arm_defense().map_err(IntentError::Rejected)?;
        state
            .my_boosts
            .arm_defense()
            .map_err(|_| IntentError::Rejected(Rejection::NoBoostsRemaining))?;
        Ok(())
    }

    /// Driver intent: chat with the immediate peer.
    pub async fn send_chat(&self, content: ChatContent) -> Result<(), IntentError> {
        if !self.capabilities.send_chat {
            return Err(IntentError::Rejected(Rejection::RoleForbidden));
        }
        let (message, remote) = {
            let state = self.state.lock().await;
            state.validate_chat().map_err(IntentError::Rejected)?;
            let remote = state
                .remote
                .ok_or(IntentError::Rejected(Rejection::NoOpponentYet))?;
            (
                Message::Chat {
                    sender_name: state.display_name.clone(),
                    content,
                },
                remote,
            )
        };
        self.channel.send_with_ack(&message, remote).await?;
        Ok(())
    }

    /// Host approval for a pending join (when auto-accept is off).
    pub async fn approve_join(&self) -> Result<(), IntentError> {
        if !self.capabilities.respond_handshake {
            return Err(IntentError::Rejected(Rejection::RoleForbidden));
        }
        let mut state = self.state.lock().await;
        let Some(from) = state.pending_join else {
            return Err(IntentError::Rejected(Rejection::WrongPhase));
        };
        self.dispatcher.accept_join(&mut state, from);
        Ok(())
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Resolves once the session has wound down (GAME_OVER or explicit
    /// shutdown).
    pub async fn wait_shutdown(&self) {
        let mut rx = self.shutdown.subscribe();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}
