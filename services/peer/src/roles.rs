//! Role capabilities and bootstraps.
//!
//! Host, Joiner, and Spectator are one engine with three capability
//! profiles; they differ only in which capabilities are populated and in
//! who dials whom at startup.

use crate::engine::{Engine, EngineConfig, EngineError, IntentError};
use crate::session::Role;
use duel_core::catalogue::Catalogue;
use std::sync::Arc;

/// What a role is allowed to originate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleCapabilities {
    pub originate_handshake: bool,
    pub respond_handshake: bool,
    pub originate_setup: bool,
    pub issue_attack: bool,
    pub arm_defense: bool,
    pub send_chat: bool,
}

impl RoleCapabilities {
    pub fn host() -> Self {
        RoleCapabilities {
            originate_handshake: false,
            respond_handshake: true,
            originate_setup: false,
            issue_attack: true,
            arm_defense: true,
            send_chat: true,
        }
    }

    pub fn joiner() -> Self {
        RoleCapabilities {
            originate_handshake: true,
            respond_handshake: false,
            originate_setup: true,
            issue_attack: true,
            arm_defense: true,
            send_chat: true,
        }
    }

    pub fn spectator() -> Self {
        RoleCapabilities {
            originate_handshake: true,
            respond_handshake: false,
            originate_setup: false,
            issue_attack: false,
            arm_defense: false,
            send_chat: true,
        }
    }

    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Host => Self::host(),
            Role::Joiner => Self::joiner(),
            Role::Spectator => Self::spectator(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("handshake: {0}")]
    Handshake(#[from] IntentError),
}

/// Host: bind and listen; the joiner's handshake drives the rest.
pub async fn start_host(
    config: EngineConfig,
    catalogue: Arc<Catalogue>,
) -> Result<Engine, BootstrapError> {
    Ok(Engine::start(config, catalogue).await?)
}

/// Joiner: bind, then dial the host.  BATTLE_SETUP goes out from the
/// dispatcher once the seed arrives.
pub async fn start_joiner(
    config: EngineConfig,
    catalogue: Arc<Catalogue>,
) -> Result<Engine, BootstrapError> {
    let engine = Engine::start(config, catalogue).await?;
    engine.start_handshake().await?;
    Ok(engine)
}

/// Spectator: dial the host and observe.
pub async fn start_spectator(
    config: EngineConfig,
    catalogue: Arc<Catalogue>,
) -> Result<Engine, BootstrapError> {
    let engine = Engine::start(config, catalogue).await?;
    engine.start_handshake().await?;
    Ok(engine)
}
