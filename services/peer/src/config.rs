//! Peer configuration loading.
//!
//! TOML is the sole config source; the binary's flags may override a few
//! fields afterwards.  Default config path: `/etc/duelgram/peer.toml`.
//!
//! # Required fields
//! - `schema_version = 1`
//! - `identity.display_name`
//!
//! Everything else has defaults: direct mode, port 43210, auto-accept on,
//! built-in catalogue.

use crate::socket::AddressingMode;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

pub const DEFAULT_PORT: u16 = 43210;

// ---------------------------------------------------------------------------
// Config types (validated)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub schema_version: u32,
    pub identity: IdentityConfig,
    pub network: NetworkConfig,
    pub battle: BattleConfig,
    /// Path to a JSON catalogue file; None means the built-in set.
    pub catalogue_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub display_name: String,
    /// Lowercase catalogue key; optional because spectators carry none.
    pub combatant: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub mode: AddressingMode,
    /// Session port: hosts bind it, broadcast dials target it.
    pub port: u16,
    /// Explicit remote for direct-mode joiners and spectators.
    pub remote: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BattleConfig {
    /// Pinned shared seed (host side); None draws a random one.
    pub seed: Option<u64>,
    pub auto_accept: bool,
}

impl NetworkConfig {
    /// Where this role binds: hosts own the session port, dialers take an
    /// ephemeral port (except broadcast hosts and joiners, which share it).
    pub fn bind_addr(&self, is_host: bool) -> SocketAddr {
        let port = if is_host { self.port } else { 0 };
        SocketAddr::from(([0, 0, 0, 0], port))
    }

    /// The dial target for joiners and spectators.
    pub fn remote_addr(&self) -> Result<Option<SocketAddr>, ConfigError> {
        match self.mode {
            AddressingMode::Broadcast => Ok(Some(SocketAddr::from((
                [255, 255, 255, 255],
                self.port,
            )))),
            AddressingMode::Direct => match &self.remote {
                None => Ok(None),
                Some(remote) => remote
                    .parse()
                    .map(Some)
                    .map_err(|_| ConfigError::InvalidValue(format!(
                        "network.remote `{remote}` is not an ip:port address"
                    ))),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization types (with Option for optional fields)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawConfig {
    schema_version: Option<u32>,
    identity: Option<RawIdentity>,
    network: Option<RawNetwork>,
    battle: Option<RawBattle>,
    catalogue: Option<RawCatalogue>,
}

#[derive(Debug, Deserialize)]
struct RawIdentity {
    display_name: Option<String>,
    combatant: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawNetwork {
    mode: Option<String>,
    port: Option<u16>,
    remote: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawBattle {
    seed: Option<u64>,
    auto_accept: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawCatalogue {
    path: Option<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub fn load_config_from_path(path: &Path) -> Result<PeerConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {}", path.display(), e)))?;
    load_config_from_str(&toml_str)
}

/// Load from the default path `/etc/duelgram/peer.toml`.
pub fn load_config() -> Result<PeerConfig, ConfigError> {
    load_config_from_path(Path::new("/etc/duelgram/peer.toml"))
}

pub fn load_config_from_str(toml_str: &str) -> Result<PeerConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let schema_version = raw
        .schema_version
        .ok_or_else(|| ConfigError::MissingField("schema_version".to_owned()))?;
    if schema_version != 1 {
        return Err(ConfigError::InvalidValue(format!(
            "schema_version must be 1, got {schema_version}"
        )));
    }

    let raw_identity = raw
        .identity
        .ok_or_else(|| ConfigError::MissingField("identity".to_owned()))?;
    let display_name = raw_identity
        .display_name
        .ok_or_else(|| ConfigError::MissingField("identity.display_name".to_owned()))?;

    let network = match raw.network {
        Some(n) => NetworkConfig {
            mode: parse_mode(n.mode.as_deref().unwrap_or("direct"))?,
            port: n.port.unwrap_or(DEFAULT_PORT),
            remote: n.remote,
        },
        None => NetworkConfig {
            mode: AddressingMode::Direct,
            port: DEFAULT_PORT,
            remote: None,
        },
    };

    let battle = match raw.battle {
        Some(b) => BattleConfig {
            seed: b.seed,
            auto_accept: b.auto_accept.unwrap_or(true),
        },
        None => BattleConfig {
            seed: None,
            auto_accept: true,
        },
    };

    Ok(PeerConfig {
        schema_version,
        identity: IdentityConfig {
            display_name,
            combatant: raw_identity.combatant.map(|c| c.to_lowercase()),
        },
        network,
        battle,
        catalogue_path: raw.catalogue.and_then(|c| c.path),
    })
}

fn parse_mode(mode: &str) -> Result<AddressingMode, ConfigError> {
    match mode {
        "direct" => Ok(AddressingMode::Direct),
        "broadcast" => Ok(AddressingMode::Broadcast),
        other => Err(ConfigError::InvalidValue(format!(
            "network.mode must be `direct` or `broadcast`, got `{other}`"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Missing required field: {0}")]
    MissingField(String),
    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}
