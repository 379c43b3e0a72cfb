// peer: duelgram battle peer binary.
//
// Hosts a battle, joins one, or spectates.  The interactive surface is a
// thin line-based driver: `!attack <move> [boost]`, `!defend`,
// `!chat <text>`, `!sticker <data>`, `!approve`, `!quit`.

use clap::{Parser, ValueEnum};
use duel_core::catalogue::Catalogue;
use duel_protocol::message::ChatContent;
use peer::config::{self, PeerConfig};
use peer::engine::{Engine, EngineConfig};
use peer::events::EngineEvent;
use peer::roles;
use peer::session::Role;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RoleArg {
    Host,
    Joiner,
    Spectator,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Role {
        match role {
            RoleArg::Host => Role::Host,
            RoleArg::Joiner => Role::Joiner,
            RoleArg::Spectator => Role::Spectator,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "peer", about = "duelgram battle peer")]
struct Args {
    /// Which side of the session this process plays.
    #[arg(value_enum)]
    role: RoleArg,
    /// Config file (default: /etc/duelgram/peer.toml, falling back to
    /// built-in defaults when absent).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the remote ip:port to dial (joiner/spectator, direct mode).
    #[arg(long)]
    remote: Option<String>,
    /// Override the session port.
    #[arg(long)]
    port: Option<u16>,
    /// Override the combatant catalogue key.
    #[arg(long)]
    combatant: Option<String>,
    /// Override the display name.
    #[arg(long)]
    name: Option<String>,
}

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber for structured logging to stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!(version = env!("CARGO_PKG_VERSION"), role = ?args.role, "peer starting");

    let mut cfg = load_config_or_exit(args.config.as_deref());
    if let Some(remote) = args.remote {
        cfg.network.remote = Some(remote);
    }
    if let Some(port) = args.port {
        cfg.network.port = port;
    }
    if let Some(combatant) = args.combatant {
        cfg.identity.combatant = Some(combatant.to_lowercase());
    }
    if let Some(name) = args.name {
        cfg.identity.display_name = name;
    }

    let catalogue = match &cfg.catalogue_path {
        Some(path) => match Catalogue::from_path(Path::new(path)) {
            Ok(catalogue) => {
                info!(path = %path, combatants = catalogue.len(), "catalogue loaded");
                Arc::new(catalogue)
            }
            Err(e) => {
                eprintln!("FATAL: failed to load catalogue: {e}");
                std::process::exit(1);
            }
        },
        None => Arc::new(Catalogue::builtin()),
    };

    let role = Role::from(args.role);
    let engine_config = match engine_config(role, &cfg) {
        Ok(engine_config) => engine_config,
        Err(e) => {
            eprintln!("FATAL: {e}");
            std::process::exit(1);
        }
    };

    let started = match role {
        Role::Host => roles::start_host(engine_config, catalogue).await,
        Role::Joiner => roles::start_joiner(engine_config, catalogue).await,
        Role::Spectator => roles::start_spectator(engine_config, catalogue).await,
    };
    let engine = match started {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("FATAL: failed to start engine: {e}");
            std::process::exit(1);
        }
    };
    println!("listening on {}", engine.local_addr());

    let mut events = engine.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            print_event(&event);
        }
    });

    run_driver(&engine).await;
    info!("peer stopped");
}

fn load_config_or_exit(path: Option<&Path>) -> PeerConfig {
    match path {
        Some(path) => match config::load_config_from_path(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("FATAL: failed to load config: {e}");
                std::process::exit(1);
            }
        },
        None => match config::load_config() {
            Ok(cfg) => cfg,
            Err(config::ConfigError::Io(_)) => {
                // no config file: a nameless direct-mode peer is still usable
                info!("no config file, using defaults");
                PeerConfig {
                    schema_version: 1,
                    identity: config::IdentityConfig {
                        display_name: "anonymous".to_owned(),
                        combatant: None,
                    },
                    network: config::NetworkConfig {
                        mode: peer::socket::AddressingMode::Direct,
                        port: config::DEFAULT_PORT,
                        remote: None,
                    },
                    battle: config::BattleConfig {
                        seed: None,
                        auto_accept: true,
                    },
                    catalogue_path: None,
                }
            }
            Err(e) => {
                eprintln!("FATAL: failed to load config: {e}");
                std::process::exit(1);
            }
        },
    }
}

fn engine_config(role: Role, cfg: &PeerConfig) -> Result<EngineConfig, config::ConfigError> {
    Ok(EngineConfig {
        role,
        display_name: cfg.identity.display_name.clone(),
        combatant: cfg.identity.combatant.clone(),
        bind: cfg.network.bind_addr(role == Role::Host),
        remote: cfg.network.remote_addr()?,
        mode: cfg.network.mode,
        seed: cfg.battle.seed,
        auto_accept: cfg.battle.auto_accept,
    })
}

fn print_event(event: &EngineEvent) {
    match event {
        EngineEvent::JoinRequested { from } => {
            println!("join request from {from} — `!approve` to accept");
        }
        EngineEvent::SpectatorJoined { from } => println!("spectator attached from {from}"),
        EngineEvent::HandshakeComplete { seed } => println!("handshake complete (seed {seed})"),
        EngineEvent::BattleStarted { opponent, my_turn } => {
            let turn = if *my_turn { "your move" } else { "their move" };
            println!("battle started against {opponent} — {turn}");
        }
        EngineEvent::AttackIncoming {
            attacker,
            move_name,
        } => println!("{attacker} attacks with {move_name}!"),
        EngineEvent::ReportReceived { .. } => {}
        EngineEvent::RoundResolved {
            status_message,
            damage,
            defender_hp_remaining,
            ..
        } => println!("{status_message} ({damage} damage, {defender_hp_remaining} hp left)"),
        EngineEvent::TurnChanged { my_turn } => {
            if *my_turn {
                println!("your move");
            }
        }
        EngineEvent::ChatReceived { sender, content } => match content {
            ChatContent::Text(text) => println!("[{sender}] {text}"),
            ChatContent::Sticker(_) => println!("[{sender}] sent a sticker"),
        },
        EngineEvent::TransportFailure { context } => {
            println!("delivery failed for {context} (peer unreachable?)");
        }
        EngineEvent::GameOver { winner, loser } => {
            println!("game over: {winner} defeats {loser}");
        }
    }
}

async fn run_driver(engine: &Engine) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = engine.wait_shutdown() => break,
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                if !handle_command(engine, line.trim()).await {
                    break;
                }
            }
        }
    }
    engine.shutdown();
}

/// Returns false when the driver should exit.
async fn handle_command(engine: &Engine, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    match parts.next() {
        None => {}
        Some("!quit") => return false,
        Some("!attack") => {
            let Some(move_name) = parts.next() else {
                println!("usage: !attack <move> [boost]");
                return true;
            };
            let boost = parts.next() == Some("boost");
            report(engine.attack(move_name, boost).await);
        }
        Some("!defend") => report(engine.arm_defense().await),
        Some("!chat") => {
            let text = parts.collect::<Vec<_>>().join(" ");
            report(engine.send_chat(ChatContent::Text(text)).await);
        }
        Some("!sticker") => {
            let data = parts.collect::<Vec<_>>().join(" ");
            report(engine.send_chat(ChatContent::Sticker(data)).await);
        }
        Some("!approve") => report(engine.approve_join().await),
        Some(other) => {
            println!("unknown command `{other}` — !attack / !defend / !chat / !sticker / !approve / !quit");
        }
    }
    true
}

fn report(result: Result<(), peer::engine::IntentError>) {
    if let Err(e) = result {
        println!("{e}");
    }
}
