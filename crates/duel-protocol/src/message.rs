//! Typed message schemas and the factory between them and [`RawMessage`].
//!
//! Every non-ACK message on the wire carries `message_type` and
//! `sequence_number`; ACKs carry `message_type` and `ack_number` only.
//! The sequence number is stamped by the reliable channel, not here.

use crate::codec::{FIELD_ACK_NUMBER, RawMessage};
use serde::{Deserialize, Serialize};

/// The frozen registry of `message_type` values.
pub mod kind {
    pub const HANDSHAKE_REQUEST: &str = "HANDSHAKE_REQUEST";
    pub const HANDSHAKE_RESPONSE: &str = "HANDSHAKE_RESPONSE";
    pub const BATTLE_SETUP: &str = "BATTLE_SETUP";
    pub const ATTACK_ANNOUNCE: &str = "ATTACK_ANNOUNCE";
    pub const DEFENSE_ANNOUNCE: &str = "DEFENSE_ANNOUNCE";
    pub const CALCULATION_REPORT: &str = "CALCULATION_REPORT";
    pub const CALCULATION_CONFIRM: &str = "CALCULATION_CONFIRM";
    pub const RESOLUTION_REQUEST: &str = "RESOLUTION_REQUEST";
    pub const GAME_OVER: &str = "GAME_OVER";
    pub const CHAT_MESSAGE: &str = "CHAT_MESSAGE";
    pub const ACK: &str = "ACK";
}

/// Remaining boost counters, carried in `BATTLE_SETUP` as a JSON object
/// embedded in the `stat_boosts` field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatBoosts {
    pub attack: u32,
    pub defense: u32,
}

impl StatBoosts {
    /// Canonical wire shape: `{"attack":N,"defense":N}`.
    pub fn to_field(self) -> String {
        format!(r#"{{"attack":{},"defense":{}}}"#, self.attack, self.defense)
    }

    pub fn from_field(value: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(value)
    }
}

/// Chat payload: plain text or an opaque sticker blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatContent {
    Text(String),
    Sticker(String),
}

/// One side's independently computed view of an attack round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalculationReport {
    pub attacker: String,
    pub move_used: String,
    /// Remaining hit points of the attacker, as the reporting side sees it.
    pub remaining_health: u32,
    pub damage_dealt: u32,
    pub defender_hp_remaining: u32,
    pub status_message: String,
}

/// The attacker's authoritative values, sent when the two reports diverge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionRequest {
    pub attacker: String,
    pub move_used: String,
    pub damage_dealt: u32,
    pub defender_hp_remaining: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    HandshakeRequest,
    HandshakeResponse {
        seed: u64,
    },
    BattleSetup {
        communication_mode: String,
        pokemon_name: String,
        stat_boosts: StatBoosts,
    },
    AttackAnnounce {
        move_name: String,
    },
    DefenseAnnounce,
    CalculationReport(CalculationReport),
    CalculationConfirm,
    ResolutionRequest(ResolutionRequest),
    GameOver {
        winner: String,
        loser: String,
    },
    Chat {
        sender_name: String,
        content: ChatContent,
    },
    Ack {
        ack_number: u64,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("message has no message_type field")]
    MissingType,
    #[error("unknown message_type `{0}`")]
    UnknownType(String),
    #[error("{kind} is missing required field `{field}`")]
    MissingField { kind: String, field: &'static str },
    #[error("{kind} field `{field}` is not a valid number: `{value}`")]
    BadNumber {
        kind: String,
        field: &'static str,
        value: String,
    },
    #[error("{kind} field `{field}` has unsupported value `{value}`")]
    BadValue {
        kind: String,
        field: &'static str,
        value: String,
    },
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::HandshakeRequest => kind::HANDSHAKE_REQUEST,
            Message::HandshakeResponse { .. } => kind::HANDSHAKE_RESPONSE,
            Message::BattleSetup { .. } => kind::BATTLE_SETUP,
            Message::AttackAnnounce { .. } => kind::ATTACK_ANNOUNCE,
            Message::DefenseAnnounce => kind::DEFENSE_ANNOUNCE,
            Message::CalculationReport(_) => kind::CALCULATION_REPORT,
            Message::CalculationConfirm => kind::CALCULATION_CONFIRM,
            Message::ResolutionRequest(_) => kind::RESOLUTION_REQUEST,
            Message::GameOver { .. } => kind::GAME_OVER,
            Message::Chat { .. } => kind::CHAT_MESSAGE,
            Message::Ack { .. } => kind::ACK,
        }
    }

    /// Lower to the untyped wire representation.
    ///
    /// ACKs are complete as returned; everything else still needs the
    /// channel to stamp a `sequence_number`.
    pub fn to_raw(&self) -> RawMessage {
        let mut raw = RawMessage::new(self.kind());
        match self {
            Message::HandshakeRequest
            | Message::DefenseAnnounce
            | Message::CalculationConfirm => {}
            Message::HandshakeResponse { seed } => {
                raw.set("seed", seed.to_string());
            }
            Message::BattleSetup {
                communication_mode,
                pokemon_name,
                stat_boosts,
            } => {
                raw.set("communication_mode", communication_mode);
                raw.set("pokemon_name", pokemon_name);
                raw.set("stat_boosts", stat_boosts.to_field());
            }
            Message::AttackAnnounce { move_name } => {
                raw.set("move_name", move_name);
            }
            Message::CalculationReport(report) => {
                raw.set("attacker", &report.attacker);
                raw.set("move_used", &report.move_used);
                raw.set("remaining_health", report.remaining_health.to_string());
                raw.set("damage_dealt", report.damage_dealt.to_string());
                raw.set(
                    "defender_hp_remaining",
                    report.defender_hp_remaining.to_string(),
                );
                raw.set("status_message", &report.status_message);
            }
            Message::ResolutionRequest(request) => {
                raw.set("attacker", &request.attacker);
                raw.set("move_used", &request.move_used);
                raw.set("damage_dealt", request.damage_dealt.to_string());
                raw.set(
                    "defender_hp_remaining",
                    request.defender_hp_remaining.to_string(),
                );
            }
            Message::GameOver { winner, loser } => {
                raw.set("winner", winner);
                raw.set("loser", loser);
            }
            Message::Chat {
                sender_name,
                content,
            } => {
                raw.set("sender_name", sender_name);
                match content {
                    ChatContent::Text(text) => {
                        raw.set("content_type", "TEXT");
                        raw.set("message_text", text);
                    }
                    ChatContent::Sticker(data) => {
                        raw.set("content_type", "STICKER");
                        raw.set("sticker_data", data);
                    }
                }
            }
            Message::Ack { ack_number } => {
                raw.set(FIELD_ACK_NUMBER, ack_number.to_string());
            }
        }
        raw
    }

    /// Validate an untyped message against the registry.
    pub fn from_raw(raw: &RawMessage) -> Result<Self, SchemaError> {
        let kind = raw.message_type().ok_or(SchemaError::MissingType)?;
        match kind {
            kind::HANDSHAKE_REQUEST => Ok(Message::HandshakeRequest),
            kind::HANDSHAKE_RESPONSE => Ok(Message::HandshakeResponse {
                seed: required_u64(raw, kind, "seed")?,
            }),
            kind::BATTLE_SETUP => {
                let boosts_field = required(raw, kind, "stat_boosts")?;
                let stat_boosts =
                    StatBoosts::from_field(boosts_field).map_err(|_| SchemaError::BadValue {
                        kind: kind.to_owned(),
                        field: "stat_boosts",
                        value: boosts_field.to_owned(),
                    })?;
                Ok(Message::BattleSetup {
                    communication_mode: required(raw, kind, "communication_mode")?.to_owned(),
                    pokemon_name: required(raw, kind, "pokemon_name")?.to_owned(),
                    stat_boosts,
                })
            }
            kind::ATTACK_ANNOUNCE => Ok(Message::AttackAnnounce {
                move_name: required(raw, kind, "move_name")?.to_owned(),
            }),
            kind::DEFENSE_ANNOUNCE => Ok(Message::DefenseAnnounce),
            kind::CALCULATION_REPORT => Ok(Message::CalculationReport(CalculationReport {
                attacker: required(raw, kind, "attacker")?.to_owned(),
                move_used: required(raw, kind, "move_used")?.to_owned(),
                remaining_health: required_u32(raw, kind, "remaining_health")?,
                damage_dealt: required_u32(raw, kind, "damage_dealt")?,
                defender_hp_remaining: required_u32(raw, kind, "defender_hp_remaining")?,
                status_message: required(raw, kind, "status_message")?.to_owned(),
            })),
            kind::CALCULATION_CONFIRM => Ok(Message::CalculationConfirm),
            kind::RESOLUTION_REQUEST => Ok(Message::ResolutionRequest(ResolutionRequest {
                attacker: required(raw, kind, "attacker")?.to_owned(),
                move_used: required(raw, kind, "move_used")?.to_owned(),
                damage_dealt: required_u32(raw, kind, "damage_dealt")?,
                defender_hp_remaining: required_u32(raw, kind, "defender_hp_remaining")?,
            })),
            kind::GAME_OVER => Ok(Message::GameOver {
                winner: required(raw, kind, "winner")?.to_owned(),
                loser: required(raw, kind, "loser")?.to_owned(),
            }),
            kind::CHAT_MESSAGE => {
                let sender_name = required(raw, kind, "sender_name")?.to_owned();
                let content_type = required(raw, kind, "content_type")?;
                let content = match content_type {
                    "TEXT" => ChatContent::Text(required(raw, kind, "message_text")?.to_owned()),
                    "STICKER" => {
                        ChatContent::Sticker(required(raw, kind, "sticker_data")?.to_owned())
                    }
                    other => {
                        return Err(SchemaError::BadValue {
                            kind: kind.to_owned(),
                            field: "content_type",
                            value: other.to_owned(),
                        });
                    }
                };
                Ok(Message::Chat {
                    sender_name,
                    content,
                })
            }
            kind::ACK => Ok(Message::Ack {
                ack_number: required_u64(raw, kind, FIELD_ACK_NUMBER)?,
            }),
            other => Err(SchemaError::UnknownType(other.to_owned())),
        }
    }
}

fn required<'a>(raw: &'a RawMessage, kind: &str, field: &'static str) -> Result<&'a str, SchemaError> {
    raw.get(field).ok_or_else(|| SchemaError::MissingField {
        kind: kind.to_owned(),
        field,
    })
}

fn required_u64(raw: &RawMessage, kind: &str, field: &'static str) -> Result<u64, SchemaError> {
    let value = required(raw, kind, field)?;
    value.parse().map_err(|_| SchemaError::BadNumber {
        kind: kind.to_owned(),
        field,
        value: value.to_owned(),
    })
}

fn required_u32(raw: &RawMessage, kind: &str, field: &'static str) -> Result<u32, SchemaError> {
    let value = required(raw, kind, field)?;
    value.parse().map_err(|_| SchemaError::BadNumber {
        kind: kind.to_owned(),
        field,
        value: value.to_owned(),
    })
}
