//! Line-oriented key/value wire codec.
//!
//! A message is a mapping from ASCII field name to printable string value.
//! On the wire each field is one `name: value` line and lines are separated
//! by a single `\n`.  The value keeps everything after the first colon, so
//! colons inside values survive a round trip.
//!
//! Decoding is deliberately forgiving: lines are trimmed, empty lines and
//! lines without a colon are skipped.  A decoded message that lacks
//! `message_type` is still returned — the dispatcher is the layer that
//! decides it is malformed and drops it.

use std::collections::BTreeMap;

/// Hard ceiling on an encoded datagram.  The protocol assumes no message
/// ever exceeds one receive buffer.
pub const MAX_DATAGRAM: usize = 1024;

pub const FIELD_MESSAGE_TYPE: &str = "message_type";
pub const FIELD_SEQUENCE_NUMBER: &str = "sequence_number";
pub const FIELD_ACK_NUMBER: &str = "ack_number";

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("message has no message_type field")]
    MissingType,
    #[error("encoded message is {0} bytes, datagram limit is {MAX_DATAGRAM}")]
    Oversized(usize),
    #[error("datagram is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

/// An untyped wire message: ordered field name → value mapping.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawMessage {
    fields: BTreeMap<String, String>,
}

impl RawMessage {
    /// A message with only its `message_type` field set.
    pub fn new(message_type: &str) -> Self {
        let mut msg = Self::default();
        msg.set(FIELD_MESSAGE_TYPE, message_type);
        msg
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn message_type(&self) -> Option<&str> {
        self.get(FIELD_MESSAGE_TYPE)
    }

    /// Decimal-parsed `sequence_number`, if present and well-formed.
    pub fn sequence_number(&self) -> Option<u64> {
        self.get(FIELD_SEQUENCE_NUMBER)?.parse().ok()
    }

    /// Decimal-parsed `ack_number`, if present and well-formed.
    pub fn ack_number(&self) -> Option<u64> {
        self.get(FIELD_ACK_NUMBER)?.parse().ok()
    }

    pub fn is_ack(&self) -> bool {
        self.message_type() == Some(crate::message::kind::ACK)
    }

    /// Encode to wire bytes.
    ///
    /// Fails when `message_type` is absent or the encoding would not fit in
    /// a single datagram.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        if self.message_type().is_none() {
            return Err(CodecError::MissingType);
        }
        let mut body = String::new();
        for (name, value) in &self.fields {
            if !body.is_empty() {
                body.push('\n');
            }
            body.push_str(name);
            body.push_str(": ");
            body.push_str(value);
        }
        if body.len() > MAX_DATAGRAM {
            return Err(CodecError::Oversized(body.len()));
        }
        Ok(body.into_bytes())
    }

    /// Decode wire bytes.
    ///
    /// The only hard failure is invalid UTF-8; structural noise (empty or
    /// colonless lines) is skipped and a missing `message_type` is left for
    /// the dispatcher to reject.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let text = std::str::from_utf8(bytes)?;
        let mut msg = Self::default();
        for line in text.split('\n') {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            msg.set(name.trim(), value.trim());
        }
        Ok(msg)
    }
}
