//! duelgram: a two-party peer-to-peer turn-based combat protocol over UDP.
//!
//! The workspace splits into a wire crate ([`duel_protocol`]), a pure game
//! model crate ([`duel_core`]), and the network engine ([`peer`]).  This
//! facade re-exports them for the integration suites under
//! `tests/integration/` and for downstream tooling.

pub use duel_core;
pub use duel_protocol;
pub use peer;
