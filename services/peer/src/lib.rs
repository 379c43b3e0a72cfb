//! Battle peer engine.
//!
//! Layers, leaves first: a datagram socket abstraction, the arrival queue,
//! the reliable channel (sequence numbers, ACKs, bounded retries), the
//! receive loop, the session state machine, the message dispatcher, and the
//! role bootstraps wired together by [`engine::Engine`].

pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod events;
pub mod queue;
pub mod receive;
pub mod roles;
pub mod session;
pub mod socket;
