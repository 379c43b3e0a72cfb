// duel-test-utils: Shared test utilities for the battle protocol suites.
//
// Provides a raw datagram peer that speaks the wire format without any of
// the engine's reliability machinery, so tests can duplicate traffic,
// withhold ACKs, and forge messages.

pub mod raw_peer;

pub use raw_peer::RawPeer;
