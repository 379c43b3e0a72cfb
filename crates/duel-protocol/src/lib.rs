// duel-protocol: Battle protocol message types and wire serialization.
//
// Every datagram carries one message in the line-oriented key/value text
// format implemented by `codec`.  The typed schemas and the registry of
// message kinds live in `message`.

pub mod codec;
pub mod message;

pub use codec::{CodecError, MAX_DATAGRAM, RawMessage};
pub use message::{
    CalculationReport, ChatContent, Message, ResolutionRequest, SchemaError, StatBoosts,
};
