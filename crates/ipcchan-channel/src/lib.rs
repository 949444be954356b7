//! Typed channel identities and the payload boundary.
//!
//! A channel is nothing more than an id string with the payload types pinned
//! at compile time. Everything that crosses the process boundary is a JSON
//! string; this crate owns the conversion in both directions and the
//! [`Packet`] envelope that transports move.

pub mod channel;
pub mod codec;
pub mod error;
pub mod packet;

pub use channel::{
    define_message_channel, define_request_channel, ChannelKind, MessageChannel, RequestChannel,
};
pub use codec::{from_payload, to_payload, to_payload_limited, DEFAULT_MAX_PAYLOAD};
pub use error::{CodecError, Result};
pub use packet::{CorrelationId, Packet, RemoteError, RemoteErrorKind};
