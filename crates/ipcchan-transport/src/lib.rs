//! Process-boundary transports.
//!
//! The endpoint layer treats the transport as a black box: it posts
//! [`Packet`](ipcchan_channel::Packet)s to a [`PeerId`] and drains an
//! [`Inbound`] queue. Two implementations live here:
//! - [`LocalHub`] connects endpoints living in one process (tests, demos,
//!   embedders with their own native IPC bridge)
//! - Unix domain sockets with length-prefixed packet framing

pub mod error;
pub mod frame;
pub mod local;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{FrameError, Result, TransportError};
pub use frame::{decode_packet, encode_packet, FrameConfig, PacketCodec, HEADER_SIZE, MAGIC};
pub use local::{LocalHub, LocalTransport};
pub use traits::{inbound_channel, Inbound, InboundRx, InboundTx, PeerId, Transport, WindowId};

#[cfg(unix)]
pub use uds::{connect, connect_with_config, SocketListener, SocketTransport};
