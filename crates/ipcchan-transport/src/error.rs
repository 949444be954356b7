use std::path::PathBuf;

use crate::traits::PeerId;

/// Errors that can occur while encoding or decoding packet frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header contains an invalid magic number.
    #[error("invalid frame magic (expected 0x4943 \"IC\")")]
    InvalidMagic,

    /// The packet body exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The frame body is not a valid packet.
    #[error("malformed packet: {0}")]
    Packet(#[from] serde_json::Error),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// Framing failed.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// There is no live route to the peer.
    #[error("peer {0} is not connected")]
    PeerNotConnected(PeerId),

    /// The peer is already attached to this hub.
    #[error("peer {0} is already attached")]
    AlreadyAttached(PeerId),
}

pub type Result<T> = std::result::Result<T, TransportError>;
