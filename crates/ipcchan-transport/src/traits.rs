use std::fmt;

use ipcchan_channel::Packet;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;

/// Identifier of a UI (window) process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(String);

impl WindowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WindowId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for WindowId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One side of the process boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeerId {
    /// The privileged backend process.
    Main,
    /// A UI process.
    Window(WindowId),
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerId::Main => f.write_str("main"),
            PeerId::Window(id) => write!(f, "window:{id}"),
        }
    }
}

/// Outbound half of a process-boundary transport.
///
/// `post` hands the packet off and returns immediately. Implementations
/// must preserve the order of packets posted to the same peer.
pub trait Transport: Send + Sync {
    /// Queue a packet for delivery to `peer`.
    ///
    /// Fails with [`TransportError::PeerNotConnected`](crate::TransportError::PeerNotConnected)
    /// when no route to the peer exists.
    fn post(&self, peer: &PeerId, packet: Packet) -> Result<()>;
}

/// Events a transport feeds to the endpoint that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A packet arrived from `from`.
    Packet { from: PeerId, packet: Packet },
    /// A new peer connected.
    PeerOpened(PeerId),
    /// A peer went away; nothing more will arrive from it.
    PeerClosed(PeerId),
}

pub type InboundTx = mpsc::UnboundedSender<Inbound>;
pub type InboundRx = mpsc::UnboundedReceiver<Inbound>;

/// Create the inbound queue a transport writes into.
pub fn inbound_channel() -> (InboundTx, InboundRx) {
    mpsc::unbounded_channel()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_display() {
        assert_eq!(PeerId::Main.to_string(), "main");
        assert_eq!(PeerId::Window("w-1".into()).to_string(), "window:w-1");
    }

    #[test]
    fn window_id_serializes_as_plain_string() {
        let id = WindowId::new("cluster-view");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"cluster-view\"");
    }
}
