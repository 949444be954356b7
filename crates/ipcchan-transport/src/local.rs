use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use ipcchan_channel::Packet;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{inbound_channel, Inbound, InboundRx, InboundTx, PeerId, Transport};

/// In-process transport connecting endpoints that share one address space.
///
/// Each attached peer owns an unbounded inbound queue; posting to a peer
/// pushes onto its queue, so delivery order per sender is preserved.
#[derive(Debug, Default)]
pub struct LocalHub {
    routes: Mutex<HashMap<PeerId, InboundTx>>,
}

impl LocalHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attach a peer and return its transport and inbound queue.
    pub fn attach(self: &Arc<Self>, peer: PeerId) -> Result<(LocalTransport, InboundRx)> {
        let mut routes = self.routes();
        if routes.contains_key(&peer) {
            return Err(TransportError::AlreadyAttached(peer));
        }

        let (tx, rx) = inbound_channel();
        routes.insert(peer.clone(), tx);
        debug!(%peer, "peer attached to local hub");

        Ok((
            LocalTransport {
                hub: Arc::clone(self),
                local: peer,
            },
            rx,
        ))
    }

    /// Detach a peer, notifying every remaining peer that it closed.
    ///
    /// Returns false if the peer was not attached.
    pub fn detach(&self, peer: &PeerId) -> bool {
        let mut routes = self.routes();
        if routes.remove(peer).is_none() {
            return false;
        }
        for tx in routes.values() {
            let _ = tx.send(Inbound::PeerClosed(peer.clone()));
        }
        debug!(%peer, "peer detached from local hub");
        true
    }

    /// Whether a peer is currently attached.
    pub fn is_attached(&self, peer: &PeerId) -> bool {
        self.routes().contains_key(peer)
    }

    fn routes(&self) -> MutexGuard<'_, HashMap<PeerId, InboundTx>> {
        // A poisoned map is still structurally valid.
        self.routes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// The outbound handle of one peer attached to a [`LocalHub`].
#[derive(Debug, Clone)]
pub struct LocalTransport {
    hub: Arc<LocalHub>,
    local: PeerId,
}

impl Transport for LocalTransport {
    fn post(&self, peer: &PeerId, packet: Packet) -> Result<()> {
        let routes = self.hub.routes();
        let tx = routes
            .get(peer)
            .ok_or_else(|| TransportError::PeerNotConnected(peer.clone()))?;
        tx.send(Inbound::Packet {
            from: self.local.clone(),
            packet,
        })
        .map_err(|_| TransportError::PeerNotConnected(peer.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(channel: &str, payload: &str) -> Packet {
        Packet::Message {
            channel: channel.to_string(),
            payload: payload.to_string(),
        }
    }

    #[tokio::test]
    async fn post_reaches_the_addressed_peer_in_order() {
        let hub = LocalHub::new();
        let (main, _main_rx) = hub.attach(PeerId::Main).unwrap();
        let (_window, mut window_rx) = hub.attach(PeerId::Window("w1".into())).unwrap();

        for i in 0..16 {
            main.post(&PeerId::Window("w1".into()), message("ping", &i.to_string()))
                .unwrap();
        }

        for i in 0..16 {
            let inbound = window_rx.recv().await.unwrap();
            assert_eq!(
                inbound,
                Inbound::Packet {
                    from: PeerId::Main,
                    packet: message("ping", &i.to_string()),
                }
            );
        }
    }

    #[test]
    fn post_to_unknown_peer_fails() {
        let hub = LocalHub::new();
        let (main, _rx) = hub.attach(PeerId::Main).unwrap();
        let err = main
            .post(&PeerId::Window("ghost".into()), Packet::Ready)
            .unwrap_err();
        assert!(matches!(err, TransportError::PeerNotConnected(_)));
    }

    #[test]
    fn attaching_twice_is_rejected() {
        let hub = LocalHub::new();
        let _first = hub.attach(PeerId::Main).unwrap();
        let second = hub.attach(PeerId::Main);
        assert!(matches!(second, Err(TransportError::AlreadyAttached(_))));
    }

    #[tokio::test]
    async fn detach_notifies_remaining_peers() {
        let hub = LocalHub::new();
        let (_main, mut main_rx) = hub.attach(PeerId::Main).unwrap();
        let window = PeerId::Window("w1".into());
        let (transport, _window_rx) = hub.attach(window.clone()).unwrap();

        assert!(hub.detach(&window));
        assert!(!hub.detach(&window));
        assert!(!hub.is_attached(&window));

        assert_eq!(
            main_rx.recv().await.unwrap(),
            Inbound::PeerClosed(window.clone())
        );
        assert!(
            transport.post(&PeerId::Main, Packet::Ready).is_ok(),
            "main is still attached"
        );
        assert!(matches!(
            transport.post(&window, Packet::Ready),
            Err(TransportError::PeerNotConnected(_))
        ));
    }
}
