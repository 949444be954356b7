//! Fire-and-forget delivery.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use ipcchan_channel::{codec, MessageChannel, Packet};
use ipcchan_transport::{PeerId, Transport};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::error::Result;
use crate::lifecycle::WindowHandle;
use crate::listener::ListenerRegistry;

pub(crate) struct MessageDispatcher {
    transport: Arc<dyn Transport>,
    max_payload_size: usize,
}

impl MessageDispatcher {
    pub(crate) fn new(transport: Arc<dyn Transport>, max_payload_size: usize) -> Self {
        Self {
            transport,
            max_payload_size,
        }
    }

    /// Encode once and post to every target. Returns how many posts succeeded.
    ///
    /// Only encoding fails the call; a target that cannot be reached is
    /// logged and skipped.
    pub(crate) fn broadcast<T: Serialize>(
        &self,
        channel: &MessageChannel<T>,
        value: &T,
        targets: &[WindowHandle],
    ) -> Result<usize> {
        let payload = codec::to_payload_limited(value, self.max_payload_size)?;
        let mut delivered = 0;
        for window in targets {
            let peer = PeerId::Window(window.id().clone());
            if self.post(&peer, channel.id(), payload.clone()) {
                delivered += 1;
            }
        }
        debug!(channel = channel.id(), delivered, "message broadcast");
        Ok(delivered)
    }

    /// Encode and post to a single peer. Delivery failures are logged only.
    pub(crate) fn send_to<T: Serialize>(
        &self,
        channel: &MessageChannel<T>,
        value: &T,
        peer: &PeerId,
    ) -> Result<bool> {
        let payload = codec::to_payload_limited(value, self.max_payload_size)?;
        Ok(self.post(peer, channel.id(), payload))
    }

    fn post(&self, peer: &PeerId, channel: &str, payload: String) -> bool {
        let packet = Packet::Message {
            channel: channel.to_string(),
            payload,
        };
        match self.transport.post(peer, packet) {
            Ok(()) => true,
            Err(err) => {
                warn!(%peer, channel, error = %err, "message not delivered");
                false
            }
        }
    }
}

/// Run every listener of `channel` in registration order.
///
/// A message nobody listens to is dropped silently. A panicking listener is
/// logged and does not stop the ones after it.
pub(crate) fn deliver(listeners: &ListenerRegistry, from: &PeerId, channel: &str, payload: &str) {
    let handlers = listeners.message_handlers(channel);
    if handlers.is_empty() {
        debug!(%from, channel, "no listeners for message");
        return;
    }
    for handler in handlers {
        if panic::catch_unwind(AssertUnwindSafe(|| handler(payload))).is_err() {
            error!(%from, channel, "message listener panicked");
        }
    }
}
