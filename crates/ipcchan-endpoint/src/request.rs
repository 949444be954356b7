//! Request/response over the transport.
//!
//! The calling side encodes the request, parks a oneshot in the pending
//! table under a fresh correlation id and posts the packet. The serving side
//! runs the single registered handler in its own task and posts back either
//! a `Response` or a `Failure` carrying the same correlation id.

use std::sync::Arc;

use ipcchan_channel::{codec, CorrelationId, Packet, RemoteError, RequestChannel};
use ipcchan_transport::{PeerId, Transport};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::config::EndpointConfig;
use crate::correlation::{CorrelationIdGenerator, PendingGuard, PendingRequests};
use crate::error::{ChannelError, Result};
use crate::listener::ListenerRegistry;

pub(crate) struct RequestDispatcher {
    transport: Arc<dyn Transport>,
    ids: Arc<dyn CorrelationIdGenerator>,
    pending: PendingRequests,
    config: EndpointConfig,
}

impl RequestDispatcher {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        ids: Arc<dyn CorrelationIdGenerator>,
        config: EndpointConfig,
    ) -> Self {
        Self {
            transport,
            ids,
            pending: PendingRequests::default(),
            config,
        }
    }

    /// Call `channel` on `target` and wait for its answer.
    ///
    /// Dropping the returned future abandons the call and frees its
    /// correlation entry.
    pub(crate) async fn call<Req, Res>(
        &self,
        channel: &RequestChannel<Req, Res>,
        value: &Req,
        target: PeerId,
    ) -> Result<Res>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let payload = codec::to_payload_limited(value, self.config.max_payload_size)?;
        let correlation_id = self.ids.next_id();

        let rx = self
            .pending
            .insert(correlation_id.clone(), channel.id(), target.clone());
        let _guard = PendingGuard::new(&self.pending, correlation_id.clone());

        let packet = Packet::Request {
            channel: channel.id().to_string(),
            correlation_id: correlation_id.clone(),
            payload,
        };
        self.transport.post(&target, packet)?;
        debug!(channel = channel.id(), %correlation_id, %target, "request sent");

        let settlement = match self.config.request_timeout {
            Some(limit) => tokio::time::timeout(limit, rx)
                .await
                .map_err(|_| ChannelError::Timeout(limit))?,
            None => rx.await,
        };
        let payload = settlement.map_err(|_| ChannelError::Disconnected(target))??;
        Ok(codec::from_payload(&payload)?)
    }

    /// Answer an inbound request.
    ///
    /// With no handler registered the caller is failed immediately.
    pub(crate) fn serve(
        &self,
        listeners: &ListenerRegistry,
        from: PeerId,
        channel: String,
        correlation_id: CorrelationId,
        payload: String,
    ) {
        let Some(handler) = listeners.request_handler(&channel) else {
            debug!(%from, channel = %channel, "request on unhandled channel");
            reply(
                self.transport.as_ref(),
                &from,
                correlation_id,
                Err(RemoteError::unhandled(&channel)),
            );
            return;
        };

        let transport = Arc::clone(&self.transport);
        let max_payload_size = self.config.max_payload_size;
        tokio::spawn(async move {
            let outcome = match tokio::spawn(async move { handler(payload).await }).await {
                Ok(Ok(response)) if response.len() > max_payload_size => {
                    Err(RemoteError::serialization(format!(
                        "response of {} bytes exceeds maximum {max_payload_size}",
                        response.len()
                    )))
                }
                Ok(outcome) => outcome,
                Err(err) if err.is_panic() => {
                    error!(channel = %channel, %correlation_id, "request handler panicked");
                    Err(RemoteError::handler("handler panicked"))
                }
                Err(_) => Err(RemoteError::handler("handler was cancelled")),
            };
            reply(transport.as_ref(), &from, correlation_id, outcome);
        });
    }

    pub(crate) fn settle(
        &self,
        correlation_id: &CorrelationId,
        outcome: std::result::Result<String, RemoteError>,
    ) {
        self.pending.settle(correlation_id, outcome);
    }

    /// Reject every outstanding call addressed to `peer`.
    pub(crate) fn fail_peer(&self, peer: &PeerId) -> usize {
        self.pending.fail_peer(peer)
    }

    /// Reject every outstanding call; nothing can answer them any more.
    pub(crate) fn fail_all(&self) -> usize {
        self.pending.fail_all()
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

fn reply(
    transport: &dyn Transport,
    to: &PeerId,
    correlation_id: CorrelationId,
    outcome: std::result::Result<String, RemoteError>,
) {
    let packet = match outcome {
        Ok(payload) => Packet::Response {
            correlation_id,
            payload,
        },
        Err(error) => Packet::Failure {
            correlation_id,
            error,
        },
    };
    if let Err(err) = transport.post(to, packet) {
        warn!(peer = %to, error = %err, "response not delivered");
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::time::Duration;

    use ipcchan_channel::RemoteErrorKind;
    use ipcchan_transport::{Inbound, InboundRx, LocalHub};

    use super::*;
    use crate::correlation::SequentialIds;

    const ECHO: RequestChannel<String, String> = RequestChannel::new("echo");

    fn dispatcher(hub: &Arc<LocalHub>, peer: PeerId, config: EndpointConfig) -> (RequestDispatcher, InboundRx) {
        let (transport, rx) = hub.attach(peer).unwrap();
        let ids = Arc::new(SequentialIds::new(config.correlation_prefix.clone()));
        (RequestDispatcher::new(Arc::new(transport), ids, config), rx)
    }

    async fn next_packet(rx: &mut InboundRx) -> Packet {
        match rx.recv().await.unwrap() {
            Inbound::Packet { packet, .. } => packet,
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn unhandled_request_fails_fast() {
        let hub = LocalHub::new();
        let (server, _server_rx) = dispatcher(&hub, PeerId::Main, EndpointConfig::default());
        let (_client, mut client_rx) =
            dispatcher(&hub, PeerId::Window("w1".into()), EndpointConfig::default());

        server.serve(
            &ListenerRegistry::new(),
            PeerId::Window("w1".into()),
            "nobody".to_string(),
            CorrelationId::new("req-1"),
            "null".to_string(),
        );

        match next_packet(&mut client_rx).await {
            Packet::Failure { error, .. } => {
                assert_eq!(error.kind, RemoteErrorKind::Unhandled);
                assert!(error.message.contains("nobody"));
            }
            other => panic!("unexpected packet {other:?}"),
        }
    }

    #[tokio::test]
    async fn panicking_handler_is_reported_as_failure() {
        let hub = LocalHub::new();
        let (server, _server_rx) = dispatcher(&hub, PeerId::Main, EndpointConfig::default());
        let (_client, mut client_rx) =
            dispatcher(&hub, PeerId::Window("w1".into()), EndpointConfig::default());

        let listeners = ListenerRegistry::new();
        listeners
            .register_request(&ECHO, |value: String| async move {
                if value == "x" {
                    panic!("boom");
                }
                Ok::<String, Infallible>(value)
            })
            .unwrap();

        server.serve(
            &listeners,
            PeerId::Window("w1".into()),
            "echo".to_string(),
            CorrelationId::new("req-9"),
            "\"x\"".to_string(),
        );

        match next_packet(&mut client_rx).await {
            Packet::Failure {
                correlation_id,
                error,
            } => {
                assert_eq!(correlation_id.as_str(), "req-9");
                assert_eq!(error.kind, RemoteErrorKind::Handler);
            }
            other => panic!("unexpected packet {other:?}"),
        }
    }

    #[tokio::test]
    async fn call_fails_when_target_is_not_attached() {
        let hub = LocalHub::new();
        let (client, _rx) = dispatcher(&hub, PeerId::Main, EndpointConfig::default());

        let err = client
            .call(&ECHO, &"hi".to_string(), PeerId::Window("ghost".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Transport(_)));
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn call_times_out_and_frees_the_entry() {
        let hub = LocalHub::new();
        let config = EndpointConfig::default().with_request_timeout(Duration::from_millis(20));
        let (client, _rx) = dispatcher(&hub, PeerId::Window("w1".into()), config);
        let (_server, _server_rx) = dispatcher(&hub, PeerId::Main, EndpointConfig::default());

        let err = client
            .call(&ECHO, &"hi".to_string(), PeerId::Main)
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Timeout(_)));
        assert_eq!(client.pending_count(), 0);
    }
}
