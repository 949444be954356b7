//! The two ends of the boundary.
//!
//! Each endpoint owns a listener registry and both dispatchers, and drains
//! its transport's inbound queue in a single task. Messages are delivered
//! inline by that task, so deliveries keep their send order; requests are
//! answered in spawned tasks and may complete in any order.

use std::collections::HashSet;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use ipcchan_channel::{define_request_channel, MessageChannel, Packet, RequestChannel};
use ipcchan_transport::{Inbound, InboundRx, PeerId, Transport, WindowId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::EndpointConfig;
use crate::correlation::{CorrelationIdGenerator, SequentialIds};
use crate::error::{ChannelError, Result};
use crate::lifecycle::{WindowHandle, WindowRegistry, WindowState};
use crate::listener::{ListenerId, ListenerRegistry};
use crate::message::{self, MessageDispatcher};
use crate::request::RequestDispatcher;

/// Request channel answered by [`MainEndpoint::expose_introspection`].
pub const DESCRIBE_CHANNEL: RequestChannel<(), Description> =
    define_request_channel("ipcchan:describe");

/// Snapshot of a main endpoint's channels and windows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    pub message_channels: Vec<String>,
    pub request_channels: Vec<String>,
    pub windows: Vec<WindowSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSummary {
    pub id: WindowId,
    pub state: WindowState,
}

/// State shared by an endpoint and its inbound pump.
struct Core {
    listeners: ListenerRegistry,
    messages: MessageDispatcher,
    requests: RequestDispatcher,
}

impl Core {
    fn new(
        transport: Arc<dyn Transport>,
        ids: Arc<dyn CorrelationIdGenerator>,
        config: EndpointConfig,
    ) -> Self {
        Self {
            listeners: ListenerRegistry::new(),
            messages: MessageDispatcher::new(Arc::clone(&transport), config.max_payload_size),
            requests: RequestDispatcher::new(transport, ids, config),
        }
    }

    fn dispatch(&self, from: PeerId, packet: Packet) {
        match packet {
            Packet::Message { channel, payload } => {
                message::deliver(&self.listeners, &from, &channel, &payload)
            }
            Packet::Request {
                channel,
                correlation_id,
                payload,
            } => self
                .requests
                .serve(&self.listeners, from, channel, correlation_id, payload),
            Packet::Response {
                correlation_id,
                payload,
            } => self.requests.settle(&correlation_id, Ok(payload)),
            Packet::Failure {
                correlation_id,
                error,
            } => self.requests.settle(&correlation_id, Err(error)),
            Packet::Ready => debug!(%from, "ignoring ready packet"),
        }
    }
}

fn default_ids(config: &EndpointConfig) -> Arc<dyn CorrelationIdGenerator> {
    Arc::new(SequentialIds::new(config.correlation_prefix.clone()))
}

/// Windows main closed while their connection is still up.
///
/// A `Ready` from one of these ids is ignored until its peer goes away, so a
/// closed window cannot start itself again.
#[derive(Debug, Default)]
struct Retired {
    ids: Mutex<HashSet<WindowId>>,
}

impl Retired {
    fn insert(&self, id: WindowId) {
        self.ids().insert(id);
    }

    fn contains(&self, id: &WindowId) -> bool {
        self.ids().contains(id)
    }

    fn forget(&self, id: &WindowId) {
        self.ids().remove(id);
    }

    fn ids(&self) -> MutexGuard<'_, HashSet<WindowId>> {
        self.ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// The backend side: tracks windows and broadcasts to the started ones.
pub struct MainEndpoint {
    core: Arc<Core>,
    windows: Arc<WindowRegistry>,
    retired: Arc<Retired>,
    pump: JoinHandle<()>,
}

impl MainEndpoint {
    /// Create the endpoint and start draining `inbound`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<T>(transport: T, inbound: InboundRx, config: EndpointConfig) -> Self
    where
        T: Transport + 'static,
    {
        let ids = default_ids(&config);
        Self::with_id_generator(transport, inbound, config, ids)
    }

    pub fn with_id_generator<T>(
        transport: T,
        inbound: InboundRx,
        config: EndpointConfig,
        ids: Arc<dyn CorrelationIdGenerator>,
    ) -> Self
    where
        T: Transport + 'static,
    {
        let core = Arc::new(Core::new(Arc::new(transport), ids, config));
        let windows = Arc::new(WindowRegistry::new());
        let retired = Arc::new(Retired::default());
        let pump = tokio::spawn(run_main(
            Arc::clone(&core),
            Arc::clone(&windows),
            Arc::clone(&retired),
            inbound,
        ));
        Self {
            core,
            windows,
            retired,
            pump,
        }
    }

    pub fn windows(&self) -> &WindowRegistry {
        &self.windows
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.core.listeners
    }

    pub fn create_window(&self, id: impl Into<WindowId>) -> Result<WindowHandle> {
        self.windows.create(id)
    }

    pub fn start_window(&self, handle: &WindowHandle) -> Result<()> {
        self.windows.start(handle)
    }

    /// Close a window and reject every request still waiting on it.
    ///
    /// The window stays closed for as long as its connection lasts; a later
    /// `Ready` from the same peer does not start it again.
    pub fn close_window(&self, handle: &WindowHandle) -> bool {
        let closed = self.windows.close(handle);
        if closed {
            self.retired.insert(handle.id().clone());
        }
        self.core
            .requests
            .fail_peer(&PeerId::Window(handle.id().clone()));
        closed
    }

    /// Deliver `value` to every window started at the time of the call.
    ///
    /// Fails only if `value` cannot be encoded.
    pub fn send_message<T: Serialize>(&self, channel: &MessageChannel<T>, value: &T) -> Result<()> {
        let targets = self.windows.list_started();
        self.core.messages.broadcast(channel, value, &targets)?;
        Ok(())
    }

    /// Call a request channel served by one started window.
    pub async fn request_window<Req, Res>(
        &self,
        window: &WindowId,
        channel: &RequestChannel<Req, Res>,
        value: &Req,
    ) -> Result<Res>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        match self.windows.get(window) {
            Some(handle) if handle.is_started() => {}
            _ => return Err(ChannelError::WindowNotStarted(window.clone())),
        }
        self.core
            .requests
            .call(channel, value, PeerId::Window(window.clone()))
            .await
    }

    pub fn register_message_listener<T, F>(&self, channel: &MessageChannel<T>, handler: F) -> ListenerId
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.core.listeners.register_message(channel, handler)
    }

    pub fn register_request_listener<Req, Res, E, F, Fut>(
        &self,
        channel: &RequestChannel<Req, Res>,
        handler: F,
    ) -> Result<()>
    where
        Req: DeserializeOwned + Send + 'static,
        Res: Serialize + Send + 'static,
        E: fmt::Display + Send + 'static,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Res, E>> + Send + 'static,
    {
        self.core.listeners.register_request(channel, handler)
    }

    pub fn remove_message_listener<T>(&self, channel: &MessageChannel<T>, id: ListenerId) -> bool {
        self.core.listeners.remove_message_listener(channel, id)
    }

    pub fn remove_request_listener<Req, Res>(&self, channel: &RequestChannel<Req, Res>) -> bool {
        self.core.listeners.remove_request_listener(channel)
    }

    /// Answer [`DESCRIBE_CHANNEL`] with the current channel and window tables.
    pub fn expose_introspection(&self) -> Result<()> {
        let core = Arc::downgrade(&self.core);
        let windows = Arc::downgrade(&self.windows);
        self.register_request_listener(&DESCRIBE_CHANNEL, move |()| {
            let description = describe(&core, &windows);
            async move { Ok::<_, Infallible>(description) }
        })
    }

    /// Requests this endpoint is still waiting on.
    pub fn pending_count(&self) -> usize {
        self.core.requests.pending_count()
    }
}

impl Drop for MainEndpoint {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

fn describe(core: &Weak<Core>, windows: &Weak<WindowRegistry>) -> Description {
    let (message_channels, request_channels) = match core.upgrade() {
        Some(core) => (
            core.listeners.message_channels(),
            core.listeners.request_channels(),
        ),
        None => Default::default(),
    };
    let windows = windows
        .upgrade()
        .map(|windows| {
            windows
                .list()
                .into_iter()
                .map(|handle| WindowSummary {
                    id: handle.id().clone(),
                    state: handle.state(),
                })
                .collect()
        })
        .unwrap_or_default();
    Description {
        message_channels,
        request_channels,
        windows,
    }
}

async fn run_main(
    core: Arc<Core>,
    windows: Arc<WindowRegistry>,
    retired: Arc<Retired>,
    mut inbound: InboundRx,
) {
    while let Some(event) = inbound.recv().await {
        match event {
            Inbound::PeerOpened(PeerId::Window(id)) => {
                if let Err(err) = windows.create(id.clone()) {
                    warn!(window = %id, error = %err, "connected window not registered");
                } else {
                    info!(window = %id, "window connected");
                }
            }
            Inbound::PeerOpened(PeerId::Main) => warn!("unexpected main peer on main endpoint"),
            Inbound::PeerClosed(peer) => {
                if let PeerId::Window(id) = &peer {
                    retired.forget(id);
                    if let Some(handle) = windows.get(id) {
                        windows.close(&handle);
                        info!(window = %id, "window disconnected");
                    }
                }
                core.requests.fail_peer(&peer);
            }
            Inbound::Packet {
                from: PeerId::Window(id),
                packet: Packet::Ready,
            } => {
                if retired.contains(&id) {
                    debug!(window = %id, "ready from closed window ignored");
                } else {
                    start_announced(&windows, id);
                }
            }
            Inbound::Packet { from, packet } => core.dispatch(from, packet),
        }
    }
    let failed = core.requests.fail_all();
    debug!(failed, "main inbound queue closed");
}

fn start_announced(windows: &WindowRegistry, id: WindowId) {
    let handle = match windows.get(&id) {
        Some(handle) => handle,
        None => match windows.create(id.clone()) {
            Ok(handle) => handle,
            Err(err) => {
                warn!(window = %id, error = %err, "ready window not registered");
                return;
            }
        },
    };
    if let Err(err) = windows.start(&handle) {
        warn!(window = %id, error = %err, "ready window not started");
    }
}

/// A UI side: talks to main only.
pub struct WindowEndpoint {
    id: WindowId,
    core: Arc<Core>,
    transport: Arc<dyn Transport>,
    pump: JoinHandle<()>,
}

impl WindowEndpoint {
    /// Create the endpoint and start draining `inbound`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<T>(
        id: impl Into<WindowId>,
        transport: T,
        inbound: InboundRx,
        config: EndpointConfig,
    ) -> Self
    where
        T: Transport + 'static,
    {
        let ids = default_ids(&config);
        Self::with_id_generator(id, transport, inbound, config, ids)
    }

    pub fn with_id_generator<T>(
        id: impl Into<WindowId>,
        transport: T,
        inbound: InboundRx,
        config: EndpointConfig,
        ids: Arc<dyn CorrelationIdGenerator>,
    ) -> Self
    where
        T: Transport + 'static,
    {
        let transport: Arc<dyn Transport> = Arc::new(transport);
        let core = Arc::new(Core::new(Arc::clone(&transport), ids, config));
        let pump = tokio::spawn(run_window(Arc::clone(&core), inbound));
        Self {
            id: id.into(),
            core,
            transport,
            pump,
        }
    }

    pub fn id(&self) -> &WindowId {
        &self.id
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.core.listeners
    }

    /// Tell main this window's listeners are in place.
    ///
    /// Until then main does not broadcast to it.
    pub fn ready(&self) -> Result<()> {
        self.transport.post(&PeerId::Main, Packet::Ready)?;
        debug!(window = %self.id, "ready announced");
        Ok(())
    }

    /// Deliver `value` to main. Fails only if `value` cannot be encoded.
    pub fn send_message<T: Serialize>(&self, channel: &MessageChannel<T>, value: &T) -> Result<()> {
        self.core.messages.send_to(channel, value, &PeerId::Main)?;
        Ok(())
    }

    /// Call a request channel served by main.
    pub async fn request<Req, Res>(&self, channel: &RequestChannel<Req, Res>, value: &Req) -> Result<Res>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        self.core.requests.call(channel, value, PeerId::Main).await
    }

    /// Call a request channel that takes no argument.
    pub async fn request_empty<Res>(&self, channel: &RequestChannel<(), Res>) -> Result<Res>
    where
        Res: DeserializeOwned,
    {
        self.request(channel, &()).await
    }

    pub fn register_message_listener<T, F>(&self, channel: &MessageChannel<T>, handler: F) -> ListenerId
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.core.listeners.register_message(channel, handler)
    }

    pub fn register_request_listener<Req, Res, E, F, Fut>(
        &self,
        channel: &RequestChannel<Req, Res>,
        handler: F,
    ) -> Result<()>
    where
        Req: DeserializeOwned + Send + 'static,
        Res: Serialize + Send + 'static,
        E: fmt::Display + Send + 'static,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Res, E>> + Send + 'static,
    {
        self.core.listeners.register_request(channel, handler)
    }

    pub fn remove_message_listener<T>(&self, channel: &MessageChannel<T>, id: ListenerId) -> bool {
        self.core.listeners.remove_message_listener(channel, id)
    }

    pub fn remove_request_listener<Req, Res>(&self, channel: &RequestChannel<Req, Res>) -> bool {
        self.core.listeners.remove_request_listener(channel)
    }

    pub fn pending_count(&self) -> usize {
        self.core.requests.pending_count()
    }
}

impl Drop for WindowEndpoint {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

async fn run_window(core: Arc<Core>, mut inbound: InboundRx) {
    while let Some(event) = inbound.recv().await {
        match event {
            Inbound::Packet { from, packet } => core.dispatch(from, packet),
            Inbound::PeerClosed(peer) => {
                let failed = core.requests.fail_peer(&peer);
                info!(%peer, failed, "peer disconnected");
            }
            Inbound::PeerOpened(peer) => debug!(%peer, "peer opened"),
        }
    }
    let failed = core.requests.fail_all();
    debug!(failed, "window inbound queue closed");
}
