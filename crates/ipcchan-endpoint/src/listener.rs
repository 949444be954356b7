use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures_util::future::{self, BoxFuture, FutureExt};
use ipcchan_channel::{codec, MessageChannel, RemoteError, RequestChannel};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{ChannelError, Result};

/// Type-erased message listener: receives the encoded payload.
pub(crate) type MessageHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Type-erased request handler: encoded request in, encoded response out.
pub(crate) type RequestHandler =
    Arc<dyn Fn(String) -> BoxFuture<'static, std::result::Result<String, RemoteError>> + Send + Sync>;

/// Identifies one message listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct MessageListener {
    id: ListenerId,
    handler: MessageHandler,
}

/// Per-channel handler table for one process.
///
/// Message channels take any number of listeners; request channels take at
/// most one handler.
#[derive(Default)]
pub struct ListenerRegistry {
    messages: RwLock<HashMap<String, Vec<MessageListener>>>,
    requests: RwLock<HashMap<String, RequestHandler>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener to a message channel. Always succeeds.
    ///
    /// A payload that does not decode into `T` is logged and skipped for
    /// this listener.
    pub fn register_message<T, F>(&self, channel: &MessageChannel<T>, handler: F) -> ListenerId
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let channel_id = channel.id().to_string();
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));

        let log_channel = channel_id.clone();
        let erased: MessageHandler =
            Arc::new(move |payload: &str| match codec::from_payload::<T>(payload) {
                Ok(value) => handler(value),
                Err(err) => {
                    warn!(channel = %log_channel, error = %err, "dropping undecodable message")
                }
            });

        self.messages_mut()
            .entry(channel_id.clone())
            .or_default()
            .push(MessageListener {
                id,
                handler: erased,
            });
        debug!(channel = %channel_id, "message listener registered");
        id
    }

    /// Install the handler for a request channel.
    ///
    /// Fails with [`ChannelError::DuplicateHandler`] if the channel already
    /// has one.
    pub fn register_request<Req, Res, E, F, Fut>(
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
        let erased: RequestHandler = Arc::new(move |payload: String| {
            let request = match codec::from_payload::<Req>(&payload) {
                Ok(request) => request,
                Err(err) => {
                    return future::ready(Err(RemoteError::serialization(err.to_string()))).boxed()
                }
            };
            let response = handler(request);
            async move {
                let response = response
                    .await
                    .map_err(|err| RemoteError::handler(err.to_string()))?;
                codec::to_payload(&response).map_err(|err| RemoteError::serialization(err.to_string()))
            }
            .boxed()
        });

        match self.requests_mut().entry(channel.id().to_string()) {
            Entry::Occupied(slot) => Err(ChannelError::DuplicateHandler(slot.key().clone())),
            Entry::Vacant(slot) => {
                debug!(channel = %slot.key(), "request handler registered");
                slot.insert(erased);
                Ok(())
            }
        }
    }

    /// Remove one message listener. Returns whether it was registered.
    pub fn remove_message_listener<T>(&self, channel: &MessageChannel<T>, id: ListenerId) -> bool {
        let mut messages = self.messages_mut();
        let Some(listeners) = messages.get_mut(channel.id()) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|listener| listener.id != id);
        let removed = listeners.len() != before;
        if listeners.is_empty() {
            messages.remove(channel.id());
        }
        removed
    }

    /// Remove the handler of a request channel so it can be registered again.
    pub fn remove_request_listener<Req, Res>(&self, channel: &RequestChannel<Req, Res>) -> bool {
        self.requests_mut().remove(channel.id()).is_some()
    }

    /// Listeners of a message channel at this instant (possibly empty).
    pub(crate) fn message_handlers(&self, channel_id: &str) -> Vec<MessageHandler> {
        self.messages()
            .get(channel_id)
            .map(|listeners| {
                listeners
                    .iter()
                    .map(|listener| Arc::clone(&listener.handler))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The handler of a request channel, if one is registered.
    pub(crate) fn request_handler(&self, channel_id: &str) -> Option<RequestHandler> {
        self.requests().get(channel_id).cloned()
    }

    pub fn message_listener_count(&self, channel_id: &str) -> usize {
        self.messages().get(channel_id).map_or(0, Vec::len)
    }

    pub fn has_request_handler(&self, channel_id: &str) -> bool {
        self.requests().contains_key(channel_id)
    }

    /// Message channel ids with at least one listener, sorted.
    pub fn message_channels(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.messages().keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Request channel ids with a handler, sorted.
    pub fn request_channels(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.requests().keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    fn messages(&self) -> RwLockReadGuard<'_, HashMap<String, Vec<MessageListener>>> {
        self.messages
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn messages_mut(&self) -> RwLockWriteGuard<'_, HashMap<String, Vec<MessageListener>>> {
        self.messages
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn requests(&self) -> RwLockReadGuard<'_, HashMap<String, RequestHandler>> {
        self.requests
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn requests_mut(&self) -> RwLockWriteGuard<'_, HashMap<String, RequestHandler>> {
        self.requests
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("message_channels", &self.message_channels())
            .field("request_channels", &self.request_channels())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::Mutex;

    use ipcchan_channel::{define_message_channel, define_request_channel, RemoteErrorKind};

    use super::*;

    const PING: MessageChannel<String> = define_message_channel("ping");
    const DUP: RequestChannel<String, String> = define_request_channel("dup");

    fn echo(registry: &ListenerRegistry, channel: &RequestChannel<String, String>) -> Result<()> {
        registry.register_request(channel, |value: String| async move {
            Ok::<_, Infallible>(value)
        })
    }

    #[test]
    fn second_request_handler_is_rejected_with_channel_id() {
        let registry = ListenerRegistry::new();
        echo(&registry, &DUP).unwrap();

        let err = echo(&registry, &DUP).unwrap_err();
        assert!(matches!(err, ChannelError::DuplicateHandler(ref id) if id == "dup"));
        assert_eq!(
            err.to_string(),
            "Tried to register a multiple channel handlers for \"dup\", only one handler is supported for a request channel."
        );
    }

    #[test]
    fn same_definition_with_different_ids_does_not_conflict() {
        let registry = ListenerRegistry::new();
        let first: RequestChannel<String, String> = RequestChannel::from_id("repos-1");
        let second: RequestChannel<String, String> = RequestChannel::from_id("repos-2");
        echo(&registry, &first).unwrap();
        echo(&registry, &second).unwrap();
        assert_eq!(registry.request_channels(), vec!["repos-1", "repos-2"]);
    }

    #[test]
    fn removing_request_handler_allows_registration_again() {
        let registry = ListenerRegistry::new();
        echo(&registry, &DUP).unwrap();
        assert!(registry.remove_request_listener(&DUP));
        assert!(!registry.remove_request_listener(&DUP));
        assert!(!registry.has_request_handler("dup"));
        echo(&registry, &DUP).unwrap();
    }

    #[test]
    fn message_channels_take_many_listeners() {
        let registry = ListenerRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let seen = Arc::clone(&seen);
            registry.register_message(&PING, move |value: String| {
                seen.lock().unwrap().push(format!("{tag}:{value}"));
            });
        }
        assert_eq!(registry.message_listener_count("ping"), 3);

        for handler in registry.message_handlers("ping") {
            handler("\"x\"");
        }
        assert_eq!(*seen.lock().unwrap(), vec!["a:x", "b:x", "c:x"]);
    }

    #[test]
    fn lookup_of_unknown_channels_is_empty() {
        let registry = ListenerRegistry::new();
        assert!(registry.message_handlers("nobody").is_empty());
        assert!(registry.request_handler("nobody").is_none());
    }

    #[test]
    fn removing_a_message_listener_keeps_the_others() {
        let registry = ListenerRegistry::new();
        let first = registry.register_message(&PING, |_: String| {});
        let _second = registry.register_message(&PING, |_: String| {});

        assert!(registry.remove_message_listener(&PING, first));
        assert!(!registry.remove_message_listener(&PING, first));
        assert_eq!(registry.message_listener_count("ping"), 1);
    }

    #[test]
    fn undecodable_message_is_skipped() {
        let registry = ListenerRegistry::new();
        let counter: MessageChannel<u32> = MessageChannel::from_id("count");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        registry.register_message(&counter, move |n: u32| sink.lock().unwrap().push(n));

        for handler in registry.message_handlers("count") {
            handler("\"seven\"");
            handler("7");
        }
        assert_eq!(*seen.lock().unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn erased_request_handler_reports_failures_by_kind() {
        let registry = ListenerRegistry::new();
        let parse: RequestChannel<u32, u32> = RequestChannel::from_id("parse");
        registry
            .register_request(&parse, |n: u32| async move {
                if n == 0 {
                    Err("zero is not allowed")
                } else {
                    Ok(n * 2)
                }
            })
            .unwrap();

        let handler = registry.request_handler("parse").unwrap();
        assert_eq!(handler("21".to_string()).await.unwrap(), "42");

        let err = handler("0".to_string()).await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::Handler);
        assert_eq!(err.message, "zero is not allowed");

        let err = handler("\"nan\"".to_string()).await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::Serialization);
    }
}
