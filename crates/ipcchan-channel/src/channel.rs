//! Channel identities.
//!
//! A channel value names a logical channel and pins its payload types. Two
//! channel values with the same id are the same channel; no payload is ever
//! stored on the value itself.

use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// The two kinds of channel the layer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Fire-and-forget, any number of listeners.
    Message,
    /// Request/response, at most one handler.
    Request,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Message => f.write_str("message"),
            ChannelKind::Request => f.write_str("request"),
        }
    }
}

/// A fire-and-forget channel carrying values of type `T`.
pub struct MessageChannel<T> {
    id: Cow<'static, str>,
    _payload: PhantomData<fn(T)>,
}

impl<T> MessageChannel<T> {
    /// Define a channel with a static id (usable in `const` items).
    pub const fn new(id: &'static str) -> Self {
        Self {
            id: Cow::Borrowed(id),
            _payload: PhantomData,
        }
    }

    /// Define a channel with an id computed at runtime.
    pub fn from_id(id: impl Into<String>) -> Self {
        Self {
            id: Cow::Owned(id.into()),
            _payload: PhantomData,
        }
    }

    /// The channel id.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub const fn kind(&self) -> ChannelKind {
        ChannelKind::Message
    }
}

/// A request/response channel taking `Req` and answering with `Res`.
pub struct RequestChannel<Req, Res> {
    id: Cow<'static, str>,
    _types: PhantomData<fn(Req) -> Res>,
}

impl<Req, Res> RequestChannel<Req, Res> {
    /// Define a channel with a static id (usable in `const` items).
    pub const fn new(id: &'static str) -> Self {
        Self {
            id: Cow::Borrowed(id),
            _types: PhantomData,
        }
    }

    /// Define a channel with an id computed at runtime.
    pub fn from_id(id: impl Into<String>) -> Self {
        Self {
            id: Cow::Owned(id.into()),
            _types: PhantomData,
        }
    }

    /// The channel id.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub const fn kind(&self) -> ChannelKind {
        ChannelKind::Request
    }
}

/// Define a message channel.
///
/// ```
/// use ipcchan_channel::{define_message_channel, MessageChannel};
///
/// const CLUSTER_STATE: MessageChannel<Vec<String>> = define_message_channel("cluster-state");
/// assert_eq!(CLUSTER_STATE.id(), "cluster-state");
/// ```
pub const fn define_message_channel<T>(id: &'static str) -> MessageChannel<T> {
    MessageChannel::new(id)
}

/// Define a request channel.
///
/// ```
/// use ipcchan_channel::{define_request_channel, RequestChannel};
///
/// const HELM_REPOS: RequestChannel<(), Vec<String>> = define_request_channel("helm-repos");
/// assert_eq!(HELM_REPOS.id(), "helm-repos");
/// ```
pub const fn define_request_channel<Req, Res>(id: &'static str) -> RequestChannel<Req, Res> {
    RequestChannel::new(id)
}

// Identity is the id alone, so none of these impls put bounds on the payload
// types the way `#[derive]` would.

impl<T> Clone for MessageChannel<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            _payload: PhantomData,
        }
    }
}

impl<T> fmt::Debug for MessageChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageChannel")
            .field("id", &self.id)
            .finish()
    }
}

impl<T> PartialEq for MessageChannel<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for MessageChannel<T> {}

impl<T> Hash for MessageChannel<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<Req, Res> Clone for RequestChannel<Req, Res> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            _types: PhantomData,
        }
    }
}

impl<Req, Res> fmt::Debug for RequestChannel<Req, Res> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestChannel")
            .field("id", &self.id)
            .finish()
    }
}

impl<Req, Res> PartialEq for RequestChannel<Req, Res> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<Req, Res> Eq for RequestChannel<Req, Res> {}

impl<Req, Res> Hash for RequestChannel<Req, Res> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::rc::Rc;

    use super::*;

    const PING: MessageChannel<String> = define_message_channel("ping");
    const ECHO: RequestChannel<String, String> = define_request_channel("echo");

    #[test]
    fn same_id_means_same_channel() {
        let runtime: MessageChannel<String> = MessageChannel::from_id(String::from("ping"));
        assert_eq!(PING, runtime);

        let mut set = HashSet::new();
        set.insert(PING.clone());
        set.insert(runtime);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn different_ids_are_distinct() {
        let other: RequestChannel<String, String> = RequestChannel::from_id("echo-2");
        assert_ne!(ECHO, other);
    }

    #[test]
    fn kinds_are_fixed_by_type() {
        assert_eq!(PING.kind(), ChannelKind::Message);
        assert_eq!(ECHO.kind(), ChannelKind::Request);
        assert_eq!(ChannelKind::Request.to_string(), "request");
    }

    #[test]
    fn channels_are_send_sync_for_any_payload() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MessageChannel<Rc<u8>>>();
        assert_send_sync::<RequestChannel<Rc<u8>, Rc<u8>>>();
    }

    #[test]
    fn debug_shows_id_only() {
        assert_eq!(format!("{ECHO:?}"), "RequestChannel { id: \"echo\" }");
    }
}
