use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies one outstanding request, unique per call rather than per channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a request failed on the far side of the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// No handler is registered for the channel.
    Unhandled,
    /// The handler returned an error or panicked.
    Handler,
    /// The request or response payload did not survive the codec.
    Serialization,
}

/// A per-call failure in its serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn unhandled(channel: &str) -> Self {
        Self {
            kind: RemoteErrorKind::Unhandled,
            message: format!("no handler registered for request channel \"{channel}\""),
        }
    }

    pub fn handler(message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::Handler,
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::Serialization,
            message: message.into(),
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Unit of delivery between processes.
///
/// Payloads are already-encoded JSON text (see [`crate::codec`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Packet {
    /// One-way delivery on a message channel.
    Message { channel: String, payload: String },
    /// A call on a request channel.
    Request {
        channel: String,
        correlation_id: CorrelationId,
        payload: String,
    },
    /// Successful reply to the request with the same correlation id.
    Response {
        correlation_id: CorrelationId,
        payload: String,
    },
    /// Failed reply to the request with the same correlation id.
    Failure {
        correlation_id: CorrelationId,
        error: RemoteError,
    },
    /// A window has registered its listeners and may receive broadcasts.
    Ready,
}

impl Packet {
    /// Short name of the packet type, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Message { .. } => "message",
            Packet::Request { .. } => "request",
            Packet::Response { .. } => "response",
            Packet::Failure { .. } => "failure",
            Packet::Ready => "ready",
        }
    }

    /// The channel id this packet travels on, if it names one.
    pub fn channel(&self) -> Option<&str> {
        match self {
            Packet::Message { channel, .. } | Packet::Request { channel, .. } => Some(channel),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_wire_shape() {
        let packet = Packet::Request {
            channel: "echo".to_string(),
            correlation_id: CorrelationId::new("req-1"),
            payload: "\"hello\"".to_string(),
        };
        let value = serde_json::to_value(&packet).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "request",
                "channel": "echo",
                "correlation_id": "req-1",
                "payload": "\"hello\""
            })
        );
    }

    #[test]
    fn failure_wire_shape() {
        let packet = Packet::Failure {
            correlation_id: CorrelationId::new("req-7"),
            error: RemoteError::unhandled("dup"),
        };
        let value = serde_json::to_value(&packet).unwrap();
        assert_eq!(value["type"], "failure");
        assert_eq!(value["error"]["kind"], "unhandled");
        assert_eq!(
            value["error"]["message"],
            "no handler registered for request channel \"dup\""
        );
    }

    #[test]
    fn ready_has_only_a_tag() {
        assert_eq!(
            serde_json::to_string(&Packet::Ready).unwrap(),
            r#"{"type":"ready"}"#
        );
        let back: Packet = serde_json::from_str(r#"{"type":"ready"}"#).unwrap();
        assert_eq!(back, Packet::Ready);
    }

    #[test]
    fn unknown_packet_type_is_rejected() {
        let err = serde_json::from_str::<Packet>(r#"{"type":"subscribe","channel":"x"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn kind_and_channel_accessors() {
        let packet = Packet::Message {
            channel: "ping".to_string(),
            payload: "null".to_string(),
        };
        assert_eq!(packet.kind(), "message");
        assert_eq!(packet.channel(), Some("ping"));
        assert_eq!(Packet::Ready.kind(), "ready");
        assert_eq!(Packet::Ready.channel(), None);
    }
}
