use std::time::Duration;

use ipcchan_channel::CodecError;
use ipcchan_transport::{PeerId, TransportError, WindowId};

/// Errors that can occur on a channel endpoint.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// A second handler was registered for a request channel.
    #[error(
        "Tried to register a multiple channel handlers for \"{0}\", only one handler is supported for a request channel."
    )]
    DuplicateHandler(String),

    /// The far side has no handler for the request channel.
    #[error("no handler registered for request channel \"{0}\"")]
    UnhandledRequest(String),

    /// The far side's handler failed.
    #[error("handler for \"{channel}\" failed: {message}")]
    Handler { channel: String, message: String },

    /// The far side could not decode the request or encode its response.
    #[error("remote serialization failed on \"{channel}\": {message}")]
    RemoteSerialization { channel: String, message: String },

    /// A payload could not cross the boundary on this side.
    #[error("serialization failed: {0}")]
    Serialization(#[from] CodecError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The window exists but is not (yet) a delivery target.
    #[error("window {0} is not started")]
    WindowNotStarted(WindowId),

    /// The window has been closed.
    #[error("window {0} is closed")]
    WindowClosed(WindowId),

    /// A live window already uses this id.
    #[error("window {0} already exists")]
    DuplicateWindow(WindowId),

    /// The peer went away before answering.
    #[error("peer {0} disconnected")]
    Disconnected(PeerId),

    /// No answer arrived in time.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
