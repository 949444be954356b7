use std::fmt;
use std::io;

use ipcchan_channel::CodecError;
use ipcchan_endpoint::ChannelError;
use ipcchan_transport::{FrameError, TransportError};

// Exit code constants aligned with rsfulmen/DDR-0002 semantics.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        TransportError::Frame(err) => frame_error(context, err),
        TransportError::PathTooLong { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } | FrameError::Packet(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn codec_error(context: &str, err: CodecError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn channel_error(context: &str, err: ChannelError) -> CliError {
    match err {
        ChannelError::Transport(err) => transport_error(context, err),
        ChannelError::Serialization(err) => codec_error(context, err),
        ChannelError::RemoteSerialization { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        ChannelError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        ChannelError::UnhandledRequest(_)
        | ChannelError::Handler { .. }
        | ChannelError::Disconnected(_) => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ipcchan_transport::PeerId;

    use super::*;

    #[test]
    fn timeouts_map_to_124() {
        let err = channel_error("request failed", ChannelError::Timeout(Duration::from_secs(1)));
        assert_eq!(err.code, TIMEOUT);
        assert!(err.message.starts_with("request failed: "));
    }

    #[test]
    fn missing_socket_is_a_plain_failure() {
        let err = transport_error(
            "connect failed",
            TransportError::Connect {
                path: "/tmp/absent.sock".into(),
                source: io::Error::from(io::ErrorKind::NotFound),
            },
        );
        assert_eq!(err.code, FAILURE);
    }

    #[test]
    fn remote_failures_are_failures() {
        let err = channel_error("request failed", ChannelError::UnhandledRequest("x".into()));
        assert_eq!(err.code, FAILURE);
        let err = channel_error("request failed", ChannelError::Disconnected(PeerId::Main));
        assert_eq!(err.code, FAILURE);
    }

    #[test]
    fn oversized_frames_are_invalid_data() {
        let err = frame_error("send failed", FrameError::PayloadTooLarge { size: 10, max: 1 });
        assert_eq!(err.code, DATA_INVALID);
    }
}
