/// Errors raised while crossing the payload boundary.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The value could not be represented as JSON.
    #[error("failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),

    /// The payload did not decode into the expected type.
    #[error("failed to decode payload: {0}")]
    Decode(#[source] serde_json::Error),

    /// The encoded payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, CodecError>;
