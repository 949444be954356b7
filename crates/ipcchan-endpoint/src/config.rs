use std::time::Duration;

use ipcchan_channel::DEFAULT_MAX_PAYLOAD;

/// Controls endpoint behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Fail requests that get no answer within this duration. `None` waits
    /// for as long as the peer stays connected.
    pub request_timeout: Option<Duration>,
    /// Maximum encoded payload size accepted for sending.
    pub max_payload_size: usize,
    /// Prefix for generated correlation ids.
    pub correlation_prefix: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            request_timeout: None,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            correlation_prefix: "req".to_string(),
        }
    }
}

impl EndpointConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_max_payload_size(mut self, max: usize) -> Self {
        self.max_payload_size = max;
        self
    }

    pub fn with_correlation_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.correlation_prefix = prefix.into();
        self
    }
}
