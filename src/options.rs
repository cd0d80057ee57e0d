use crate::RetryConfig;

/// Configures HTTP timeout, retry and request compression behavior.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Per-request timeout in milliseconds, applied to each attempt.
    pub timeout_ms: u64,
    /// Retry settings for the transport stack.
    pub retry: RetryConfig,
    /// Gzip request bodies and send `Content-Encoding: gzip`. Individual
    /// calls can override this with [`crate::CallRequest::gzip`].
    pub gzip_requests: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            retry: RetryConfig::default(),
            gzip_requests: false,
        }
    }
}
