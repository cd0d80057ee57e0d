//! `groundcover-http` is an async HTTP client for the groundcover REST API.
//!
//! Every request passes through a stack of [`Transport`] layers:
//! - [`AuthTransport`] stamps credentials, identity and `traceparent`
//!   headers and corrects known content-type quirks
//! - [`RetryTransport`] retries retryable statuses with jittered backoff
//! - [`ReqwestTransport`] talks to the network
//!
//! [`GroundcoverClient`] builds that stack and adds typed calls on top.

mod auth;
mod call;
mod client;
mod context;
mod error;
mod monitors;
mod options;
mod retry;
mod transport;
mod workflows;

pub use auth::{
    is_monitor_get_path, AuthTransport, TransportConfig, CONTENT_TYPE_JSON, CONTENT_TYPE_TEXT,
    CONTENT_TYPE_YAML, HEADER_BACKEND_ID, HEADER_TRACEPARENT, USER_AGENT,
};
pub use call::CallRequest;
pub use client::{ClientBuilder, GroundcoverClient};
pub use context::RequestContext;
pub use error::GroundcoverError;
pub use monitors::{CreateMonitorResponse, Monitors};
pub use options::ClientOptions;
pub use retry::{
    default_retry_statuses, RetryConfig, RetryPolicy, RetryTransport, DEFAULT_MAX_WAIT,
    DEFAULT_MIN_WAIT, DEFAULT_RETRY_COUNT,
};
pub use transport::{BoxFuture, LoggingTransport, ReqwestTransport, Transport, TransportBuilder};
pub use workflows::Workflows;

pub use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, GroundcoverError>;
