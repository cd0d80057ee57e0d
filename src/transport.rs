use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use reqwest::{Request, Response};

use crate::{
    AuthTransport, GroundcoverError, RequestContext, Result, RetryConfig, RetryPolicy,
    RetryTransport, TransportConfig,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Executes one HTTP request and yields one response or an error.
///
/// Implementations borrow the request and must not alter what the caller
/// handed them; any layer that needs different headers works on a clone.
/// Non-2xx statuses are ordinary responses at this level.
pub trait Transport: Send + Sync {
    fn round_trip<'a>(
        &'a self,
        request: &'a Request,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<Response>>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn round_trip<'a>(
        &'a self,
        request: &'a Request,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<Response>> {
        (**self).round_trip(request, ctx)
    }
}

pub(crate) fn clone_request(request: &Request) -> Result<Request> {
    request.try_clone().ok_or_else(|| {
        GroundcoverError::Build(format!(
            "request body for {} {} cannot be cloned",
            request.method(),
            request.url().path()
        ))
    })
}

/// Network transport backed by a [`reqwest::Client`].
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    /// Uses `http` for connections, so proxy and TLS settings carry over.
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl Transport for ReqwestTransport {
    fn round_trip<'a>(
        &'a self,
        request: &'a Request,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<Response>> {
        Box::pin(async move {
            let request = clone_request(request)?;
            ctx.guard(async {
                self.http
                    .execute(request)
                    .await
                    .map_err(GroundcoverError::Transport)
            })
            .await
        })
    }
}

/// Decorator that logs every round trip at debug level.
///
/// Only method, path, status and timing are recorded. Emits nothing unless
/// the `tracing` feature is enabled.
pub struct LoggingTransport {
    inner: Arc<dyn Transport>,
}

impl LoggingTransport {
    pub fn new(inner: Arc<dyn Transport>) -> Self {
        Self { inner }
    }
}

impl Transport for LoggingTransport {
    fn round_trip<'a>(
        &'a self,
        request: &'a Request,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<Response>> {
        Box::pin(async move {
            #[cfg(feature = "tracing")]
            let started = std::time::Instant::now();
            #[cfg(feature = "tracing")]
            tracing::debug!(
                method = %request.method(),
                path = request.url().path(),
                "sending request"
            );

            let result = self.inner.round_trip(request, ctx).await;

            #[cfg(feature = "tracing")]
            match &result {
                Ok(response) => tracing::debug!(
                    method = %request.method(),
                    path = request.url().path(),
                    status = response.status().as_u16(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "received response"
                ),
                Err(err) => tracing::debug!(
                    method = %request.method(),
                    path = request.url().path(),
                    error = %err,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "request failed"
                ),
            }

            result
        })
    }
}

type TransportWrapper = Box<dyn FnOnce(Arc<dyn Transport>) -> Arc<dyn Transport> + Send>;

/// Assembles the transport stack used by [`crate::GroundcoverClient`].
///
/// From the inside out: base network transport, [`RetryTransport`],
/// [`AuthTransport`], then every wrapper in the order it was added.
pub struct TransportBuilder {
    api_key: String,
    backend_id: String,
    traceparent: Option<String>,
    base: Option<Arc<dyn Transport>>,
    retry: RetryConfig,
    wrappers: Vec<TransportWrapper>,
}

impl fmt::Debug for TransportBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportBuilder")
            .field("api_key", &"<redacted>")
            .field("backend_id", &self.backend_id)
            .field("traceparent", &self.traceparent)
            .field("custom_base", &self.base.is_some())
            .field("retry", &self.retry)
            .field("wrappers", &self.wrappers.len())
            .finish()
    }
}

impl TransportBuilder {
    pub fn new(api_key: impl Into<String>, backend_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            backend_id: backend_id.into(),
            traceparent: None,
            base: None,
            retry: RetryConfig::default(),
            wrappers: Vec::new(),
        }
    }

    /// Replaces the network transport underneath the retry layer.
    pub fn base_transport<T>(mut self, transport: T) -> Self
    where
        T: Transport + 'static,
    {
        self.base = Some(Arc::new(transport));
        self
    }

    /// Shorthand for a [`ReqwestTransport`] built from a configured client.
    pub fn http_client(self, http: reqwest::Client) -> Self {
        self.base_transport(ReqwestTransport::new(http))
    }

    /// Default `traceparent` for requests whose context carries none.
    pub fn traceparent(mut self, traceparent: impl Into<String>) -> Self {
        self.traceparent = Some(traceparent.into());
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Wraps the finished stack. Wrappers apply in insertion order, so the
    /// last one added sees requests first.
    pub fn wrap<F>(mut self, wrapper: F) -> Self
    where
        F: FnOnce(Arc<dyn Transport>) -> Arc<dyn Transport> + Send + 'static,
    {
        self.wrappers.push(Box::new(wrapper));
        self
    }

    pub fn with_logging(self) -> Self {
        self.wrap(|inner| -> Arc<dyn Transport> { Arc::new(LoggingTransport::new(inner)) })
    }

    pub fn build(self) -> Arc<dyn Transport> {
        let base = self
            .base
            .unwrap_or_else(|| -> Arc<dyn Transport> { Arc::new(ReqwestTransport::default()) });
        let retrying = Arc::new(RetryTransport::new(base, RetryPolicy::new(self.retry)));
        let mut config = TransportConfig::new(self.api_key, self.backend_id);
        if let Some(traceparent) = self.traceparent {
            config = config.with_traceparent(traceparent);
        }

        let mut transport: Arc<dyn Transport> = Arc::new(AuthTransport::new(config, retrying));
        for wrapper in self.wrappers {
            transport = wrapper(transport);
        }
        transport
    }
}
