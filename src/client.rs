use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use flate2::{write::GzEncoder, Compression};
use reqwest::{header, Response, Url};
use serde::de::DeserializeOwned;

use crate::{
    auth::CONTENT_TYPE_YAML,
    call::join_path,
    CallRequest, ClientOptions, GroundcoverError, Monitors, RequestContext, Result, Transport,
    TransportBuilder, Workflows,
};

/// HTTP client for the groundcover REST API.
///
/// Requests flow through the transport stack assembled by
/// [`TransportBuilder`]: auth headers, content-type fixups and retries.
#[derive(Clone)]
pub struct GroundcoverClient {
    http: reqwest::Client,
    transport: Arc<dyn Transport>,
    base_url: Url,
    backend_id: String,
    options: ClientOptions,
}

impl fmt::Debug for GroundcoverClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroundcoverClient")
            .field("base_url", &self.base_url.as_str())
            .field("backend_id", &self.backend_id)
            .field("api_key", &"<redacted>")
            .field("options", &self.options)
            .finish()
    }
}

impl GroundcoverClient {
    /// Creates a client with default options.
    pub fn new(
        base_url: impl AsRef<str>,
        api_key: impl Into<String>,
        backend_id: impl Into<String>,
    ) -> Result<Self> {
        Self::builder(base_url, api_key, backend_id).build()
    }

    pub fn builder(
        base_url: impl AsRef<str>,
        api_key: impl Into<String>,
        backend_id: impl Into<String>,
    ) -> ClientBuilder {
        ClientBuilder::new(base_url.as_ref(), api_key.into(), backend_id.into())
    }

    /// Creates a client from environment variables.
    ///
    /// Reads:
    /// - `GROUNDCOVER_API_URL` — API base URL (e.g. `https://api.groundcover.com`)
    /// - `GROUNDCOVER_API_KEY` — API key, sent as a bearer token
    /// - `GROUNDCOVER_BACKEND_ID` — backend to route requests to
    ///
    /// Returns an error if any variable is missing or empty.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use groundcover_http::GroundcoverClient;
    ///
    /// let client = GroundcoverClient::from_env().expect("missing GROUNDCOVER_* env vars");
    /// ```
    pub fn from_env() -> std::result::Result<Self, String> {
        let base_url = required_env("GROUNDCOVER_API_URL")?;
        let api_key = required_env("GROUNDCOVER_API_KEY")?;
        let backend_id = required_env("GROUNDCOVER_BACKEND_ID")?;
        Self::new(base_url, api_key, backend_id).map_err(|err| err.to_string())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn backend_id(&self) -> &str {
        &self.backend_id
    }

    /// The assembled transport stack, for issuing hand-built requests.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn monitors(&self) -> Monitors<'_> {
        Monitors::new(self)
    }

    pub fn workflows(&self) -> Workflows<'_> {
        Workflows::new(self)
    }

    /// Sends `call` and returns the raw response whatever its status.
    pub async fn send(&self, call: &CallRequest, ctx: &RequestContext) -> Result<Response> {
        let url = self.call_url(call);
        let mut builder = self
            .http
            .request(call.method.clone(), url)
            .timeout(Duration::from_millis(self.options.timeout_ms));
        if let Some(body) = &call.body {
            builder = builder.header(header::CONTENT_TYPE, call.content_type);
            builder = if call.gzip.unwrap_or(self.options.gzip_requests) {
                builder
                    .header(header::CONTENT_ENCODING, "gzip")
                    .body(gzip_body(body)?)
            } else {
                builder.body(body.clone())
            };
        }
        let request = builder
            .build()
            .map_err(|err| GroundcoverError::Build(format!("invalid request: {err}")))?;

        self.transport.round_trip(&request, ctx).await
    }

    /// Sends `call` and returns the body of a 2xx response.
    ///
    /// Any other status becomes [`GroundcoverError::Http`].
    pub async fn call_bytes(&self, call: &CallRequest, ctx: &RequestContext) -> Result<Bytes> {
        self.fetch(call, ctx).await.map(|(_, body)| body)
    }

    /// Sends `call` and decodes the body of a 2xx response.
    ///
    /// YAML-labelled responses are decoded as YAML, everything else as JSON.
    /// An empty body decodes as `null`, which suits `()` and `Option<T>`.
    pub async fn call<T: DeserializeOwned>(
        &self,
        call: &CallRequest,
        ctx: &RequestContext,
    ) -> Result<T> {
        let (content_type, body) = self.fetch(call, ctx).await?;
        decode_body(content_type.as_deref(), &body)
    }

    async fn fetch(
        &self,
        call: &CallRequest,
        ctx: &RequestContext,
    ) -> Result<(Option<String>, Bytes)> {
        let response = self.send(call, ctx).await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = ctx
            .guard(async { response.bytes().await.map_err(GroundcoverError::Transport) })
            .await?;

        if !status.is_success() {
            return Err(GroundcoverError::Http {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok((content_type, body))
    }

    fn call_url(&self, call: &CallRequest) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(&join_path(self.base_url.path(), &call.path));
        if !call.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&call.query);
        }
        url
    }
}

fn gzip_body(body: &[u8]) -> Result<Vec<u8>> {
    let encode_err = |err: std::io::Error| {
        GroundcoverError::Encode(format!("failed to gzip request body: {err}"))
    };
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body).map_err(encode_err)?;
    encoder.finish().map_err(encode_err)
}

fn decode_body<T: DeserializeOwned>(content_type: Option<&str>, body: &[u8]) -> Result<T> {
    let body: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        body
    };

    if content_type.is_some_and(|value| value.starts_with(CONTENT_TYPE_YAML)) {
        return serde_yaml::from_slice(body).map_err(|err| {
            GroundcoverError::Decode(format!(
                "invalid YAML response: {err}; body: {}",
                String::from_utf8_lossy(body)
            ))
        });
    }

    serde_json::from_slice(body).map_err(|err| {
        GroundcoverError::Decode(format!(
            "invalid JSON response: {err}; body: {}",
            String::from_utf8_lossy(body)
        ))
    })
}

fn required_env(name: &str) -> std::result::Result<String, String> {
    let value =
        std::env::var(name).map_err(|_| format!("missing {name} environment variable"))?;
    if value.trim().is_empty() {
        return Err(format!("{name} is set but empty"));
    }
    Ok(value)
}

/// Builder for [`GroundcoverClient`].
#[derive(Debug)]
pub struct ClientBuilder {
    base_url: String,
    backend_id: String,
    transport: TransportBuilder,
    options: ClientOptions,
}

impl ClientBuilder {
    fn new(base_url: &str, api_key: String, backend_id: String) -> Self {
        Self {
            base_url: base_url.trim().to_owned(),
            transport: TransportBuilder::new(api_key, backend_id.clone()),
            backend_id,
            options: ClientOptions::default(),
        }
    }

    /// Applies timeout and retry options.
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Replaces the network transport (proxies, TLS, test doubles).
    pub fn base_transport<T>(mut self, transport: T) -> Self
    where
        T: Transport + 'static,
    {
        self.transport = self.transport.base_transport(transport);
        self
    }

    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.transport = self.transport.http_client(http);
        self
    }

    /// Wraps the final transport; see [`TransportBuilder::wrap`].
    pub fn wrap<F>(mut self, wrapper: F) -> Self
    where
        F: FnOnce(Arc<dyn Transport>) -> Arc<dyn Transport> + Send + 'static,
    {
        self.transport = self.transport.wrap(wrapper);
        self
    }

    pub fn with_logging(mut self) -> Self {
        self.transport = self.transport.with_logging();
        self
    }

    /// Sends `traceparent` on every request unless the call's
    /// [`RequestContext`] carries its own.
    pub fn traceparent(mut self, traceparent: impl Into<String>) -> Self {
        self.transport = self.transport.traceparent(traceparent);
        self
    }

    pub fn build(self) -> Result<GroundcoverClient> {
        let base_url = Url::parse(&self.base_url).map_err(|err| {
            GroundcoverError::Build(format!("invalid base URL '{}': {err}", self.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(GroundcoverError::Build(format!(
                "base URL '{}' cannot carry a path",
                self.base_url
            )));
        }

        let transport = self.transport.retry(self.options.retry.clone()).build();

        Ok(GroundcoverClient {
            http: reqwest::Client::new(),
            transport,
            base_url,
            backend_id: self.backend_id,
            options: self.options,
        })
    }
}
