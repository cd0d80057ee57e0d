use std::fmt;
use std::sync::Arc;

use reqwest::header::{self, HeaderName, HeaderValue};
use reqwest::{Method, Request, Response, StatusCode};

use crate::transport::{clone_request, BoxFuture, Transport};
use crate::{GroundcoverError, RequestContext, Result};

pub const HEADER_BACKEND_ID: &str = "x-backend-id";
pub const HEADER_TRACEPARENT: &str = "traceparent";
pub const USER_AGENT: &str = "groundcover-rust-sdk";

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_YAML: &str = "application/x-yaml";
pub const CONTENT_TYPE_TEXT: &str = "text/plain";

const WORKFLOW_CREATE_PATH: &str = "/api/workflows/create";
const MONITORS_PREFIX: &str = "/api/monitors/";

/// Credentials and identity stamped on every request.
///
/// Built once and shared read-only between all in-flight calls.
#[derive(Clone)]
pub struct TransportConfig {
    api_key: String,
    backend_id: String,
    traceparent: Option<String>,
}

impl fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportConfig")
            .field("api_key", &"<redacted>")
            .field("backend_id", &self.backend_id)
            .field("traceparent", &self.traceparent)
            .finish()
    }
}

impl TransportConfig {
    pub fn new(api_key: impl Into<String>, backend_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            backend_id: backend_id.into(),
            traceparent: None,
        }
    }

    /// Client-wide `traceparent`, used when the request context has none.
    pub fn with_traceparent(mut self, traceparent: impl Into<String>) -> Self {
        self.traceparent = Some(traceparent.into()).filter(|value| !value.is_empty());
        self
    }

    pub fn backend_id(&self) -> &str {
        &self.backend_id
    }

    pub fn traceparent(&self) -> Option<&str> {
        self.traceparent.as_deref()
    }
}

/// Adds authentication and identity headers, then hands off to the
/// retrying transport.
///
/// Also papers over two backend content-type quirks:
/// - `POST /api/workflows/create` takes a raw string body and is always sent
///   as `text/plain`.
/// - `GET /api/monitors/{id}` answers with YAML but an unreliable
///   `Content-Type`, so successful responses are relabelled
///   `application/x-yaml`.
pub struct AuthTransport {
    config: Arc<TransportConfig>,
    inner: Arc<dyn Transport>,
}

impl AuthTransport {
    pub fn new(config: TransportConfig, inner: Arc<dyn Transport>) -> Self {
        Self {
            config: Arc::new(config),
            inner,
        }
    }

    fn decorate(&self, request: &Request, ctx: &RequestContext) -> Result<Request> {
        let mut outgoing = clone_request(request)?;
        let headers = outgoing.headers_mut();

        headers.insert(
            header::AUTHORIZATION,
            header_value(&format!("Bearer {}", self.config.api_key))?,
        );
        headers.insert(
            HeaderName::from_static(HEADER_BACKEND_ID),
            header_value(&self.config.backend_id)?,
        );
        headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));

        if let Some(traceparent) = ctx.traceparent().or(self.config.traceparent()) {
            headers.insert(
                HeaderName::from_static(HEADER_TRACEPARENT),
                header_value(traceparent)?,
            );
        }

        // Matched against the percent-encoded path, like `is_monitor_get_path`.
        if *outgoing.method() == Method::POST && outgoing.url().path() == WORKFLOW_CREATE_PATH {
            outgoing.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(CONTENT_TYPE_TEXT),
            );
        }

        Ok(outgoing)
    }
}

impl Transport for AuthTransport {
    fn round_trip<'a>(
        &'a self,
        request: &'a Request,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<Response>> {
        Box::pin(async move {
            let outgoing = self.decorate(request, ctx)?;
            let mut response = self.inner.round_trip(&outgoing, ctx).await?;

            if *outgoing.method() == Method::GET
                && response.status() == StatusCode::OK
                && is_monitor_get_path(outgoing.url().path())
            {
                relabel_as_yaml(&mut response);
            }

            Ok(response)
        })
    }
}

/// Whether `path` addresses a single monitor, i.e. `/api/monitors/{id}` with
/// an optional trailing slash.
///
/// Equivalent to the pattern `^/api/monitors/[^/]+/?$` plus a blanket
/// exclusion of any path mentioning `silences`. Both conditions track
/// backend routing and must stay exactly as they are.
///
/// `path` is the percent-encoded form returned by [`reqwest::Url::path`].
/// An id such as `a%2Fb` is therefore one segment and matches, whereas a
/// check on the decoded path would see `a/b` and reject it.
pub fn is_monitor_get_path(path: &str) -> bool {
    if path.contains("silences") {
        return false;
    }
    let Some(rest) = path.strip_prefix(MONITORS_PREFIX) else {
        return false;
    };
    let id = rest.strip_suffix('/').unwrap_or(rest);
    !id.is_empty() && !id.contains('/')
}

fn relabel_as_yaml(response: &mut Response) {
    let current = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if current.is_empty() || !current.starts_with(CONTENT_TYPE_YAML) {
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(CONTENT_TYPE_YAML),
        );
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|err| GroundcoverError::Build(format!("invalid header value: {err}")))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use reqwest::header::{self, HeaderValue};
    use reqwest::Method;
    use tokio_util::sync::CancellationToken;

    use super::{is_monitor_get_path, AuthTransport, TransportConfig};
    use crate::transport::testing::{request, Scripted, ScriptedTransport};
    use crate::{GroundcoverError, RequestContext, Transport};

    fn auth_over(inner: &ScriptedTransport) -> AuthTransport {
        AuthTransport::new(
            TransportConfig::new("secret-key", "backend-1"),
            Arc::new(inner.clone()),
        )
    }

    #[test]
    fn monitor_path_predicate_matches_single_segment_ids() {
        assert!(is_monitor_get_path("/api/monitors/abc123"));
        assert!(is_monitor_get_path("/api/monitors/abc123/"));
        assert!(!is_monitor_get_path("/api/monitors/"));
        assert!(!is_monitor_get_path("/api/monitors"));
        assert!(!is_monitor_get_path("/api/monitors/abc/history"));
        assert!(!is_monitor_get_path("/api/monitors/silences"));
        assert!(!is_monitor_get_path("/api/monitors/silences/"));
        assert!(!is_monitor_get_path("/v1/api/monitors/abc123"));
        assert!(is_monitor_get_path("/api/monitors/a%2Fb"));
    }

    #[tokio::test]
    async fn injects_headers_on_a_clone_and_leaves_original_alone() {
        let inner = ScriptedTransport::statuses([200]);
        let transport = auth_over(&inner);

        let mut original = request(Method::GET, "/api/k8s/clusters");
        original
            .headers_mut()
            .insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer stale"));
        original
            .headers_mut()
            .insert("x-backend-id", HeaderValue::from_static("other"));
        let before = original.headers().clone();

        transport
            .round_trip(&original, &RequestContext::new())
            .await
            .expect("round trip must succeed");

        let seen = inner.seen();
        assert_eq!(seen.len(), 1);
        assert_ne!(seen[0].address, &original as *const _ as usize);
        assert_eq!(seen[0].headers["authorization"], "Bearer secret-key");
        assert_eq!(seen[0].headers["x-backend-id"], "backend-1");
        assert_eq!(seen[0].headers["user-agent"], "groundcover-rust-sdk");
        assert!(seen[0].headers.get("traceparent").is_none());
        assert_eq!(original.headers(), &before);
    }

    #[tokio::test]
    async fn traceparent_comes_from_request_context() {
        let inner = ScriptedTransport::statuses([200]);
        let transport = auth_over(&inner);
        let trace = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

        let req = request(Method::GET, "/api/metrics/query");
        let ctx = RequestContext::new().with_traceparent(trace);
        transport
            .round_trip(&req, &ctx)
            .await
            .expect("round trip must succeed");

        assert_eq!(inner.seen()[0].headers["traceparent"], trace);
        assert!(req.headers().get("traceparent").is_none());
    }

    #[tokio::test]
    async fn client_wide_traceparent_yields_to_request_context() {
        let inner = ScriptedTransport::statuses([200, 200]);
        let transport = AuthTransport::new(
            TransportConfig::new("secret-key", "backend-1").with_traceparent("00-default-01"),
            Arc::new(inner.clone()),
        );
        let req = request(Method::GET, "/api/metrics/query");

        transport
            .round_trip(&req, &RequestContext::new())
            .await
            .expect("round trip must succeed");
        transport
            .round_trip(&req, &RequestContext::new().with_traceparent("00-override-01"))
            .await
            .expect("round trip must succeed");

        let seen = inner.seen();
        assert_eq!(seen[0].headers["traceparent"], "00-default-01");
        assert_eq!(seen[1].headers["traceparent"], "00-override-01");
    }

    #[tokio::test]
    async fn workflow_create_is_forced_to_text_plain() {
        let inner = ScriptedTransport::statuses([200, 200]);
        let transport = auth_over(&inner);

        let mut create = request(Method::POST, "/api/workflows/create");
        create
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        transport
            .round_trip(&create, &RequestContext::new())
            .await
            .expect("round trip must succeed");

        let mut other = request(Method::POST, "/api/workflows/create/extra");
        other
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        transport
            .round_trip(&other, &RequestContext::new())
            .await
            .expect("round trip must succeed");

        let seen = inner.seen();
        assert_eq!(seen[0].headers["content-type"], "text/plain");
        assert_eq!(seen[1].headers["content-type"], "application/json");
        assert_eq!(create.headers()["content-type"], "application/json");
    }

    #[tokio::test]
    async fn monitor_get_response_is_relabelled_as_yaml() {
        let inner = ScriptedTransport::new([
            Scripted::Status(200),
            Scripted::WithContentType(200, "application/json"),
            Scripted::WithContentType(200, "application/x-yaml; charset=utf-8"),
        ]);
        let transport = auth_over(&inner);
        let req = request(Method::GET, "/api/monitors/abc123");

        for expected in [
            "application/x-yaml",
            "application/x-yaml",
            "application/x-yaml; charset=utf-8",
        ] {
            let response = transport
                .round_trip(&req, &RequestContext::new())
                .await
                .expect("round trip must succeed");
            assert_eq!(response.headers()["content-type"], expected);
        }
    }

    #[tokio::test]
    async fn monitor_relabel_skips_silences_errors_and_other_methods() {
        let inner = ScriptedTransport::new([
            Scripted::Status(200),
            Scripted::WithContentType(404, "application/json"),
            Scripted::WithContentType(200, "application/json"),
        ]);
        let transport = auth_over(&inner);
        let ctx = RequestContext::new();

        let silences = transport
            .round_trip(&request(Method::GET, "/api/monitors/silences"), &ctx)
            .await
            .expect("round trip must succeed");
        assert!(silences.headers().get("content-type").is_none());

        let missing = transport
            .round_trip(&request(Method::GET, "/api/monitors/abc123"), &ctx)
            .await
            .expect("round trip must succeed");
        assert_eq!(missing.headers()["content-type"], "application/json");

        let updated = transport
            .round_trip(&request(Method::PUT, "/api/monitors/abc123"), &ctx)
            .await
            .expect("round trip must succeed");
        assert_eq!(updated.headers()["content-type"], "application/json");
    }

    #[tokio::test]
    async fn inner_errors_pass_through_unchanged() {
        let inner = ScriptedTransport::new([Scripted::Slow(200, Duration::from_secs(5))]);
        let transport = auth_over(&inner);
        let token = CancellationToken::new();
        token.cancel();
        let ctx = RequestContext::new().with_cancellation(token);

        let err = transport
            .round_trip(&request(Method::GET, "/api/k8s/clusters"), &ctx)
            .await
            .expect_err("canceled context must fail");
        assert!(matches!(err, GroundcoverError::Canceled));
    }

    #[tokio::test]
    async fn inner_transport_error_is_returned_as_is() {
        let inner = ScriptedTransport::new([Scripted::Fail("connection reset")]);
        let transport = auth_over(&inner);

        let err = transport
            .round_trip(
                &request(Method::GET, "/api/monitors/abc123"),
                &RequestContext::new(),
            )
            .await
            .expect_err("inner failure must surface");

        match err {
            GroundcoverError::Build(message) => assert_eq!(message, "connection reset"),
            other => panic!("expected the inner error, got {other:?}"),
        }
        assert_eq!(inner.hits(), 1);
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = TransportConfig::new("secret-key", "backend-1");
        let debug = format!("{config:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("secret-key"));
    }
}
