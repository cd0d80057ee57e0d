use reqwest::Method;
use serde::Serialize;

use crate::auth::{CONTENT_TYPE_JSON, CONTENT_TYPE_TEXT, CONTENT_TYPE_YAML};
use crate::{GroundcoverError, Result};

/// One API call: method, path relative to the client's base URL, query and
/// an optional pre-encoded body.
#[derive(Clone, Debug)]
pub struct CallRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub content_type: &'static str,
    /// Per-call gzip override; `None` follows [`crate::ClientOptions::gzip_requests`].
    pub gzip: Option<bool>,
}

impl CallRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            content_type: CONTENT_TYPE_JSON,
            gzip: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Appends a query pair; repeated keys are kept.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let encoded = serde_json::to_vec(body)
            .map_err(|err| GroundcoverError::Encode(format!("invalid JSON body: {err}")))?;
        self.body = Some(encoded);
        self.content_type = CONTENT_TYPE_JSON;
        Ok(self)
    }

    pub fn yaml<T: Serialize + ?Sized>(self, body: &T) -> Result<Self> {
        let encoded = serde_yaml::to_string(body)
            .map_err(|err| GroundcoverError::Encode(format!("invalid YAML body: {err}")))?;
        Ok(self.yaml_text(encoded))
    }

    /// Sends already-rendered YAML untouched.
    pub fn yaml_text(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into().into_bytes());
        self.content_type = CONTENT_TYPE_YAML;
        self
    }

    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into().into_bytes());
        self.content_type = CONTENT_TYPE_TEXT;
        self
    }

    pub fn gzip(mut self, enabled: bool) -> Self {
        self.gzip = Some(enabled);
        self
    }
}

/// Joins a base path and a call path with exactly one `/` between them.
pub(crate) fn join_path(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{join_path, CallRequest};

    #[test]
    fn join_path_collapses_slashes() {
        assert_eq!(join_path("/", "/api/monitors"), "/api/monitors");
        assert_eq!(join_path("", "api/monitors"), "/api/monitors");
        assert_eq!(join_path("/proxy/", "/api/monitors"), "/proxy/api/monitors");
        assert_eq!(join_path("/proxy", "api/monitors/"), "/proxy/api/monitors/");
    }

    #[test]
    fn body_helpers_set_content_type() {
        let json = CallRequest::post("/api/k8s/workloads")
            .json(&BTreeMap::from([("cluster", "prod")]))
            .expect("json must encode");
        assert_eq!(json.content_type, "application/json");
        assert_eq!(json.body.as_deref(), Some(&br#"{"cluster":"prod"}"#[..]));

        let yaml = CallRequest::post("/api/monitors")
            .yaml(&BTreeMap::from([("title", "cpu")]))
            .expect("yaml must encode");
        assert_eq!(yaml.content_type, "application/x-yaml");
        assert_eq!(yaml.body.as_deref(), Some(&b"title: cpu\n"[..]));

        let text = CallRequest::post("/api/workflows/create").text("workflow: {}");
        assert_eq!(text.content_type, "text/plain");
    }

    #[test]
    fn query_keeps_repeated_keys() {
        let call = CallRequest::get("/api/monitors/silences")
            .query("active", "true")
            .query("active", "false");
        assert_eq!(call.query.len(), 2);
    }
}
