use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{CallRequest, GroundcoverClient, GroundcoverError, RequestContext, Result};

const MONITORS_PATH: &str = "/api/monitors";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMonitorResponse {
    #[serde(default)]
    pub monitor_id: String,
}

/// Monitor endpoints. Monitors are exchanged as YAML documents.
#[derive(Clone, Copy, Debug)]
pub struct Monitors<'a> {
    client: &'a GroundcoverClient,
}

impl<'a> Monitors<'a> {
    pub(crate) fn new(client: &'a GroundcoverClient) -> Self {
        Self { client }
    }

    pub async fn create_yaml(
        &self,
        monitor_yaml: impl Into<String>,
        ctx: &RequestContext,
    ) -> Result<CreateMonitorResponse> {
        let call = CallRequest::post(MONITORS_PATH).yaml_text(monitor_yaml);
        self.client.call(&call, ctx).await
    }

    pub async fn create<T: Serialize + ?Sized>(
        &self,
        monitor: &T,
        ctx: &RequestContext,
    ) -> Result<CreateMonitorResponse> {
        let call = CallRequest::post(MONITORS_PATH).yaml(monitor)?;
        self.client.call(&call, ctx).await
    }

    /// Fetches the monitor definition as YAML text.
    pub async fn get(&self, id: &str, ctx: &RequestContext) -> Result<String> {
        let call = CallRequest::get(monitor_path(id)?);
        let body = self.client.call_bytes(&call, ctx).await?;
        String::from_utf8(body.to_vec())
            .map_err(|err| GroundcoverError::Decode(format!("monitor YAML is not UTF-8: {err}")))
    }

    /// Fetches the monitor definition and parses it.
    pub async fn get_as<T: DeserializeOwned>(&self, id: &str, ctx: &RequestContext) -> Result<T> {
        let call = CallRequest::get(monitor_path(id)?);
        self.client.call(&call, ctx).await
    }

    pub async fn update_yaml(
        &self,
        id: &str,
        monitor_yaml: impl Into<String>,
        ctx: &RequestContext,
    ) -> Result<()> {
        let call = CallRequest::put(monitor_path(id)?).yaml_text(monitor_yaml);
        self.client.call_bytes(&call, ctx).await.map(drop)
    }

    pub async fn delete(&self, id: &str, ctx: &RequestContext) -> Result<()> {
        let call = CallRequest::delete(monitor_path(id)?);
        self.client.call_bytes(&call, ctx).await.map(drop)
    }

    /// Lists silences; the response shape is left to the caller.
    pub async fn silences<T: DeserializeOwned>(&self, ctx: &RequestContext) -> Result<T> {
        let call = CallRequest::get(format!("{MONITORS_PATH}/silences"));
        self.client.call(&call, ctx).await
    }
}

fn monitor_path(id: &str) -> Result<String> {
    let id = id.trim();
    if id.is_empty() || id.contains('/') {
        return Err(GroundcoverError::Build(format!("invalid monitor id '{id}'")));
    }
    Ok(format!("{MONITORS_PATH}/{id}"))
}
