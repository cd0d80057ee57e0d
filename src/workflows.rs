use serde::de::DeserializeOwned;

use crate::{CallRequest, GroundcoverClient, RequestContext, Result};

const WORKFLOW_CREATE_PATH: &str = "/api/workflows/create";

/// Workflow endpoints.
#[derive(Clone, Copy, Debug)]
pub struct Workflows<'a> {
    client: &'a GroundcoverClient,
}

impl<'a> Workflows<'a> {
    pub(crate) fn new(client: &'a GroundcoverClient) -> Self {
        Self { client }
    }

    /// Creates a workflow from its raw definition.
    ///
    /// The backend reads the body as a plain string, whatever its format.
    pub async fn create<T: DeserializeOwned>(
        &self,
        definition: impl Into<String>,
        ctx: &RequestContext,
    ) -> Result<T> {
        let call = CallRequest::post(WORKFLOW_CREATE_PATH).text(definition);
        self.client.call(&call, ctx).await
    }
}
