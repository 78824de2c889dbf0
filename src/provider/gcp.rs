//! Compute Engine REST implementation

use super::ComputeApi;
use crate::error::ApiError;
use crate::gcp::client::GcpClient;
use crate::operation::Operation;
use crate::resource::{ResourceKind, Scope};
use async_trait::async_trait;
use serde_json::{json, Value};

/// [`ComputeApi`] backed by the Compute Engine v1 API
#[derive(Clone)]
pub struct GcpCompute {
    client: GcpClient,
}

impl GcpCompute {
    pub fn new(client: GcpClient) -> Self {
        Self { client }
    }

    pub fn project_id(&self) -> &str {
        &self.client.project_id
    }

    fn collection_url(&self, kind: ResourceKind, scope: &Scope) -> String {
        self.client.compute_scoped_url(scope, kind.collection())
    }

    fn resource_url(&self, kind: ResourceKind, scope: &Scope, name: &str) -> String {
        self.client
            .compute_scoped_url(scope, &format!("{}/{}", kind.collection(), name))
    }
}

#[async_trait]
impl ComputeApi for GcpCompute {
    async fn insert(&self, kind: ResourceKind, scope: &Scope, body: &Value) -> Result<Operation, ApiError> {
        let url = self.collection_url(kind, scope);
        let response = self.client.post(&url, Some(body)).await?;
        Operation::from_json(&response, scope)
    }

    async fn get(&self, kind: ResourceKind, scope: &Scope, name: &str) -> Result<Value, ApiError> {
        let url = self.resource_url(kind, scope, name);
        self.client.get(&url).await
    }

    async fn update(
        &self,
        kind: ResourceKind,
        scope: &Scope,
        name: &str,
        body: &Value,
    ) -> Result<Operation, ApiError> {
        let url = self.resource_url(kind, scope, name);
        let response = self.client.put(&url, body).await?;
        Operation::from_json(&response, scope)
    }

    async fn delete(&self, kind: ResourceKind, scope: &Scope, name: &str) -> Result<Operation, ApiError> {
        let url = self.resource_url(kind, scope, name);
        let response = self.client.delete(&url).await?;
        Operation::from_json(&response, scope)
    }

    async fn invoke(
        &self,
        kind: ResourceKind,
        scope: &Scope,
        name: &str,
        method: &str,
        body: &Value,
    ) -> Result<Operation, ApiError> {
        let url = format!("{}/{}", self.resource_url(kind, scope, name), method);
        let response = self.client.post(&url, Some(body)).await?;
        Operation::from_json(&response, scope)
    }

    async fn list_group_instances(&self, scope: &Scope, group: &str) -> Result<Vec<String>, ApiError> {
        let base = format!(
            "{}/listInstances",
            self.resource_url(ResourceKind::InstanceGroup, scope, group)
        );
        let body = json!({ "instanceState": "ALL" });
        let mut instances = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = url::Url::parse(&base)
                .map_err(|e| ApiError::Transport(format!("invalid URL {}: {}", base, e)))?;
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }
            let url = url.to_string();
            let response = self.client.post(&url, Some(&body)).await?;

            if let Some(items) = response.get("items").and_then(|v| v.as_array()) {
                instances.extend(
                    items
                        .iter()
                        .filter_map(|item| item.get("instance").and_then(|v| v.as_str()))
                        .map(str::to_string),
                );
            }

            page_token = response
                .get("nextPageToken")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            if page_token.is_none() {
                break;
            }
        }

        Ok(instances)
    }

    async fn get_operation(&self, scope: &Scope, name: &str) -> Result<Operation, ApiError> {
        let url = self
            .client
            .compute_scoped_url(scope, &format!("operations/{}", name));
        let response = self.client.get(&url).await?;
        Operation::from_json(&response, scope)
    }
}
