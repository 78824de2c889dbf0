//! GCP Client
//!
//! Main client for interacting with the Compute Engine API, combining
//! authentication and HTTP functionality.

use super::auth::GcpCredentials;
use super::http::GcpHttpClient;
use crate::error::ApiError;
use crate::resource::Scope;
use anyhow::{Context, Result};
use serde_json::Value;

/// Production Compute Engine v1 endpoint
pub const COMPUTE_BASE_URL: &str = "https://compute.googleapis.com/compute/v1";

/// Prefix Compute Engine puts on every `selfLink`
pub const SELF_LINK_PREFIX: &str = "https://www.googleapis.com/compute/v1/";

/// Main GCP client
#[derive(Clone)]
pub struct GcpClient {
    pub credentials: GcpCredentials,
    pub http: GcpHttpClient,
    pub project_id: String,
    base_url: String,
}

impl GcpClient {
    /// Create a new GCP client using Application Default Credentials
    pub async fn new(project_id: &str) -> Result<Self> {
        let credentials = GcpCredentials::new()
            .await
            .context("Failed to initialize GCP credentials")?;
        Self::with_credentials(project_id, credentials)
    }

    /// Create a client with explicit credentials
    pub fn with_credentials(project_id: &str, credentials: GcpCredentials) -> Result<Self> {
        let http = GcpHttpClient::new().context("Failed to create HTTP client")?;

        Ok(Self {
            credentials,
            http,
            project_id: project_id.to_string(),
            base_url: COMPUTE_BASE_URL.to_string(),
        })
    }

    /// Point the client at a different Compute endpoint (emulators, tests)
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        let parsed = url::Url::parse(base_url).context("Invalid Compute base URL")?;
        self.base_url = parsed.as_str().trim_end_matches('/').to_string();
        Ok(self)
    }

    async fn token(&self) -> Result<String, ApiError> {
        self.credentials
            .get_token()
            .await
            .map_err(|e| ApiError::Transport(format!("{e:#}")))
    }

    /// Make a GET request to a GCP API
    pub async fn get(&self, url: &str) -> Result<Value, ApiError> {
        let token = self.token().await?;
        self.http.get(url, &token).await
    }

    /// Make a POST request to a GCP API
    pub async fn post(&self, url: &str, body: Option<&Value>) -> Result<Value, ApiError> {
        let token = self.token().await?;
        self.http.post(url, &token, body).await
    }

    /// Make a PUT request to a GCP API
    pub async fn put(&self, url: &str, body: &Value) -> Result<Value, ApiError> {
        let token = self.token().await?;
        self.http.put(url, &token, body).await
    }

    /// Make a DELETE request to a GCP API
    pub async fn delete(&self, url: &str) -> Result<Value, ApiError> {
        let token = self.token().await?;
        self.http.delete(url, &token).await
    }

    // =========================================================================
    // Compute Engine API helpers
    // =========================================================================

    /// Build Compute Engine API URL
    pub fn compute_url(&self, path: &str) -> String {
        format!("{}/projects/{}/{}", self.base_url, self.project_id, path)
    }

    /// Build a scoped Compute Engine collection URL
    /// (`global/healthChecks`, `regions/r/addresses`, `zones/z/instanceGroups`)
    pub fn compute_scoped_url(&self, scope: &Scope, resource: &str) -> String {
        self.compute_url(&format!("{}/{}", scope.path(), resource))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GcpClient {
        GcpClient::with_credentials("demo-project", GcpCredentials::from_access_token("t")).unwrap()
    }

    #[test]
    fn test_scoped_urls() {
        let c = client();
        assert_eq!(
            c.compute_scoped_url(&Scope::Global, "healthChecks/hc"),
            "https://compute.googleapis.com/compute/v1/projects/demo-project/global/healthChecks/hc"
        );
        assert_eq!(
            c.compute_scoped_url(&Scope::Regional("us-central1".into()), "addresses"),
            "https://compute.googleapis.com/compute/v1/projects/demo-project/regions/us-central1/addresses"
        );
        assert_eq!(
            c.compute_scoped_url(&Scope::Zonal("us-central1-a".into()), "operations/op-1"),
            "https://compute.googleapis.com/compute/v1/projects/demo-project/zones/us-central1-a/operations/op-1"
        );
    }

    #[test]
    fn test_base_url_override() {
        let c = client().with_base_url("http://127.0.0.1:9000/compute/v1/").unwrap();
        assert_eq!(
            c.compute_url("global/networks"),
            "http://127.0.0.1:9000/compute/v1/projects/demo-project/global/networks"
        );
    }
}
