//! Existence probes
//!
//! A probe is a plain read. "Not found" is the only error that means absent;
//! anything else (permission denied, a 5xx, a broken connection) is returned
//! to the caller instead of being mistaken for absence.

use crate::error::{ProvisionError, Result};
use crate::provider::ComputeApi;
use crate::resource::{ResourceKind, Scope};
use serde_json::Value;

/// Read a resource, mapping "not found" to `None`
pub async fn fetch(api: &dyn ComputeApi, kind: ResourceKind, scope: &Scope, name: &str) -> Result<Option<Value>> {
    match api.get(kind, scope, name).await {
        Ok(resource) => Ok(Some(resource)),
        Err(e) if e.is_not_found() => {
            tracing::debug!("{} '{}' not found in {}", kind, name, scope);
            Ok(None)
        }
        Err(e) => Err(ProvisionError::from_api(kind, name, e)),
    }
}

/// Whether a resource exists
pub async fn exists(api: &dyn ComputeApi, kind: ResourceKind, scope: &Scope, name: &str) -> Result<bool> {
    Ok(fetch(api, kind, scope, name).await?.is_some())
}
