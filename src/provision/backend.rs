//! Attach an instance group to a backend service
//!
//! This is a read-modify-write on the whole service. [`BackendAttachment::prepare`]
//! reads the service together with its fingerprint and decides whether the
//! group is missing; [`PendingBackendUpdate::submit`] writes it back with that
//! same fingerprint. If anything changed the service in between, the write is
//! refused with [`ProvisionError::ConcurrentModification`] instead of dropping
//! the other writer's change. Retrying means calling `prepare` again.

use crate::error::{ProvisionError, Result};
use crate::operation::Operation;
use crate::probe;
use crate::provider::ComputeApi;
use crate::resource::{canonical_link, ResourceKind, Scope};
use serde_json::{json, Value};

const KIND: ResourceKind = ResourceKind::BackendService;

/// Balancing mode for INTERNAL TCP backends
const BALANCING_MODE: &str = "CONNECTION";

/// Whether `service` already lists `group` as a backend
pub fn has_backend(service: &Value, group: &str) -> bool {
    service
        .get("backends")
        .and_then(|v| v.as_array())
        .map(|backends| {
            backends
                .iter()
                .filter_map(|b| b.get("group").and_then(|v| v.as_str()))
                .any(|g| canonical_link(g) == canonical_link(group))
        })
        .unwrap_or(false)
}

pub struct BackendAttachment<'a> {
    api: &'a dyn ComputeApi,
    scope: &'a Scope,
    service: &'a str,
}

impl<'a> BackendAttachment<'a> {
    pub fn new(api: &'a dyn ComputeApi, scope: &'a Scope, service: &'a str) -> Self {
        Self { api, scope, service }
    }

    /// Read the service and build the update that adds `group`
    ///
    /// Returns `None` when the group is already a backend.
    pub async fn prepare(&self, group: &str) -> Result<Option<PendingBackendUpdate<'a>>> {
        let mut service = probe::fetch(self.api, KIND, self.scope, self.service)
            .await?
            .ok_or_else(|| ProvisionError::NotFound {
                kind: KIND,
                name: self.service.to_string(),
            })?;

        if has_backend(&service, group) {
            tracing::debug!("{} already has backend {}", self.service, group);
            return Ok(None);
        }

        let backend = json!({ "group": group, "balancingMode": BALANCING_MODE });
        match service.get_mut("backends").and_then(|v| v.as_array_mut()) {
            Some(backends) => backends.push(backend),
            None => service["backends"] = json!([backend]),
        }

        Ok(Some(PendingBackendUpdate {
            api: self.api,
            scope: self.scope,
            service: self.service,
            body: service,
        }))
    }
}

/// Service definition with the new backend appended, carrying the
/// fingerprint it was read with
pub struct PendingBackendUpdate<'a> {
    api: &'a dyn ComputeApi,
    scope: &'a Scope,
    service: &'a str,
    body: Value,
}

impl PendingBackendUpdate<'_> {
    pub fn fingerprint(&self) -> Option<&str> {
        self.body.get("fingerprint").and_then(|v| v.as_str())
    }

    /// Write the service back; a stale fingerprint fails with
    /// [`ProvisionError::ConcurrentModification`]
    pub async fn submit(self) -> Result<Operation> {
        tracing::debug!(
            "Updating backend service {} (fingerprint {:?})",
            self.service,
            self.fingerprint()
        );
        self.api
            .update(KIND, self.scope, self.service, &self.body)
            .await
            .map_err(|e| ProvisionError::from_api(KIND, self.service, e))
    }
}
