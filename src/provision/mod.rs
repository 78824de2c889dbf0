//! Resource provisioners
//!
//! One generic create-if-absent flow, parameterized per kind by the request
//! body built in [`body`]:
//!
//! 1. probe; if the resource is there, report it as already existing
//! 2. otherwise insert, wait for the operation, then re-read the resource to
//!    pick up provider-assigned attributes
//!
//! Drifted resources are never reconciled. Two kinds add convergence steps
//! that run whether or not the base resource was just created, because they
//! only ever add what is missing:
//!
//! - instance groups: membership and named ports ([`instance_group`])
//! - backend services: backend attachment by read-modify-write ([`backend`])

pub mod backend;
mod body;
pub mod instance_group;

pub use backend::{BackendAttachment, PendingBackendUpdate};

use crate::error::{ApiError, ProvisionError, Result};
use crate::operation::{Backoff, OperationWaiter};
use crate::probe;
use crate::provider::ComputeApi;
use crate::resource::{ResourceDescriptor, ResourceKind, ResourceRef, ResourceSpec};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Attribute key for a provider-allocated IP address
pub const ATTR_IP_ADDRESS: &str = "ip_address";

/// Outcome of provisioning one descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisioningResult {
    pub id: String,
    pub kind: ResourceKind,
    pub name: String,
    pub self_link: String,
    /// Provider-assigned values worth reporting, e.g. `ip_address`
    pub attributes: BTreeMap<String, String>,
    /// The base resource was found instead of created
    pub already_existed: bool,
}

impl ProvisioningResult {
    fn from_resource(descriptor: &ResourceDescriptor, resource: &Value, already_existed: bool) -> Self {
        let self_link = resource
            .get("selfLink")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let mut attributes = BTreeMap::new();
        let ip_field = match descriptor.kind() {
            ResourceKind::Address => Some("address"),
            ResourceKind::ForwardingRule => Some("IPAddress"),
            _ => None,
        };
        if let Some(ip) = ip_field.and_then(|f| resource.get(f)).and_then(|v| v.as_str()) {
            attributes.insert(ATTR_IP_ADDRESS.to_string(), ip.to_string());
        }

        Self {
            id: descriptor.id().to_string(),
            kind: descriptor.kind(),
            name: descriptor.name().to_string(),
            self_link,
            attributes,
            already_existed,
        }
    }
}

/// Results accumulated during one run, keyed by descriptor id
pub type Completed = BTreeMap<String, ProvisioningResult>;

/// Resolves plan references against the results accumulated so far
pub(crate) struct Resolver<'r> {
    completed: &'r Completed,
}

impl<'r> Resolver<'r> {
    pub(crate) fn new(completed: &'r Completed) -> Self {
        Self { completed }
    }

    /// Self link of a dependency that already finished
    pub(crate) fn link(&self, reference: &ResourceRef) -> Result<&'r str> {
        self.completed
            .get(reference.id())
            .map(|r| r.self_link.as_str())
            .ok_or_else(|| {
                ProvisionError::InvalidPlan(format!(
                    "'{}' is referenced before it was provisioned",
                    reference
                ))
            })
    }
}

/// Create-if-absent provisioning for every resource kind
pub struct Provisioner<'a> {
    api: &'a dyn ComputeApi,
    backoff: Backoff,
    operation_timeout: Option<Duration>,
}

impl<'a> Provisioner<'a> {
    pub fn new(api: &'a dyn ComputeApi, backoff: Backoff) -> Self {
        Self {
            api,
            backoff,
            operation_timeout: None,
        }
    }

    pub fn with_operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub(crate) fn waiter(&self) -> OperationWaiter<'a> {
        OperationWaiter::new(self.api, self.backoff).with_deadline(self.operation_timeout)
    }

    /// Ensure the resource described by `descriptor` exists
    ///
    /// Every dependency must already be in `completed`.
    pub async fn provision(&self, descriptor: &ResourceDescriptor, completed: &Completed) -> Result<ProvisioningResult> {
        let resolver = Resolver::new(completed);
        let result = self.ensure_exists(descriptor, &resolver).await?;

        match descriptor.spec() {
            ResourceSpec::InstanceGroup(spec) => {
                instance_group::converge(self, descriptor, spec).await?;
            }
            ResourceSpec::BackendService(spec) => {
                for backend in &spec.backends {
                    let group = resolver.link(backend)?;
                    let attachment = BackendAttachment::new(self.api, descriptor.scope(), descriptor.name());
                    if let Some(pending) = attachment.prepare(group).await? {
                        let operation = pending.submit().await?;
                        self.waiter()
                            .settle(ResourceKind::BackendService, descriptor.name(), &operation)
                            .await?;
                        tracing::info!("Attached {} to {}", group, descriptor.name());
                    }
                }
            }
            _ => {}
        }

        Ok(result)
    }

    async fn ensure_exists(&self, descriptor: &ResourceDescriptor, resolver: &Resolver<'_>) -> Result<ProvisioningResult> {
        let kind = descriptor.kind();
        let scope = descriptor.scope();
        let name = descriptor.name();

        if let Some(existing) = probe::fetch(self.api, kind, scope, name).await? {
            tracing::info!("{} '{}' already exists, skipping creation", kind, name);
            return Ok(ProvisioningResult::from_resource(descriptor, &existing, true));
        }

        let request = body::creation_body(descriptor, resolver)?;
        tracing::info!("Creating {} '{}' in {}", kind, name, scope);

        match self.api.insert(kind, scope, &request).await {
            Ok(operation) => {
                let outcome = self.waiter().settle(kind, name, &operation).await?;
                tracing::debug!(
                    "{} '{}' created after {} polls ({:?})",
                    kind,
                    name,
                    outcome.polls,
                    outcome.waited
                );
            }
            Err(ApiError::AlreadyExists(_)) => {
                // Lost a creation race to another creator
                tracing::info!("{} '{}' was created concurrently", kind, name);
                let resource = self.read(descriptor).await?;
                return Ok(ProvisioningResult::from_resource(descriptor, &resource, true));
            }
            Err(e) => return Err(ProvisionError::from_api(kind, name, e)),
        }

        let resource = self.read(descriptor).await?;
        Ok(ProvisioningResult::from_resource(descriptor, &resource, false))
    }

    async fn read(&self, descriptor: &ResourceDescriptor) -> Result<Value> {
        let kind = descriptor.kind();
        probe::fetch(self.api, kind, descriptor.scope(), descriptor.name())
            .await?
            .ok_or_else(|| ProvisionError::NotFound {
                kind,
                name: descriptor.name().to_string(),
            })
    }
}
