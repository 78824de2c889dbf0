//! Best-effort teardown
//!
//! Deletes a plan's resources in the exact reverse of creation order. A
//! resource that is already gone counts as success, whether the delete call
//! itself says "not found" or the operation finishes with `RESOURCE_NOT_FOUND`.
//! Any other failure is recorded and the remaining deletions still run.

use crate::error::{ApiError, ProvisionError};
use crate::operation::{Backoff, OperationWaiter};
use crate::plan::ProvisioningPlan;
use crate::provider::ComputeApi;
use crate::resource::{ResourceDescriptor, ResourceKind};
use serde::{Serialize, Serializer};
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum TeardownOutcome {
    Deleted,
    AlreadyAbsent,
    Failed(ProvisionError),
}

impl TeardownOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, TeardownOutcome::Failed(_))
    }
}

impl Serialize for TeardownOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TeardownOutcome::Deleted => serializer.serialize_str("deleted"),
            TeardownOutcome::AlreadyAbsent => serializer.serialize_str("already_absent"),
            TeardownOutcome::Failed(err) => serializer.serialize_str(&format!("failed: {}", err)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TeardownEntry {
    pub id: String,
    pub kind: ResourceKind,
    pub name: String,
    pub outcome: TeardownOutcome,
}

/// Per-resource outcomes, in the order deletions were attempted
#[derive(Debug, Clone, Default, Serialize)]
pub struct TeardownReport {
    pub entries: Vec<TeardownEntry>,
}

impl TeardownReport {
    pub fn failures(&self) -> impl Iterator<Item = &TeardownEntry> {
        self.entries.iter().filter(|e| e.outcome.is_failure())
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    pub fn is_clean(&self) -> bool {
        self.failure_count() == 0
    }

    pub fn deleted_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, TeardownOutcome::Deleted))
            .count()
    }
}

pub struct Decommissioner<'a> {
    api: &'a dyn ComputeApi,
    backoff: Backoff,
    operation_timeout: Option<Duration>,
}

impl<'a> Decommissioner<'a> {
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

    /// Delete every resource of `plan`, last created first
    pub async fn destroy(&self, plan: &ProvisioningPlan) -> TeardownReport {
        let mut report = TeardownReport::default();

        for descriptor in plan.teardown_order() {
            let outcome = match self.delete(descriptor).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::warn!("Failed to delete {} '{}': {}", descriptor.kind(), descriptor.name(), err);
                    TeardownOutcome::Failed(err)
                }
            };

            report.entries.push(TeardownEntry {
                id: descriptor.id().to_string(),
                kind: descriptor.kind(),
                name: descriptor.name().to_string(),
                outcome,
            });
        }

        tracing::info!(
            "Teardown finished: {} deleted, {} failed",
            report.deleted_count(),
            report.failure_count()
        );
        report
    }

    /// Delete one resource
    ///
    /// Already absent means the delete call answered "not found", or its
    /// operation finished with `RESOURCE_NOT_FOUND`. A failure to poll the
    /// operation is reported as such.
    pub async fn delete(&self, descriptor: &ResourceDescriptor) -> Result<TeardownOutcome, ProvisionError> {
        let kind = descriptor.kind();
        let name = descriptor.name();

        tracing::info!("Deleting {} '{}'", kind, name);
        let operation = match self.api.delete(kind, descriptor.scope(), name).await {
            Ok(operation) => operation,
            Err(ApiError::NotFound(_)) => {
                tracing::info!("{} '{}' not found, skipping", kind, name);
                return Ok(TeardownOutcome::AlreadyAbsent);
            }
            Err(e) => return Err(ProvisionError::from_api(kind, name, e)),
        };

        let waiter = OperationWaiter::new(self.api, self.backoff).with_deadline(self.operation_timeout);
        match waiter.settle(kind, name, &operation).await {
            Ok(_) => Ok(TeardownOutcome::Deleted),
            Err(e) if e.is_vanished_target() => {
                tracing::info!("{} '{}' vanished before deletion", kind, name);
                Ok(TeardownOutcome::AlreadyAbsent)
            }
            Err(e) => Err(e),
        }
    }
}
