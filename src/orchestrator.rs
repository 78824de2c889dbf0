//! Plan execution
//!
//! [`Orchestrator::apply`] runs one provisioner per plan step, strictly in
//! order, and stops at the first error. Nothing is rolled back: already
//! created resources are found by the probe on the next run, so re-applying
//! resumes where the failed run stopped.
//!
//! ```text
//! Init -> Provisioning(0) -> ... -> Provisioning(n-1) -> Done
//!                  \                         \
//!                   Failed(0)                 Failed(n-1)
//! ```

use crate::decommission::{Decommissioner, TeardownReport};
use crate::error::{ProvisionError, Result};
use crate::operation::Backoff;
use crate::plan::ProvisioningPlan;
use crate::probe;
use crate::provider::ComputeApi;
use crate::provision::{Completed, Provisioner, ProvisioningResult};
use crate::resource::ResourceKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "step", rename_all = "snake_case")]
pub enum RunState {
    Init,
    /// Working on the step with this index
    Provisioning(usize),
    Done,
    /// Stopped at the step with this index
    Failed(usize),
}

/// Successful apply
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// One result per step, in plan order
    pub results: Vec<ProvisioningResult>,
    /// Every state the run went through
    pub states: Vec<RunState>,
}

impl ApplyReport {
    pub fn result(&self, id: &str) -> Option<&ProvisioningResult> {
        self.results.iter().find(|r| r.id == id)
    }

    pub fn created_count(&self) -> usize {
        self.results.iter().filter(|r| !r.already_existed).count()
    }

    pub fn existing_count(&self) -> usize {
        self.results.iter().filter(|r| r.already_existed).count()
    }
}

/// Apply stopped at `step`
#[derive(Error, Debug, Clone)]
#[error("step {step} ('{id}') failed: {error}")]
pub struct ApplyFailure {
    pub step: usize,
    pub id: String,
    /// Results of the steps before `step`
    pub completed: Vec<ProvisioningResult>,
    #[source]
    pub error: ProvisionError,
    pub states: Vec<RunState>,
}

/// Live existence of one plan member
#[derive(Debug, Clone, Serialize)]
pub struct ResourceStatus {
    pub id: String,
    pub kind: ResourceKind,
    pub name: String,
    pub scope: String,
    pub exists: bool,
}

pub struct Orchestrator {
    api: Arc<dyn ComputeApi>,
    backoff: Backoff,
    operation_timeout: Option<Duration>,
}

impl Orchestrator {
    pub fn new(api: Arc<dyn ComputeApi>) -> Self {
        Self {
            api,
            backoff: Backoff::default(),
            operation_timeout: None,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Stop watching any single operation after `timeout`
    pub fn with_operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Provision every step of `plan` in order
    pub async fn apply(&self, plan: &ProvisioningPlan) -> std::result::Result<ApplyReport, ApplyFailure> {
        let started_at = Utc::now();
        let mut states = vec![RunState::Init];
        let mut completed = Completed::new();
        let mut results = Vec::with_capacity(plan.len());

        let provisioner = Provisioner::new(self.api.as_ref(), self.backoff)
            .with_operation_timeout(self.operation_timeout);

        for (step, descriptor) in plan.steps().iter().enumerate() {
            states.push(RunState::Provisioning(step));
            tracing::info!(
                "[{}/{}] {} '{}'",
                step + 1,
                plan.len(),
                descriptor.kind(),
                descriptor.name()
            );

            match provisioner.provision(descriptor, &completed).await {
                Ok(result) => {
                    completed.insert(result.id.clone(), result.clone());
                    results.push(result);
                }
                Err(error) => {
                    tracing::error!("Apply failed at step {} ({}): {}", step, descriptor.id(), error);
                    states.push(RunState::Failed(step));
                    return Err(ApplyFailure {
                        step,
                        id: descriptor.id().to_string(),
                        completed: results,
                        error,
                        states,
                    });
                }
            }
        }

        states.push(RunState::Done);
        let report = ApplyReport {
            started_at,
            finished_at: Utc::now(),
            results,
            states,
        };
        tracing::info!(
            "Apply finished: {} created, {} already existed",
            report.created_count(),
            report.existing_count()
        );
        Ok(report)
    }

    /// Tear `plan` down in reverse order, best effort
    pub async fn destroy(&self, plan: &ProvisioningPlan) -> TeardownReport {
        Decommissioner::new(self.api.as_ref(), self.backoff)
            .with_operation_timeout(self.operation_timeout)
            .destroy(plan)
            .await
    }

    /// Probe every plan member, in plan order
    pub async fn status(&self, plan: &ProvisioningPlan) -> Result<Vec<ResourceStatus>> {
        let mut statuses = Vec::with_capacity(plan.len());
        for descriptor in plan.steps() {
            let exists = probe::exists(
                self.api.as_ref(),
                descriptor.kind(),
                descriptor.scope(),
                descriptor.name(),
            )
            .await?;
            statuses.push(ResourceStatus {
                id: descriptor.id().to_string(),
                kind: descriptor.kind(),
                name: descriptor.name().to_string(),
                scope: descriptor.scope().to_string(),
                exists,
            });
        }
        Ok(statuses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanBuilder;
    use crate::provider::InMemoryCompute;
    use crate::resource::{NetworkSpec, ResourceDescriptor, ResourceSpec, Scope, SubnetworkSpec};

    fn plan() -> ProvisioningPlan {
        PlanBuilder::new()
            .add(ResourceDescriptor::new(
                "net",
                "hypershift-customer",
                Scope::Global,
                ResourceSpec::Network(NetworkSpec {
                    routing_mode: "REGIONAL".to_string(),
                }),
            ))
            .add(ResourceDescriptor::new(
                "subnet",
                "hypershift-customer-subnet",
                Scope::Regional("us-central1".to_string()),
                ResourceSpec::Subnetwork(SubnetworkSpec {
                    network: "net".into(),
                    ip_cidr_range: "10.2.0.0/24".to_string(),
                    purpose: None,
                    private_ip_google_access: true,
                }),
            ))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_state_history() {
        let orchestrator = Orchestrator::new(Arc::new(InMemoryCompute::new("test-project")));
        let report = orchestrator.apply(&plan()).await.unwrap();
        assert_eq!(
            report.states,
            vec![
                RunState::Init,
                RunState::Provisioning(0),
                RunState::Provisioning(1),
                RunState::Done
            ]
        );
        assert_eq!(report.created_count(), 2);
    }

    #[tokio::test]
    async fn test_status_follows_live_state() {
        let orchestrator = Orchestrator::new(Arc::new(InMemoryCompute::new("test-project")));
        let plan = plan();

        let before = orchestrator.status(&plan).await.unwrap();
        assert!(before.iter().all(|s| !s.exists));

        orchestrator.apply(&plan).await.unwrap();
        let after = orchestrator.status(&plan).await.unwrap();
        assert!(after.iter().all(|s| s.exists));
    }

    #[test]
    fn test_run_state_serialization() {
        assert_eq!(
            serde_json::to_value(RunState::Failed(3)).unwrap(),
            serde_json::json!({"state": "failed", "step": 3})
        );
        assert_eq!(
            serde_json::to_value(RunState::Done).unwrap(),
            serde_json::json!({"state": "done"})
        );
    }
}
