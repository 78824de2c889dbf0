//! psclink
//!
//! Provisions and tears down the resource graph behind a GCP Private Service
//! Connect deployment: a health-checked backend behind an internal load
//! balancer, published through a service attachment, and reached from a
//! second network through a private endpoint.
//!
//! # Module Structure
//!
//! - [`resource`] - resource kinds, scopes and descriptors
//! - [`plan`] - validated, dependency-ordered plans
//! - [`topology`] - the standard provider + consumer plan
//! - [`provider`] - the [`provider::ComputeApi`] seam and its implementations
//! - [`operation`] - long-running operation polling
//! - [`probe`] - side-effect free existence checks
//! - [`provision`] - per-kind create-if-absent provisioners
//! - [`orchestrator`] - apply, destroy and status over a plan
//! - [`decommission`] - best-effort reverse-order teardown
//! - [`gcp`] - authentication and HTTP plumbing for the Compute REST API
//! - [`config`] - YAML configuration
//! - [`error`] - error taxonomy

pub mod config;
pub mod decommission;
pub mod error;
pub mod gcp;
pub mod operation;
pub mod orchestrator;
pub mod plan;
pub mod probe;
pub mod provider;
pub mod provision;
pub mod resource;
pub mod topology;

pub use error::{ApiError, ProvisionError};
pub use orchestrator::{ApplyFailure, ApplyReport, Orchestrator, RunState};
pub use plan::{PlanBuilder, ProvisioningPlan};
pub use provision::ProvisioningResult;
