//! Control-plane abstraction
//!
//! The engine never talks HTTP directly. It drives a [`ComputeApi`], the
//! opaque capability set every backend has to offer: create, read, update,
//! delete, custom verbs, and scope-qualified operation polling.
//!
//! # Implementations
//!
//! - [`GcpCompute`] - Compute Engine v1 REST API
//! - [`InMemoryCompute`] - in-process control plane used for `--simulate`
//!   runs and by the test suite

mod gcp;
mod memory;

pub use gcp::GcpCompute;
pub use memory::{Call, Fault, InMemoryCompute, Verb};

use crate::error::ApiError;
use crate::operation::Operation;
use crate::resource::{ResourceKind, Scope};
use async_trait::async_trait;
use serde_json::Value;

/// Compute control-plane capabilities used by the engine
///
/// Implementations must not cache: every `get` reflects the live provider
/// state, which is what makes re-running a plan safe.
#[async_trait]
pub trait ComputeApi: Send + Sync {
    /// Submit creation of a resource described by `body`
    async fn insert(&self, kind: ResourceKind, scope: &Scope, body: &Value) -> Result<Operation, ApiError>;

    /// Read a resource; [`ApiError::NotFound`] when absent
    async fn get(&self, kind: ResourceKind, scope: &Scope, name: &str) -> Result<Value, ApiError>;

    /// Replace a resource. `body` must carry the fingerprint read earlier;
    /// a stale one fails with [`ApiError::PreconditionFailed`].
    async fn update(
        &self,
        kind: ResourceKind,
        scope: &Scope,
        name: &str,
        body: &Value,
    ) -> Result<Operation, ApiError>;

    async fn delete(&self, kind: ResourceKind, scope: &Scope, name: &str) -> Result<Operation, ApiError>;

    /// Custom verb on a resource (`addInstances`, `setNamedPorts`, ...)
    async fn invoke(
        &self,
        kind: ResourceKind,
        scope: &Scope,
        name: &str,
        method: &str,
        body: &Value,
    ) -> Result<Operation, ApiError>;

    /// Self links of the instances in an unmanaged instance group
    async fn list_group_instances(&self, scope: &Scope, group: &str) -> Result<Vec<String>, ApiError>;

    async fn get_operation(&self, scope: &Scope, name: &str) -> Result<Operation, ApiError>;
}
