//! Error taxonomy for provisioning and teardown
//!
//! Two layers:
//!
//! - [`ApiError`] is what a control-plane call reports: an HTTP status plus the
//!   machine-readable reason Compute Engine attaches to every error body.
//! - [`ProvisionError`] is what the engine reports to its callers. Every
//!   provider failure is classified into exactly one of its variants so the
//!   orchestrator and decommissioner can decide what to swallow.

use crate::operation::OperationError;
use crate::resource::ResourceKind;
use std::time::Duration;
use thiserror::Error;

/// Compute Engine reason for a deletion refused because something still points at the resource
pub const REASON_RESOURCE_IN_USE: &str = "resourceInUseByAnotherResource";

/// Operation error code for the same condition when it surfaces asynchronously
pub const CODE_RESOURCE_IN_USE: &str = "RESOURCE_IN_USE_BY_ANOTHER_RESOURCE";

/// Operation error code for a stale fingerprint
pub const CODE_CONDITION_NOT_MET: &str = "CONDITION_NOT_MET";

/// Operation error code for a resource that vanished before the operation ran
pub const CODE_RESOURCE_NOT_FOUND: &str = "RESOURCE_NOT_FOUND";

/// Failure reported by a single control-plane call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Stale fingerprint on an update (HTTP 412)
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// Deletion refused because another resource references this one
    #[error("resource in use: {0}")]
    ResourceInUse(String),

    #[error("API request failed: {status} {reason}: {message}")]
    Status {
        status: u16,
        reason: String,
        message: String,
    },

    /// The request never produced a usable response
    #[error("transport error: {0}")]
    Transport(String),
}

impl ApiError {
    /// Classify an HTTP error response
    ///
    /// `reason` is `error.errors[0].reason` from the response body when present.
    pub fn from_status(status: u16, reason: &str, message: &str) -> Self {
        match (status, reason) {
            (404, _) => ApiError::NotFound(message.to_string()),
            (409, _) => ApiError::AlreadyExists(message.to_string()),
            (412, _) => ApiError::PreconditionFailed(message.to_string()),
            (_, REASON_RESOURCE_IN_USE) => ApiError::ResourceInUse(message.to_string()),
            _ => ApiError::Status {
                status,
                reason: reason.to_string(),
                message: message.to_string(),
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }
}

/// Engine-level error
#[derive(Error, Debug, Clone)]
pub enum ProvisionError {
    #[error("{kind} '{name}' not found")]
    NotFound { kind: ResourceKind, name: String },

    /// Transport failure or unexpected API status. Never retried.
    #[error("provider error: {0}")]
    Transport(ApiError),

    /// The asynchronous operation finished carrying an error payload
    #[error("operation {operation} failed: {error}")]
    OperationFailed {
        operation: String,
        error: OperationError,
    },

    /// Stale version token on a read-modify-write. Safe to retry from a fresh read.
    #[error("{kind} '{name}' was modified concurrently: {detail}")]
    ConcurrentModification {
        kind: ResourceKind,
        name: String,
        detail: String,
    },

    /// Deletion blocked by a live dependent
    #[error("{kind} '{name}' is still referenced by another resource: {detail}")]
    DependencyViolation {
        kind: ResourceKind,
        name: String,
        detail: String,
    },

    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error("gave up watching operation {operation} after {elapsed:?}; it may still complete")]
    Timeout { operation: String, elapsed: Duration },
}

impl ProvisionError {
    /// Classify a provider error raised while acting on a specific resource
    pub fn from_api(kind: ResourceKind, name: &str, err: ApiError) -> Self {
        match err {
            ApiError::NotFound(_) => ProvisionError::NotFound {
                kind,
                name: name.to_string(),
            },
            ApiError::PreconditionFailed(detail) => ProvisionError::ConcurrentModification {
                kind,
                name: name.to_string(),
                detail,
            },
            ApiError::ResourceInUse(detail) => ProvisionError::DependencyViolation {
                kind,
                name: name.to_string(),
                detail,
            },
            other => ProvisionError::Transport(other),
        }
    }

    /// Classify an operation that finished with an embedded error
    ///
    /// `RESOURCE_NOT_FOUND` stays an [`ProvisionError::OperationFailed`]: on a
    /// create it usually names a dangling reference, not the resource itself.
    pub fn from_operation(kind: ResourceKind, name: &str, operation: &str, error: OperationError) -> Self {
        if error.has_code(CODE_RESOURCE_IN_USE) {
            return ProvisionError::DependencyViolation {
                kind,
                name: name.to_string(),
                detail: error.to_string(),
            };
        }
        if error.has_code(CODE_CONDITION_NOT_MET) {
            return ProvisionError::ConcurrentModification {
                kind,
                name: name.to_string(),
                detail: error.to_string(),
            };
        }
        ProvisionError::OperationFailed {
            operation: operation.to_string(),
            error,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ProvisionError::NotFound { .. })
    }

    /// The operation finished because its target was already gone
    pub fn is_vanished_target(&self) -> bool {
        matches!(
            self,
            ProvisionError::OperationFailed { error, .. } if error.has_code(CODE_RESOURCE_NOT_FOUND)
        )
    }
}

impl From<ApiError> for ProvisionError {
    fn from(err: ApiError) -> Self {
        ProvisionError::Transport(err)
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
