//! Long-running operations
//!
//! Every Compute mutation returns an [`Operation`] that has to be polled until
//! it reports `DONE`. Polling is done by one reusable bounded-growth poller,
//! [`poll_until`], parameterized by a [`Backoff`] and a terminal-state
//! predicate. [`OperationWaiter`] applies it to Compute operations.
//!
//! The waiter has no intrinsic timeout. Callers that need one wrap the future
//! in [`tokio::time::timeout`]; dropping the future only stops watching, the
//! mutation itself keeps running server-side.

use crate::error::{ApiError, ProvisionError};
use crate::provider::ComputeApi;
use crate::resource::{short_name, ResourceKind, Scope};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Initial delay between operation polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound for the delay between operation polls
pub const DEFAULT_MAX_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Pending,
    Running,
    Done,
}

impl OperationStatus {
    fn parse(status: &str) -> Self {
        match status {
            "DONE" => OperationStatus::Done,
            "RUNNING" => OperationStatus::Running,
            _ => OperationStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationErrorEntry {
    pub code: String,
    pub message: String,
}

/// Error payload embedded in a finished operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationError {
    pub errors: Vec<OperationErrorEntry>,
}

impl OperationError {
    pub fn single(code: &str, message: &str) -> Self {
        Self {
            errors: vec![OperationErrorEntry {
                code: code.to_string(),
                message: message.to_string(),
            }],
        }
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }

    fn from_json(value: &Value) -> Option<Self> {
        let errors: Vec<_> = value
            .get("errors")?
            .as_array()?
            .iter()
            .map(|e| OperationErrorEntry {
                code: e
                    .get("code")
                    .and_then(|v| v.as_str())
                    .unwrap_or("UNKNOWN")
                    .to_string(),
                message: e
                    .get("message")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
            })
            .collect();
        Some(Self { errors })
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.code, e.message))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

/// Handle for an in-flight mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub name: String,
    pub scope: Scope,
    pub status: OperationStatus,
    pub error: Option<OperationError>,
}

impl Operation {
    pub fn is_done(&self) -> bool {
        self.status == OperationStatus::Done
    }

    /// Parse a `compute#operation` resource
    ///
    /// The scope comes from the operation's `zone`/`region` link when present,
    /// otherwise `fallback` (the scope the call was made in).
    pub fn from_json(value: &Value, fallback: &Scope) -> Result<Self, ApiError> {
        let name = value
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ApiError::Transport("operation response without a name".to_string()))?
            .to_string();

        let scope = if let Some(zone) = value.get("zone").and_then(|v| v.as_str()) {
            Scope::Zonal(short_name(zone).to_string())
        } else if let Some(region) = value.get("region").and_then(|v| v.as_str()) {
            Scope::Regional(short_name(region).to_string())
        } else {
            fallback.clone()
        };

        let status = value
            .get("status")
            .and_then(|v| v.as_str())
            .map(OperationStatus::parse)
            .unwrap_or(OperationStatus::Pending);

        let error = value.get("error").and_then(OperationError::from_json);

        Ok(Self {
            name,
            scope,
            status,
            error,
        })
    }
}

/// Capped exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: DEFAULT_POLL_INTERVAL,
            max: DEFAULT_MAX_POLL_INTERVAL,
        }
    }
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    /// Delay after the `attempt`-th unfinished poll (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.initial
            .checked_mul(factor)
            .unwrap_or(self.max)
            .min(self.max)
    }

    /// Infinite sequence of delays: initial, 2x, 4x, ... capped at `max`
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let max = self.max;
        std::iter::successors(Some(self.initial.min(max)), move |d| {
            Some(d.checked_mul(2).unwrap_or(max).min(max))
        })
    }
}

/// Value returned by [`poll_until`] with polling statistics
#[derive(Debug, Clone)]
pub struct Polled<T> {
    pub value: T,
    pub polls: u32,
    pub waited: Duration,
}

/// Call `fetch` until `is_terminal` accepts its result
///
/// Sleeps between polls following `backoff`. Errors from `fetch` end the loop
/// immediately; only the "not yet terminal" condition is retried.
pub async fn poll_until<T, E, F, Fut, P>(
    backoff: &Backoff,
    mut fetch: F,
    is_terminal: P,
) -> Result<Polled<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&T) -> bool,
{
    let mut delays = backoff.delays();
    let mut polls = 0u32;
    let mut waited = Duration::ZERO;

    loop {
        let value = fetch().await?;
        polls += 1;
        if is_terminal(&value) {
            return Ok(Polled {
                value,
                polls,
                waited,
            });
        }

        let delay = delays.next().unwrap_or(backoff.max);
        tracing::trace!("poll {} not terminal, sleeping {:?}", polls, delay);
        tokio::time::sleep(delay).await;
        waited += delay;
    }
}

#[derive(Error, Debug, Clone)]
pub enum WaitError {
    /// Reading the operation failed; not retried
    #[error("failed to poll operation: {0}")]
    Poll(ApiError),

    #[error("operation {operation} finished with error: {error}")]
    Failed {
        operation: String,
        error: OperationError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitOutcome {
    pub polls: u32,
    pub waited: Duration,
}

/// Polls Compute operations to completion
pub struct OperationWaiter<'a> {
    api: &'a dyn ComputeApi,
    backoff: Backoff,
    deadline: Option<Duration>,
}

impl<'a> OperationWaiter<'a> {
    pub fn new(api: &'a dyn ComputeApi, backoff: Backoff) -> Self {
        Self {
            api,
            backoff,
            deadline: None,
        }
    }

    /// Stop watching an operation after `deadline` (see [`Self::settle`])
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Wait for an operation acting on `kind` `name` and classify its failure
    ///
    /// When a deadline is set and elapses first, returns
    /// [`ProvisionError::Timeout`]. The mutation itself is not cancelled.
    /// A failed poll is a transport failure whatever its status: a 404 on the
    /// operation says nothing about the resource.
    pub async fn settle(&self, kind: ResourceKind, name: &str, operation: &Operation) -> Result<WaitOutcome, ProvisionError> {
        let waited = match self.deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.wait(operation))
                .await
                .map_err(|_| ProvisionError::Timeout {
                    operation: operation.name.clone(),
                    elapsed: deadline,
                })?,
            None => self.wait(operation).await,
        };

        waited.map_err(|e| match e {
            WaitError::Poll(err) => ProvisionError::Transport(err),
            WaitError::Failed { operation, error } => {
                ProvisionError::from_operation(kind, name, &operation, error)
            }
        })
    }

    /// Block until `operation` is DONE
    ///
    /// A DONE operation carrying an error becomes [`WaitError::Failed`].
    pub async fn wait(&self, operation: &Operation) -> Result<WaitOutcome, WaitError> {
        if operation.is_done() {
            return Self::finish(operation.clone(), 0, Duration::ZERO);
        }

        tracing::debug!("Waiting for operation {} ({})", operation.name, operation.scope);

        let polled = poll_until(
            &self.backoff,
            || self.api.get_operation(&operation.scope, &operation.name),
            Operation::is_done,
        )
        .await
        .map_err(WaitError::Poll)?;

        Self::finish(polled.value, polled.polls, polled.waited)
    }

    fn finish(done: Operation, polls: u32, waited: Duration) -> Result<WaitOutcome, WaitError> {
        if let Some(error) = done.error {
            tracing::warn!("Operation {} failed: {}", done.name, error);
            return Err(WaitError::Failed {
                operation: done.name,
                error,
            });
        }
        Ok(WaitOutcome { polls, waited })
    }
}
