//! Engine pass-through options.
//!
//! Nothing in this layer interprets these values. They are deserializable so
//! deployments can keep them in configuration files next to the contract.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::duration::DurationMs;
use crate::id::WorkflowId;

/// Retry policy forwarded to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Maximum attempts including the first. `None` means unlimited.
    pub maximum_attempts: Option<u32>,
    /// Delay before the first retry.
    pub initial_interval: DurationMs,
    /// Multiplier applied to the interval after each retry.
    pub backoff_coefficient: f64,
    /// Upper bound on the retry interval.
    pub maximum_interval: Option<DurationMs>,
    /// `ActivityError::code` values that must not be retried.
    pub non_retryable_error_codes: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            maximum_attempts: None,
            initial_interval: DurationMs::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: None,
            non_retryable_error_codes: Vec::new(),
        }
    }
}

impl RetryPolicy {
    /// Whether an activity failure with `code` is eligible for retry.
    pub fn retries_code(&self, code: &str) -> bool {
        !self.non_retryable_error_codes.iter().any(|c| c == code)
    }
}

/// Options for one activity invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActivityOptions {
    /// Maximum time of a single attempt.
    pub start_to_close_timeout: Option<DurationMs>,
    /// Maximum time including retries.
    pub schedule_to_close_timeout: Option<DurationMs>,
    /// Maximum time between heartbeats.
    pub heartbeat_timeout: Option<DurationMs>,
    /// Retry policy; engine default when absent.
    pub retry: Option<RetryPolicy>,
}

impl ActivityOptions {
    /// Set the start-to-close timeout.
    pub fn with_start_to_close_timeout(mut self, timeout: DurationMs) -> Self {
        self.start_to_close_timeout = Some(timeout);
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }
}

/// Options for starting a child workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChildWorkflowOptions {
    /// Explicit child id. Derived deterministically from the parent when absent.
    pub workflow_id: Option<WorkflowId>,
    /// Maximum time of the whole child execution.
    pub execution_timeout: Option<DurationMs>,
    /// Maximum time of a single child run.
    pub run_timeout: Option<DurationMs>,
}

impl ChildWorkflowOptions {
    /// Use an explicit child workflow id.
    pub fn with_workflow_id(mut self, id: impl Into<WorkflowId>) -> Self {
        self.workflow_id = Some(id.into());
        self
    }
}

/// Options for starting a workflow from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOptions {
    /// Business id of the execution.
    pub workflow_id: WorkflowId,
    /// Maximum time of the whole execution.
    #[serde(default)]
    pub execution_timeout: Option<DurationMs>,
    /// Maximum time of a single run.
    #[serde(default)]
    pub run_timeout: Option<DurationMs>,
    /// Non-indexed metadata attached to the execution.
    #[serde(default)]
    pub memo: BTreeMap<String, serde_json::Value>,
}

impl StartOptions {
    /// Start options with the given workflow id and engine defaults otherwise.
    pub fn new(workflow_id: impl Into<WorkflowId>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            execution_timeout: None,
            run_timeout: None,
            memo: BTreeMap::new(),
        }
    }

    /// Set the execution timeout.
    pub fn with_execution_timeout(mut self, timeout: DurationMs) -> Self {
        self.execution_timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn activity_options_deserialize_with_defaults() {
        let opts: ActivityOptions = serde_json::from_value(json!({
            "startToCloseTimeout": 30000,
            "retry": { "maximumAttempts": 3, "nonRetryableErrorCodes": ["CARD_DECLINED"] }
        }))
        .unwrap();
        assert_eq!(opts.start_to_close_timeout, Some(DurationMs::from_secs(30)));
        let retry = opts.retry.unwrap();
        assert_eq!(retry.maximum_attempts, Some(3));
        assert_eq!(retry.initial_interval, DurationMs::from_secs(1));
        assert!(!retry.retries_code("CARD_DECLINED"));
        assert!(retry.retries_code("TIMEOUT"));
    }

    #[test]
    fn start_options_require_workflow_id() {
        assert!(serde_json::from_value::<StartOptions>(json!({})).is_err());
        let opts: StartOptions = serde_json::from_value(json!({"workflowId": "order-1"})).unwrap();
        assert_eq!(opts, StartOptions::new("order-1"));
    }
}
