//! The engine protocol: what covenant consumes from, and exposes to, the
//! durable-execution engine.
//!
//! Workflow-scoped traits ([`WorkflowRuntime`], [`NativeChildHandle`],
//! [`WorkflowEntrypoint`]) are `?Send`. A workflow body and its handlers are
//! one cooperative, single-threaded unit that the engine replays
//! deterministically; nothing in that unit may hop threads. Activity and
//! client traits are `Send + Sync` because they run in ordinary concurrent
//! contexts.
//!
//! Workflow code, activity handlers and clients only see these traits, so
//! they never know which engine runs them.

use std::rc::Rc;

use async_trait::async_trait;
use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};

use crate::duration::DurationMs;
use crate::error::{ActivityError, EngineError};
use crate::id::{RunId, WorkflowId};
use crate::options::{ActivityOptions, ChildWorkflowOptions, StartOptions};

/// Facts about the workflow execution currently running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionInfo {
    /// Business id.
    pub workflow_id: WorkflowId,
    /// Engine run id.
    pub run_id: RunId,
    /// Workflow name in the contract.
    pub workflow_type: String,
    /// Queue the execution was scheduled on.
    pub task_queue: String,
    /// 1-based attempt number.
    pub attempt: u32,
}

/// A business failure as it crosses the process boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityFailure {
    /// Machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<ActivityError> for ActivityFailure {
    fn from(err: ActivityError) -> Self {
        Self {
            code: err.code,
            message: err.message,
            details: err.details,
        }
    }
}

impl From<ActivityFailure> for ActivityError {
    fn from(failure: ActivityFailure) -> Self {
        Self {
            code: failure.code,
            message: failure.message,
            details: failure.details,
            cause: None,
        }
    }
}

/// Explicit success/failure value an activity hands back through the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum ActivityOutcome {
    /// The activity returned a value.
    Completed(serde_json::Value),
    /// The activity reported a business failure.
    Failed(ActivityFailure),
}

/// Request to start a child workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildStart {
    /// Workflow name in the target contract.
    pub workflow_type: String,
    /// Child business id.
    pub workflow_id: WorkflowId,
    /// The target contract's queue.
    pub task_queue: String,
    /// Validated argument.
    pub args: serde_json::Value,
    /// Pass-through options.
    pub options: ChildWorkflowOptions,
}

/// Request to start a workflow from a client.
#[derive(Debug, Clone, PartialEq)]
pub struct StartWorkflow {
    /// Workflow name in the contract.
    pub workflow_type: String,
    /// The contract's queue.
    pub task_queue: String,
    /// Validated argument.
    pub args: serde_json::Value,
    /// Pass-through options.
    pub options: StartOptions,
}

/// Lifecycle state reported by `describe`.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Still running.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with a failure.
    Failed,
    /// Cancelled.
    Cancelled,
    /// Terminated.
    Terminated,
    /// Exceeded its execution timeout.
    TimedOut,
}

/// Engine-side description of an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDescription {
    /// Business id.
    pub workflow_id: WorkflowId,
    /// Current run id, if known.
    pub run_id: Option<RunId>,
    /// Workflow name.
    pub workflow_type: String,
    /// Queue the execution runs on.
    pub task_queue: String,
    /// Lifecycle state.
    pub status: WorkflowStatus,
}

/// Primitives available to workflow code while it runs inside the engine.
#[async_trait(?Send)]
pub trait WorkflowRuntime {
    /// The current execution.
    fn info(&self) -> &ExecutionInfo;

    /// Schedule an activity and wait for its outcome.
    ///
    /// `Err` is a technical failure; business failures come back as
    /// [`ActivityOutcome::Failed`].
    async fn execute_activity(
        &self,
        activity: &str,
        input: serde_json::Value,
        options: &ActivityOptions,
    ) -> Result<ActivityOutcome, EngineError>;

    /// Start a child workflow on the queue named in the request.
    async fn start_child(
        &self,
        request: ChildStart,
    ) -> Result<Box<dyn NativeChildHandle>, EngineError>;

    /// Durable timer.
    async fn sleep(&self, duration: DurationMs);

    /// Register the signal, query and update handlers of the instance
    /// running on this runtime.
    ///
    /// Called once per instance, before its body starts. The engine routes
    /// every delivery addressed to the execution through `sink`.
    fn register_handlers(&self, sink: Rc<dyn DeliverySink>);
}

/// Delivery side of one workflow instance, as the engine sees it.
///
/// Implemented by the workflow layer and handed to
/// [`WorkflowRuntime::register_handlers`].
#[async_trait(?Send)]
pub trait DeliverySink {
    /// Queue a signal. Returns once it is accepted, not once it is handled.
    fn signal(&self, signal: &str, args: serde_json::Value) -> Result<(), EngineError>;

    /// Answer a query from the current state.
    fn query(&self, query: &str, args: serde_json::Value) -> Result<serde_json::Value, EngineError>;

    /// Run an update and wait for its result.
    async fn update(
        &self,
        update: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, EngineError>;
}

/// Engine handle to a started child workflow.
#[async_trait(?Send)]
pub trait NativeChildHandle {
    /// Child business id.
    fn workflow_id(&self) -> &WorkflowId;

    /// Wait for the child's raw result.
    async fn result(&self) -> Result<serde_json::Value, EngineError>;

    /// Signal the child.
    async fn signal(&self, signal: &str, args: serde_json::Value) -> Result<(), EngineError>;
}

/// Worker-side dispatch of activity invocations by name.
#[async_trait]
pub trait ActivityExecutor: Send + Sync {
    /// Run the named activity.
    async fn execute(
        &self,
        activity: &str,
        input: serde_json::Value,
    ) -> Result<ActivityOutcome, EngineError>;
}

/// One exported callable per workflow, loaded by the engine's workflow runner.
pub trait WorkflowEntrypoint {
    /// Workflow name in the contract.
    fn workflow_type(&self) -> &str;

    /// Run one execution to completion.
    fn invoke(
        &self,
        runtime: Rc<dyn WorkflowRuntime>,
        input: serde_json::Value,
    ) -> LocalBoxFuture<'static, Result<serde_json::Value, EngineError>>;
}

/// Client connection to the engine.
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Start a workflow execution.
    async fn start(
        &self,
        request: StartWorkflow,
    ) -> Result<Box<dyn EngineWorkflowHandle>, EngineError>;

    /// Start a workflow execution and wait for its result.
    async fn execute(&self, request: StartWorkflow) -> Result<serde_json::Value, EngineError> {
        let handle = self.start(request).await?;
        handle.result().await
    }

    /// Handle to an existing execution.
    async fn get_handle(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<Box<dyn EngineWorkflowHandle>, EngineError>;
}

/// Client-side engine handle to a workflow execution.
#[async_trait]
pub trait EngineWorkflowHandle: Send + Sync {
    /// Business id.
    fn workflow_id(&self) -> &WorkflowId;

    /// Wait for the raw result.
    async fn result(&self) -> Result<serde_json::Value, EngineError>;

    /// Deliver a signal.
    async fn signal(&self, signal: &str, args: serde_json::Value) -> Result<(), EngineError>;

    /// Run a query.
    async fn query(
        &self,
        query: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, EngineError>;

    /// Run an update and wait for its result.
    async fn execute_update(
        &self,
        update: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, EngineError>;

    /// Terminate the execution.
    async fn terminate(&self, reason: Option<String>) -> Result<(), EngineError>;

    /// Request cancellation. Cooperative: the engine decides when it lands.
    async fn cancel(&self) -> Result<(), EngineError>;

    /// Describe the execution.
    async fn describe(&self) -> Result<WorkflowDescription, EngineError>;
}
