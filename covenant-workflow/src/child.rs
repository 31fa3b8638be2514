//! Child workflow orchestration.
//!
//! Every failure of a child-workflow call (undefined target, rejected
//! argument, rejected result, engine failure) comes back as one
//! [`ChildWorkflowError`] value. The target contract may be the caller's
//! own contract or any other.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use covenant_contract::{Contract, WorkflowDefinition};
use covenant_core::{
    ChildFailure, ChildStart, ChildWorkflowError, ChildWorkflowNotFoundError,
    ChildWorkflowOptions, ContractError, NativeChildHandle, OperationKind, WorkflowId,
    WorkflowRuntime, validate,
};
use serde_json::Value;

/// Starts child workflows from inside a running workflow.
pub struct ChildWorkflowOrchestrator {
    runtime: Rc<dyn WorkflowRuntime>,
    sequence: Cell<u64>,
}

impl ChildWorkflowOrchestrator {
    /// Orchestrator for the execution behind `runtime`.
    pub fn new(runtime: Rc<dyn WorkflowRuntime>) -> Self {
        Self {
            runtime,
            sequence: Cell::new(0),
        }
    }

    fn next_id(&self, workflow: &str) -> WorkflowId {
        let seq = self.sequence.get() + 1;
        self.sequence.set(seq);
        WorkflowId::new(format!("{}-{workflow}-{seq}", self.runtime.info().workflow_id))
    }

    /// Start `workflow` of `target` without waiting for it.
    ///
    /// The engine is not contacted when the workflow is undefined or the
    /// argument is rejected.
    pub async fn start(
        &self,
        target: &Contract,
        workflow: &str,
        input: Value,
        options: ChildWorkflowOptions,
    ) -> Result<ChildWorkflowHandle, ChildWorkflowError> {
        let Some(definition) = target.workflow(workflow) else {
            tracing::warn!(workflow, "child workflow is not defined by the target contract");
            return Err(ChildWorkflowError::new(
                workflow,
                ChildFailure::NotFound(ChildWorkflowNotFoundError {
                    workflow: workflow.to_owned(),
                    available: target.workflow_names(),
                }),
            ));
        };

        let args = validate(definition.input(), input).await.map_err(|issues| {
            tracing::warn!(workflow, issues = issues.len(), "child workflow input rejected");
            ChildWorkflowError::new(workflow, ChildFailure::InvalidInput(issues))
        })?;

        let workflow_id = match options.workflow_id.clone() {
            Some(id) => id,
            None => self.next_id(workflow),
        };
        tracing::debug!(workflow, child_id = %workflow_id, task_queue = target.task_queue(), "starting child workflow");
        let native = self
            .runtime
            .start_child(ChildStart {
                workflow_type: workflow.to_owned(),
                workflow_id,
                task_queue: target.task_queue().to_owned(),
                args,
                options,
            })
            .await
            .map_err(|err| ChildWorkflowError::new(workflow, ChildFailure::Execution(err)))?;

        Ok(ChildWorkflowHandle {
            definition: Arc::clone(definition),
            native,
        })
    }

    /// Start `workflow` of `target` and wait for its validated result.
    pub async fn execute(
        &self,
        target: &Contract,
        workflow: &str,
        input: Value,
        options: ChildWorkflowOptions,
    ) -> Result<Value, ChildWorkflowError> {
        self.start(target, workflow, input, options)
            .await?
            .result()
            .await
    }
}

impl fmt::Debug for ChildWorkflowOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildWorkflowOrchestrator")
            .field("parent", &self.runtime.info().workflow_id)
            .field("started", &self.sequence.get())
            .finish()
    }
}

/// A started child workflow.
pub struct ChildWorkflowHandle {
    definition: Arc<WorkflowDefinition>,
    native: Box<dyn NativeChildHandle>,
}

impl ChildWorkflowHandle {
    /// Child business id.
    pub fn workflow_id(&self) -> &WorkflowId {
        self.native.workflow_id()
    }

    /// Child workflow name.
    pub fn workflow_name(&self) -> &str {
        self.definition.name()
    }

    /// Wait for the child and validate its result against the target's
    /// output schema.
    pub async fn result(&self) -> Result<Value, ChildWorkflowError> {
        let workflow = self.definition.name();
        let raw = self
            .native
            .result()
            .await
            .map_err(|err| ChildWorkflowError::new(workflow, ChildFailure::Execution(err)))?;
        validate(self.definition.output(), raw).await.map_err(|issues| {
            tracing::warn!(workflow, issues = issues.len(), "child workflow output rejected");
            ChildWorkflowError::new(workflow, ChildFailure::InvalidOutput(issues))
        })
    }

    /// Signal the child after validating the payload.
    pub async fn signal(&self, signal: &str, payload: Value) -> Result<(), ContractError> {
        let descriptor = self.definition.require(OperationKind::Signal, signal)?;
        let payload = validate(descriptor.input(), payload)
            .await
            .map_err(|issues| ContractError::SignalInputValidation {
                signal: signal.to_owned(),
                issues,
            })?;
        self.native.signal(signal, payload).await?;
        Ok(())
    }
}

impl fmt::Debug for ChildWorkflowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildWorkflowHandle")
            .field("workflow", &self.definition.name())
            .field("workflow_id", self.workflow_id())
            .finish()
    }
}
