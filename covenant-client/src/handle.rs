//! Validated handle to one workflow execution.

use std::fmt;
use std::sync::Arc;

use covenant_contract::WorkflowDefinition;
use covenant_core::{
    ContractError, EngineWorkflowHandle, OperationKind, WorkflowDescription, WorkflowId, validate,
};
use serde_json::Value;

/// A workflow execution seen through its contract.
///
/// Every payload is validated against the operation's own descriptor
/// before it leaves the process, and every response before it is returned.
pub struct ContractWorkflowHandle {
    definition: Arc<WorkflowDefinition>,
    native: Box<dyn EngineWorkflowHandle>,
}

impl ContractWorkflowHandle {
    pub(crate) fn new(definition: Arc<WorkflowDefinition>, native: Box<dyn EngineWorkflowHandle>) -> Self {
        Self { definition, native }
    }

    /// Execution id.
    pub fn workflow_id(&self) -> &WorkflowId {
        self.native.workflow_id()
    }

    /// Workflow name.
    pub fn workflow_name(&self) -> &str {
        self.definition.name()
    }

    /// Wait for the result and validate it against the output schema.
    pub async fn result(&self) -> Result<Value, ContractError> {
        let workflow = self.definition.name();
        let raw = self.native.result().await?;
        validate(self.definition.output(), raw).await.map_err(|issues| {
            tracing::warn!(workflow, workflow_id = %self.workflow_id(), issues = issues.len(), "workflow result rejected");
            ContractError::WorkflowOutputValidation {
                workflow: workflow.to_owned(),
                issues,
            }
        })
    }

    /// Send signal `name`.
    pub async fn signal(&self, name: &str, payload: Value) -> Result<(), ContractError> {
        let descriptor = self.definition.require(OperationKind::Signal, name)?;
        let payload = validate(descriptor.input(), payload).await.map_err(|issues| {
            tracing::warn!(workflow = self.workflow_name(), signal = name, "signal payload rejected");
            ContractError::SignalInputValidation {
                signal: name.to_owned(),
                issues,
            }
        })?;
        tracing::debug!(workflow = self.workflow_name(), signal = name, "sending signal");
        self.native.signal(name, payload).await?;
        Ok(())
    }

    /// Run query `name`.
    pub async fn query(&self, name: &str, payload: Value) -> Result<Value, ContractError> {
        let descriptor = self.definition.require(OperationKind::Query, name)?;
        let payload = validate(descriptor.input(), payload).await.map_err(|issues| {
            tracing::warn!(workflow = self.workflow_name(), query = name, "query argument rejected");
            ContractError::QueryInputValidation {
                query: name.to_owned(),
                issues,
            }
        })?;
        let output = self.native.query(name, payload).await?;
        match descriptor.output() {
            Some(schema) => validate(schema, output).await.map_err(|issues| {
                tracing::warn!(workflow = self.workflow_name(), query = name, "query response rejected");
                ContractError::QueryOutputValidation {
                    query: name.to_owned(),
                    issues,
                }
            }),
            None => Ok(output),
        }
    }

    /// Run update `name` and wait for its result.
    pub async fn update(&self, name: &str, payload: Value) -> Result<Value, ContractError> {
        let descriptor = self.definition.require(OperationKind::Update, name)?;
        let payload = validate(descriptor.input(), payload).await.map_err(|issues| {
            tracing::warn!(workflow = self.workflow_name(), update = name, "update argument rejected");
            ContractError::UpdateInputValidation {
                update: name.to_owned(),
                issues,
            }
        })?;
        tracing::debug!(workflow = self.workflow_name(), update = name, "sending update");
        let output = self.native.execute_update(name, payload).await?;
        match descriptor.output() {
            Some(schema) => validate(schema, output).await.map_err(|issues| {
                tracing::warn!(workflow = self.workflow_name(), update = name, "update result rejected");
                ContractError::UpdateOutputValidation {
                    update: name.to_owned(),
                    issues,
                }
            }),
            None => Ok(output),
        }
    }

    /// Terminate the execution.
    pub async fn terminate(&self, reason: Option<&str>) -> Result<(), ContractError> {
        tracing::debug!(workflow = self.workflow_name(), workflow_id = %self.workflow_id(), "terminating workflow");
        self.native.terminate(reason.map(str::to_owned)).await?;
        Ok(())
    }

    /// Ask the engine to cancel the execution. Returns once the request is
    /// accepted, not once the workflow has stopped.
    pub async fn cancel(&self) -> Result<(), ContractError> {
        tracing::debug!(workflow = self.workflow_name(), workflow_id = %self.workflow_id(), "requesting cancellation");
        self.native.cancel().await?;
        Ok(())
    }

    /// Engine-side description of the execution.
    pub async fn describe(&self) -> Result<WorkflowDescription, ContractError> {
        Ok(self.native.describe().await?)
    }
}

impl fmt::Debug for ContractWorkflowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractWorkflowHandle")
            .field("workflow", &self.workflow_name())
            .field("workflow_id", self.workflow_id())
            .finish()
    }
}
