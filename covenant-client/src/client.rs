//! The client façade.

use std::fmt;
use std::sync::Arc;

use covenant_contract::{Contract, WorkflowDefinition};
use covenant_core::{
    ContractError, EngineClient, Issue, StartOptions, StartWorkflow, WorkflowId, validate,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::handle::ContractWorkflowHandle;

/// Starts and reaches workflows of one contract from outside the worker.
///
/// Workflow names are checked locally and arguments validated before the
/// engine is contacted, so a rejected call never reaches the network.
#[derive(Clone)]
pub struct ContractClient {
    contract: Contract,
    engine: Arc<dyn EngineClient>,
}

impl ContractClient {
    /// Client for `contract` over an engine connection.
    pub fn new(contract: Contract, engine: Arc<dyn EngineClient>) -> Self {
        Self { contract, engine }
    }

    /// The contract this client speaks.
    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    async fn checked_start(
        &self,
        workflow: &str,
        input: Value,
        options: StartOptions,
    ) -> Result<(Arc<WorkflowDefinition>, StartWorkflow), ContractError> {
        let definition = Arc::clone(self.contract.require_workflow(workflow)?);
        let args = validate(definition.input(), input).await.map_err(|issues| {
            tracing::warn!(workflow, issues = issues.len(), "workflow input rejected before start");
            ContractError::WorkflowInputValidation {
                workflow: workflow.to_owned(),
                issues,
            }
        })?;
        let request = StartWorkflow {
            workflow_type: workflow.to_owned(),
            task_queue: self.contract.task_queue().to_owned(),
            args,
            options,
        };
        Ok((definition, request))
    }

    /// Start `workflow` and return a handle to it.
    pub async fn start(
        &self,
        workflow: &str,
        input: Value,
        options: StartOptions,
    ) -> Result<ContractWorkflowHandle, ContractError> {
        let (definition, request) = self.checked_start(workflow, input, options).await?;
        tracing::debug!(
            workflow,
            workflow_id = %request.options.workflow_id,
            task_queue = %request.task_queue,
            "starting workflow"
        );
        let native = self.engine.start(request).await?;
        Ok(ContractWorkflowHandle::new(definition, native))
    }

    /// Start `workflow` and wait for its validated result.
    pub async fn execute(
        &self,
        workflow: &str,
        input: Value,
        options: StartOptions,
    ) -> Result<Value, ContractError> {
        self.start(workflow, input, options).await?.result().await
    }

    /// Start `workflow` with a serializable argument and decode its result.
    pub async fn execute_as<I, O>(
        &self,
        workflow: &str,
        input: &I,
        options: StartOptions,
    ) -> Result<O, ContractError>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let input = serde_json::to_value(input).map_err(|e| ContractError::WorkflowInputValidation {
            workflow: workflow.to_owned(),
            issues: vec![Issue::new(e.to_string())],
        })?;
        let output = self.execute(workflow, input, options).await?;
        serde_json::from_value(output).map_err(|e| ContractError::WorkflowOutputValidation {
            workflow: workflow.to_owned(),
            issues: vec![Issue::new(e.to_string())],
        })
    }

    /// Run several executions concurrently, results in request order.
    pub async fn execute_many(
        &self,
        requests: Vec<(String, Value, StartOptions)>,
    ) -> Vec<Result<Value, ContractError>> {
        let calls = requests
            .into_iter()
            .map(|(workflow, input, options)| async move {
                self.execute(&workflow, input, options).await
            });
        futures::future::join_all(calls).await
    }

    /// Handle to an existing execution of `workflow`.
    pub async fn get_handle(
        &self,
        workflow: &str,
        workflow_id: impl Into<WorkflowId>,
    ) -> Result<ContractWorkflowHandle, ContractError> {
        let definition = Arc::clone(self.contract.require_workflow(workflow)?);
        let native = self.engine.get_handle(&workflow_id.into()).await?;
        Ok(ContractWorkflowHandle::new(definition, native))
    }
}

impl fmt::Debug for ContractClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractClient")
            .field("task_queue", &self.contract.task_queue())
            .field("workflows", &self.contract.workflow_names())
            .finish()
    }
}
