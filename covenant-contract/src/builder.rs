//! Programmatic contract construction.

use covenant_core::{ContractError, Schema};

use crate::assembly::{RawContract, RawDescriptor, RawWorkflow, assemble};
use crate::model::{Contract, OperationDescriptor};

/// Declaration of one workflow and its secondary operations.
///
/// ```
/// use covenant_contract::{Contract, JsonSchema, WorkflowSpec};
/// use serde_json::json;
///
/// # fn main() -> Result<(), covenant_core::ContractError> {
/// let amount = JsonSchema::compile(json!({"type": "object", "required": ["amount"]}))?;
/// let contract = Contract::builder("payments")
///     .workflow(
///         "charge",
///         WorkflowSpec::new(amount.clone(), JsonSchema::any())
///             .signal("cancel", JsonSchema::any()),
///     )
///     .build()?;
/// assert_eq!(contract.workflow_names(), vec!["charge"]);
/// # Ok(())
/// # }
/// ```
pub struct WorkflowSpec {
    descriptor: RawDescriptor,
    activities: Vec<(String, RawDescriptor)>,
    signals: Vec<(String, RawDescriptor)>,
    queries: Vec<(String, RawDescriptor)>,
    updates: Vec<(String, RawDescriptor)>,
}

impl WorkflowSpec {
    /// A workflow with the given argument and result schemas.
    pub fn new(input: impl Schema + 'static, output: impl Schema + 'static) -> Self {
        Self {
            descriptor: OperationDescriptor::new(input, output).into(),
            activities: Vec::new(),
            signals: Vec::new(),
            queries: Vec::new(),
            updates: Vec::new(),
        }
    }

    /// Declare an activity only this workflow may call.
    pub fn activity(mut self, name: impl Into<String>, descriptor: OperationDescriptor) -> Self {
        self.activities.push((name.into(), descriptor.into()));
        self
    }

    /// Declare a signal.
    pub fn signal(mut self, name: impl Into<String>, input: impl Schema + 'static) -> Self {
        self.signals
            .push((name.into(), OperationDescriptor::input_only(input).into()));
        self
    }

    /// Declare a query. Both schemas must validate synchronously.
    pub fn query(
        mut self,
        name: impl Into<String>,
        input: impl Schema + 'static,
        output: impl Schema + 'static,
    ) -> Self {
        self.queries
            .push((name.into(), OperationDescriptor::new(input, output).into()));
        self
    }

    /// Declare an update.
    pub fn update(
        mut self,
        name: impl Into<String>,
        input: impl Schema + 'static,
        output: impl Schema + 'static,
    ) -> Self {
        self.updates
            .push((name.into(), OperationDescriptor::new(input, output).into()));
        self
    }

    fn into_raw(self, name: String) -> RawWorkflow {
        RawWorkflow {
            name,
            descriptor: self.descriptor,
            activities: self.activities,
            signals: self.signals,
            queries: self.queries,
            updates: self.updates,
        }
    }
}

/// Builder for a [`Contract`]. Nothing is checked until [`ContractBuilder::build`].
pub struct ContractBuilder {
    raw: RawContract,
}

impl ContractBuilder {
    pub(crate) fn new(task_queue: impl Into<String>) -> Self {
        Self {
            raw: RawContract {
                task_queue: task_queue.into(),
                workflows: Vec::new(),
                activities: Vec::new(),
            },
        }
    }

    /// Declare an activity every workflow of the contract may call.
    pub fn activity(mut self, name: impl Into<String>, descriptor: OperationDescriptor) -> Self {
        self.raw.activities.push((name.into(), descriptor.into()));
        self
    }

    /// Declare a workflow.
    pub fn workflow(mut self, name: impl Into<String>, spec: WorkflowSpec) -> Self {
        self.raw.workflows.push(spec.into_raw(name.into()));
        self
    }

    /// Check every structural invariant and freeze the contract.
    pub fn build(self) -> Result<Contract, ContractError> {
        assemble(self.raw)
    }
}

impl Contract {
    /// Start building a contract whose workflows run on `task_queue`.
    pub fn builder(task_queue: impl Into<String>) -> ContractBuilder {
        ContractBuilder::new(task_queue)
    }
}
