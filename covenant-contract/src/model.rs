//! The assembled, immutable contract.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use covenant_core::{ContractError, OperationKind, Schema, SchemaRef};

/// A named operation's argument schema and, where it has one, result schema.
#[derive(Clone)]
pub struct OperationDescriptor {
    pub(crate) input: SchemaRef,
    pub(crate) output: Option<SchemaRef>,
}

impl OperationDescriptor {
    /// Descriptor with both an input and an output schema.
    pub fn new(input: impl Schema + 'static, output: impl Schema + 'static) -> Self {
        Self {
            input: Arc::new(input),
            output: Some(Arc::new(output)),
        }
    }

    /// Descriptor with an input schema only (signals).
    pub fn input_only(input: impl Schema + 'static) -> Self {
        Self {
            input: Arc::new(input),
            output: None,
        }
    }

    pub(crate) fn from_parts(input: SchemaRef, output: Option<SchemaRef>) -> Self {
        Self { input, output }
    }

    /// Argument schema.
    pub fn input(&self) -> &dyn Schema {
        self.input.as_ref()
    }

    /// Result schema. Always present for activities, queries and updates of
    /// an assembled contract.
    pub fn output(&self) -> Option<&dyn Schema> {
        self.output.as_deref()
    }

    /// Whether either schema may suspend while validating.
    pub fn is_async(&self) -> bool {
        self.input.is_async() || self.output.as_ref().is_some_and(|o| o.is_async())
    }
}

impl fmt::Debug for OperationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationDescriptor")
            .field("has_output", &self.output.is_some())
            .field("is_async", &self.is_async())
            .finish()
    }
}

pub(crate) type DescriptorMap = HashMap<String, Arc<OperationDescriptor>>;

fn sorted_names<V>(map: &HashMap<String, V>) -> Vec<String> {
    let mut names: Vec<String> = map.keys().cloned().collect();
    names.sort();
    names
}

/// One workflow of a contract.
pub struct WorkflowDefinition {
    pub(crate) name: String,
    pub(crate) input: SchemaRef,
    pub(crate) output: SchemaRef,
    pub(crate) activities: DescriptorMap,
    pub(crate) signals: DescriptorMap,
    pub(crate) queries: DescriptorMap,
    pub(crate) updates: DescriptorMap,
}

impl WorkflowDefinition {
    /// Workflow name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Argument schema.
    pub fn input(&self) -> &dyn Schema {
        self.input.as_ref()
    }

    /// Result schema.
    pub fn output(&self) -> &dyn Schema {
        self.output.as_ref()
    }

    /// Activity declared on this workflow only (not global ones).
    pub fn scoped_activity(&self, name: &str) -> Option<&Arc<OperationDescriptor>> {
        self.activities.get(name)
    }

    /// Signal descriptor.
    pub fn signal(&self, name: &str) -> Option<&Arc<OperationDescriptor>> {
        self.signals.get(name)
    }

    /// Query descriptor.
    pub fn query(&self, name: &str) -> Option<&Arc<OperationDescriptor>> {
        self.queries.get(name)
    }

    /// Update descriptor.
    pub fn update(&self, name: &str) -> Option<&Arc<OperationDescriptor>> {
        self.updates.get(name)
    }

    /// Look up a signal, query or update, failing with the declared names.
    pub fn require(
        &self,
        kind: OperationKind,
        name: &str,
    ) -> Result<&Arc<OperationDescriptor>, ContractError> {
        let map = match kind {
            OperationKind::Signal => &self.signals,
            OperationKind::Query => &self.queries,
            OperationKind::Update => &self.updates,
            _ => &self.activities,
        };
        map.get(name).ok_or_else(|| ContractError::UnknownOperation {
            kind,
            name: name.to_owned(),
            workflow: self.name.clone(),
            available: sorted_names(map),
        })
    }

    /// Names of workflow-scoped activities, sorted.
    pub fn scoped_activity_names(&self) -> Vec<String> {
        sorted_names(&self.activities)
    }

    /// Signal names, sorted.
    pub fn signal_names(&self) -> Vec<String> {
        sorted_names(&self.signals)
    }

    /// Query names, sorted.
    pub fn query_names(&self) -> Vec<String> {
        sorted_names(&self.queries)
    }

    /// Update names, sorted.
    pub fn update_names(&self) -> Vec<String> {
        sorted_names(&self.updates)
    }
}

impl fmt::Debug for WorkflowDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowDefinition")
            .field("name", &self.name)
            .field("activities", &self.scoped_activity_names())
            .field("signals", &self.signal_names())
            .field("queries", &self.query_names())
            .field("updates", &self.update_names())
            .finish()
    }
}

pub(crate) struct ContractInner {
    pub(crate) task_queue: String,
    pub(crate) workflows: HashMap<String, Arc<WorkflowDefinition>>,
    pub(crate) activities: DescriptorMap,
}

/// An assembled contract.
///
/// Immutable once built and cheap to clone: clones share the same
/// definitions, so the same name always resolves to the same `Arc`. Build
/// one at startup with [`Contract::builder`] or [`Contract::from_document`]
/// and thread it through every factory.
#[derive(Clone)]
pub struct Contract {
    pub(crate) inner: Arc<ContractInner>,
}

impl Contract {
    /// Queue every workflow of this contract runs on.
    pub fn task_queue(&self) -> &str {
        &self.inner.task_queue
    }

    /// Workflow definition by name.
    pub fn workflow(&self, name: &str) -> Option<&Arc<WorkflowDefinition>> {
        self.inner.workflows.get(name)
    }

    /// Workflow definition by name, failing with the defined names.
    pub fn require_workflow(&self, name: &str) -> Result<&Arc<WorkflowDefinition>, ContractError> {
        self.workflow(name)
            .ok_or_else(|| ContractError::WorkflowNotFound {
                workflow: name.to_owned(),
                available: self.workflow_names(),
            })
    }

    /// Global activity by name.
    pub fn activity(&self, name: &str) -> Option<&Arc<OperationDescriptor>> {
        self.inner.activities.get(name)
    }

    /// Workflow names, sorted.
    pub fn workflow_names(&self) -> Vec<String> {
        sorted_names(&self.inner.workflows)
    }

    /// Global activity names, sorted.
    pub fn activity_names(&self) -> Vec<String> {
        sorted_names(&self.inner.activities)
    }

    /// Every activity reachable from `workflow`: global ones merged with
    /// the workflow's own. The two sets are disjoint by construction.
    pub fn workflow_activities(
        &self,
        workflow: &str,
    ) -> Result<BTreeMap<String, Arc<OperationDescriptor>>, ContractError> {
        let definition = self.require_workflow(workflow)?;
        Ok(self
            .inner
            .activities
            .iter()
            .chain(definition.activities.iter())
            .map(|(name, descriptor)| (name.clone(), Arc::clone(descriptor)))
            .collect())
    }

    /// Every activity declared anywhere in the contract, keyed by name.
    pub fn all_activities(&self) -> BTreeMap<String, Arc<OperationDescriptor>> {
        let scoped = self
            .inner
            .workflows
            .values()
            .flat_map(|workflow| workflow.activities.iter());
        self.inner
            .activities
            .iter()
            .chain(scoped)
            .map(|(name, descriptor)| (name.clone(), Arc::clone(descriptor)))
            .collect()
    }

    /// Whether two handles share the same assembled contract.
    pub fn ptr_eq(&self, other: &Contract) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contract")
            .field("task_queue", &self.inner.task_queue)
            .field("workflows", &self.workflow_names())
            .field("activities", &self.activity_names())
            .finish()
    }
}
