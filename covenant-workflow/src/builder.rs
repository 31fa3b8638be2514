//! Handler registration for one workflow of a contract.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;

use covenant_contract::{Contract, WorkflowDefinition};
use covenant_core::{ActivityOptions, ContractError, OperationKind};
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use serde_json::Value;

use crate::context::WorkflowContext;
use crate::implementation::WorkflowImplementation;

/// A signal handler. Errors are logged and reported to the sender.
pub type SignalFn<S> =
    Rc<dyn Fn(WorkflowContext<S>, Value) -> LocalBoxFuture<'static, Result<(), ContractError>>>;

/// A query handler: a synchronous read of the state.
pub type QueryFn<S> = Rc<dyn Fn(&S, Value) -> Result<Value, ContractError>>;

/// An update handler.
pub type UpdateFn<S> =
    Rc<dyn Fn(WorkflowContext<S>, Value) -> LocalBoxFuture<'static, Result<Value, ContractError>>>;

/// The workflow's main body.
pub type BodyFn<S> = UpdateFn<S>;

pub(crate) struct Handlers<S> {
    pub(crate) signals: HashMap<String, SignalFn<S>>,
    pub(crate) queries: HashMap<String, QueryFn<S>>,
    pub(crate) updates: HashMap<String, UpdateFn<S>>,
}

/// Registers the signal, query and update handlers of one workflow and
/// checks them against its contract.
///
/// Nothing is checked until [`WorkflowBuilder::build`], which fails when a
/// handler names an undeclared operation, a declared operation has no
/// handler, or a query schema may suspend.
pub struct WorkflowBuilder<S> {
    contract: Contract,
    workflow: String,
    init: Rc<dyn Fn(&Value) -> S>,
    signals: Vec<(String, SignalFn<S>)>,
    queries: Vec<(String, QueryFn<S>)>,
    updates: Vec<(String, UpdateFn<S>)>,
    activity_options: ActivityOptions,
    activity_overrides: Vec<(String, ActivityOptions)>,
}

impl<S: Default + 'static> WorkflowBuilder<S> {
    /// Builder for `workflow` of `contract`. Each instance starts from
    /// `S::default()` unless [`WorkflowBuilder::initial_state`] says
    /// otherwise.
    pub fn new(contract: &Contract, workflow: impl Into<String>) -> Self {
        Self {
            contract: contract.clone(),
            workflow: workflow.into(),
            init: Rc::new(|_: &Value| S::default()),
            signals: Vec::new(),
            queries: Vec::new(),
            updates: Vec::new(),
            activity_options: ActivityOptions::default(),
            activity_overrides: Vec::new(),
        }
    }

    /// Derive each instance's initial state from its validated input.
    pub fn initial_state(mut self, init: impl Fn(&Value) -> S + 'static) -> Self {
        self.init = Rc::new(init);
        self
    }

    /// Register the handler of signal `name`.
    pub fn signal<F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(WorkflowContext<S>, Value) -> Fut + 'static,
        Fut: Future<Output = Result<(), ContractError>> + 'static,
    {
        let handler: SignalFn<S> = Rc::new(move |ctx: WorkflowContext<S>, payload: Value| {
            handler(ctx, payload).boxed_local()
        });
        self.signals.push((name.into(), handler));
        self
    }

    /// Register the handler of query `name`.
    pub fn query<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&S, Value) -> Result<Value, ContractError> + 'static,
    {
        self.queries.push((name.into(), Rc::new(handler)));
        self
    }

    /// Register the handler of update `name`.
    pub fn update<F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(WorkflowContext<S>, Value) -> Fut + 'static,
        Fut: Future<Output = Result<Value, ContractError>> + 'static,
    {
        let handler: UpdateFn<S> = Rc::new(move |ctx: WorkflowContext<S>, payload: Value| {
            handler(ctx, payload).boxed_local()
        });
        self.updates.push((name.into(), handler));
        self
    }

    /// Options every activity call of this workflow is sent with.
    pub fn activity_options(mut self, options: ActivityOptions) -> Self {
        self.activity_options = options;
        self
    }

    /// Options for calls to one activity.
    pub fn activity_override(mut self, activity: impl Into<String>, options: ActivityOptions) -> Self {
        self.activity_overrides.push((activity.into(), options));
        self
    }

    /// Check every registration and produce the implementation.
    pub fn build<F, Fut>(self, body: F) -> Result<WorkflowImplementation<S>, ContractError>
    where
        F: Fn(WorkflowContext<S>, Value) -> Fut + 'static,
        Fut: Future<Output = Result<Value, ContractError>> + 'static,
    {
        let definition = Arc::clone(self.contract.require_workflow(&self.workflow)?);

        let signals = collect(&definition, OperationKind::Signal, self.signals)?;
        let queries = collect(&definition, OperationKind::Query, self.queries)?;
        let updates = collect(&definition, OperationKind::Update, self.updates)?;

        for name in queries.keys() {
            if let Some(descriptor) = definition.query(name)
                && descriptor.is_async()
            {
                return Err(ContractError::Configuration(format!(
                    "query '{name}' of workflow '{}' has a schema that validates asynchronously; queries must validate synchronously",
                    definition.name()
                )));
            }
        }

        let reachable = self.contract.workflow_activities(&self.workflow)?;
        for (activity, _) in &self.activity_overrides {
            if !reachable.contains_key(activity) {
                return Err(ContractError::Configuration(format!(
                    "options given for activity '{activity}', which workflow '{}' cannot call",
                    definition.name()
                )));
            }
        }

        tracing::debug!(
            workflow = definition.name(),
            signals = signals.len(),
            queries = queries.len(),
            updates = updates.len(),
            "workflow implementation built"
        );

        let body: BodyFn<S> = Rc::new(move |ctx: WorkflowContext<S>, input: Value| {
            body(ctx, input).boxed_local()
        });
        Ok(WorkflowImplementation::new(
            self.contract,
            definition,
            self.init,
            Rc::new(Handlers {
                signals,
                queries,
                updates,
            }),
            body,
            self.activity_options,
            self.activity_overrides,
        ))
    }
}

fn collect<H>(
    definition: &WorkflowDefinition,
    kind: OperationKind,
    registered: Vec<(String, H)>,
) -> Result<HashMap<String, H>, ContractError> {
    let declared: BTreeSet<String> = match kind {
        OperationKind::Signal => definition.signal_names(),
        OperationKind::Query => definition.query_names(),
        _ => definition.update_names(),
    }
    .into_iter()
    .collect();

    let mut handlers = HashMap::with_capacity(registered.len());
    for (name, handler) in registered {
        if !declared.contains(&name) {
            return Err(ContractError::Configuration(format!(
                "handler registered for {kind} '{name}', which workflow '{}' does not declare",
                definition.name()
            )));
        }
        if handlers.insert(name.clone(), handler).is_some() {
            return Err(ContractError::Configuration(format!(
                "{kind} '{name}' has more than one handler"
            )));
        }
    }

    let missing: Vec<&str> = declared
        .iter()
        .filter(|name| !handlers.contains_key(*name))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(ContractError::Configuration(format!(
            "workflow '{}' has no {kind} handler for: {}",
            definition.name(),
            missing.join(", ")
        )));
    }
    Ok(handlers)
}
