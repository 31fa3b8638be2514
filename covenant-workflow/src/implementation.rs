//! Workflow implementations and the worker-side registry.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use covenant_activity::ActivityProxy;
use covenant_contract::{Contract, WorkflowDefinition};
use covenant_core::{
    ActivityOptions, ContractError, EngineError, WorkflowEntrypoint, WorkflowRuntime, validate,
};
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use serde_json::Value;

use crate::builder::{BodyFn, Handlers};
use crate::context::WorkflowContext;
use crate::instance::{InstanceHandle, Mailbox, Shared, WorkflowRun, dispatcher};

/// A workflow of a contract with its body and every handler in place.
///
/// Produced by [`crate::WorkflowBuilder::build`]. Each call to
/// [`WorkflowImplementation::start`] creates an independent instance.
pub struct WorkflowImplementation<S> {
    contract: Contract,
    definition: Arc<WorkflowDefinition>,
    init: Rc<dyn Fn(&Value) -> S>,
    handlers: Rc<Handlers<S>>,
    body: BodyFn<S>,
    activity_options: ActivityOptions,
    activity_overrides: Vec<(String, ActivityOptions)>,
}

impl<S: Default + 'static> WorkflowImplementation<S> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        contract: Contract,
        definition: Arc<WorkflowDefinition>,
        init: Rc<dyn Fn(&Value) -> S>,
        handlers: Rc<Handlers<S>>,
        body: BodyFn<S>,
        activity_options: ActivityOptions,
        activity_overrides: Vec<(String, ActivityOptions)>,
    ) -> Self {
        Self {
            contract,
            definition,
            init,
            handlers,
            body,
            activity_options,
            activity_overrides,
        }
    }

    /// Workflow name.
    pub fn name(&self) -> &str {
        self.definition.name()
    }

    /// The contract this implementation belongs to.
    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    /// Start one instance on `runtime`.
    ///
    /// The returned run must be polled to make progress. Deliveries reach
    /// it through the returned handle or, equivalently, through the
    /// handlers registered with `runtime`.
    pub fn start(
        &self,
        runtime: Rc<dyn WorkflowRuntime>,
        input: Value,
    ) -> Result<(WorkflowRun, InstanceHandle<S>), ContractError> {
        let mut activities = ActivityProxy::new(&self.contract, self.name(), Rc::clone(&runtime))?
            .with_options(self.activity_options.clone());
        for (activity, options) in &self.activity_overrides {
            activities = activities.with_activity_options(activity.clone(), options.clone());
        }

        let state = Rc::new(RefCell::new(S::default()));
        let mailbox = Rc::new(RefCell::new(Mailbox::new()));
        let shared = Rc::new(Shared {
            definition: Arc::clone(&self.definition),
            handlers: Rc::clone(&self.handlers),
            state: Rc::clone(&state),
            mailbox: Rc::clone(&mailbox),
        });
        runtime.register_handlers(Rc::new(InstanceHandle::new(Rc::clone(&shared))));
        let ctx = WorkflowContext::new(
            self.contract.clone(),
            Arc::clone(&self.definition),
            runtime,
            state,
            activities,
        );

        tracing::debug!(
            workflow = self.name(),
            workflow_id = %ctx.info().workflow_id,
            "starting workflow instance"
        );

        let body = run_body(
            Arc::clone(&self.definition),
            Rc::clone(&self.init),
            Rc::clone(&self.body),
            ctx.clone(),
            Rc::clone(&mailbox),
            input,
        );
        let run = WorkflowRun::new(
            self.name().to_owned(),
            mailbox,
            dispatcher(Rc::clone(&shared), ctx),
            body,
        );
        Ok((run, InstanceHandle::new(shared)))
    }

    /// Start one instance and wait for its result, with no deliveries.
    pub async fn run(&self, runtime: Rc<dyn WorkflowRuntime>, input: Value) -> Result<Value, ContractError> {
        let (run, _handle) = self.start(runtime, input)?;
        run.await
    }
}

fn run_body<S: 'static>(
    definition: Arc<WorkflowDefinition>,
    init: Rc<dyn Fn(&Value) -> S>,
    body: BodyFn<S>,
    ctx: WorkflowContext<S>,
    mailbox: Rc<RefCell<Mailbox>>,
    input: Value,
) -> LocalBoxFuture<'static, Result<Value, ContractError>> {
    async move {
        let workflow = definition.name();
        let input = validate(definition.input(), input).await.map_err(|issues| {
            tracing::warn!(workflow, issues = issues.len(), "workflow input rejected");
            ContractError::WorkflowInputValidation {
                workflow: workflow.to_owned(),
                issues,
            }
        })?;

        let initial = init(&input);
        ctx.update_state(|state| *state = initial);
        mailbox.borrow_mut().open();

        let output = body(ctx, input).await?;
        validate(definition.output(), output).await.map_err(|issues| {
            tracing::warn!(workflow, issues = issues.len(), "workflow output rejected");
            ContractError::WorkflowOutputValidation {
                workflow: workflow.to_owned(),
                issues,
            }
        })
    }
    .boxed_local()
}

impl<S: Default + 'static> WorkflowEntrypoint for WorkflowImplementation<S> {
    fn workflow_type(&self) -> &str {
        self.name()
    }

    fn invoke(
        &self,
        runtime: Rc<dyn WorkflowRuntime>,
        input: Value,
    ) -> LocalBoxFuture<'static, Result<Value, EngineError>> {
        let started = self.start(runtime, input);
        async move {
            let (run, _handle) = started.map_err(into_engine_error)?;
            run.await.map_err(into_engine_error)
        }
        .boxed_local()
    }
}

/// How a workflow failure is reported to the engine.
fn into_engine_error(err: ContractError) -> EngineError {
    match err {
        ContractError::Engine(err) => err,
        other => EngineError::WorkflowFailed(other.to_string()),
    }
}

impl<S> fmt::Debug for WorkflowImplementation<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowImplementation")
            .field("workflow", &self.definition.name())
            .finish()
    }
}

/// Every workflow entrypoint a worker serves, by name.
pub struct WorkflowRegistry {
    contract: Contract,
    entrypoints: HashMap<String, Rc<dyn WorkflowEntrypoint>>,
}

impl WorkflowRegistry {
    /// Empty registry for the workflows of `contract`.
    pub fn new(contract: &Contract) -> Self {
        Self {
            contract: contract.clone(),
            entrypoints: HashMap::new(),
        }
    }

    /// Add an entrypoint. Its name must be a workflow of the contract and
    /// must not be registered yet.
    pub fn register(&mut self, entrypoint: Rc<dyn WorkflowEntrypoint>) -> Result<(), ContractError> {
        let name = entrypoint.workflow_type().to_owned();
        self.contract.require_workflow(&name)?;
        if self.entrypoints.contains_key(&name) {
            return Err(ContractError::Configuration(format!(
                "workflow '{name}' is registered more than once"
            )));
        }
        self.entrypoints.insert(name, entrypoint);
        Ok(())
    }

    /// Entrypoint by workflow name.
    pub fn get(&self, workflow: &str) -> Option<&Rc<dyn WorkflowEntrypoint>> {
        self.entrypoints.get(workflow)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entrypoints.keys().cloned().collect();
        names.sort();
        names
    }

    /// Every registered entrypoint.
    pub fn entrypoints(&self) -> impl Iterator<Item = &Rc<dyn WorkflowEntrypoint>> {
        self.entrypoints.values()
    }

    /// Fail unless every workflow of the contract has an entrypoint.
    pub fn ensure_complete(&self) -> Result<(), ContractError> {
        let missing: Vec<String> = self
            .contract
            .workflow_names()
            .into_iter()
            .filter(|name| !self.entrypoints.contains_key(name))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ContractError::Configuration(format!(
                "missing workflow implementations: {}",
                missing.join(", ")
            )))
        }
    }
}

impl fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowRegistry")
            .field("workflows", &self.names())
            .finish()
    }
}
