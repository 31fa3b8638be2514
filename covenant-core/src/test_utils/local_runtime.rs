//! LocalRuntime — in-process, single-threaded workflow runtime.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{LocalBoxFuture, Shared};

use crate::duration::DurationMs;
use crate::engine::{
    ActivityExecutor, ActivityOutcome, ChildStart, DeliverySink, ExecutionInfo, NativeChildHandle,
    WorkflowEntrypoint, WorkflowRuntime,
};
use crate::error::{EngineError, OperationKind};
use crate::id::{RunId, WorkflowId};
use crate::options::ActivityOptions;

/// A native call observed by [`LocalRuntime`].
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeCall {
    /// An activity was scheduled.
    Activity {
        /// Activity name.
        name: String,
        /// Argument as sent to the engine.
        input: serde_json::Value,
        /// Options as sent to the engine.
        options: ActivityOptions,
    },
    /// A child workflow was started.
    StartChild {
        /// Child workflow name.
        workflow_type: String,
        /// Child id.
        workflow_id: WorkflowId,
        /// Queue the child was started on.
        task_queue: String,
        /// Argument as sent to the engine.
        args: serde_json::Value,
    },
    /// A child workflow was signaled.
    SignalChild {
        /// Child id.
        workflow_id: WorkflowId,
        /// Signal name.
        signal: String,
        /// Payload.
        args: serde_json::Value,
    },
    /// A timer was started.
    Sleep(DurationMs),
}

struct Registry {
    activities: RefCell<Option<Arc<dyn ActivityExecutor>>>,
    workflows: RefCell<HashMap<String, Rc<dyn WorkflowEntrypoint>>>,
    calls: RefCell<Vec<RuntimeCall>>,
    runs: Cell<u64>,
}

/// In-process [`WorkflowRuntime`] for tests.
///
/// Activities run through the configured [`ActivityExecutor`]. Child
/// workflows run through registered [`WorkflowEntrypoint`]s and start
/// lazily, when their result is first awaited. Timers yield once instead of
/// waiting. Every native call, including those of child executions, is
/// recorded in one shared log.
///
/// Signals, queries and updates reach the instance through the handlers it
/// registered, both for the top-level execution ([`LocalRuntime::signal`],
/// [`LocalRuntime::query`], [`LocalRuntime::update`]) and for children
/// signaled through their handle.
pub struct LocalRuntime {
    info: ExecutionInfo,
    registry: Rc<Registry>,
    handlers: HandlerSlot,
}

type HandlerSlot = Rc<RefCell<Option<Rc<dyn DeliverySink>>>>;

fn registered(
    slot: &HandlerSlot,
    kind: OperationKind,
    name: &str,
) -> Result<Rc<dyn DeliverySink>, EngineError> {
    slot.borrow().clone().ok_or_else(|| EngineError::Rejected {
        kind,
        name: name.to_owned(),
        message: "the execution registered no handlers".into(),
    })
}

impl LocalRuntime {
    /// Runtime for an execution of `workflow_type` with the given id on the
    /// `local` queue.
    pub fn new(workflow_type: impl Into<String>, workflow_id: impl Into<WorkflowId>) -> Self {
        let registry = Rc::new(Registry {
            activities: RefCell::new(None),
            workflows: RefCell::new(HashMap::new()),
            calls: RefCell::new(Vec::new()),
            runs: Cell::new(1),
        });
        Self {
            info: ExecutionInfo {
                workflow_id: workflow_id.into(),
                run_id: RunId::new("run-1"),
                workflow_type: workflow_type.into(),
                task_queue: "local".into(),
                attempt: 1,
            },
            registry,
            handlers: Rc::new(RefCell::new(None)),
        }
    }

    /// Override the queue reported by [`WorkflowRuntime::info`].
    pub fn with_task_queue(mut self, task_queue: impl Into<String>) -> Self {
        self.info.task_queue = task_queue.into();
        self
    }

    /// Route activity calls, including those of child executions, to
    /// `executor`.
    pub fn with_activities(self, executor: Arc<dyn ActivityExecutor>) -> Self {
        *self.registry.activities.borrow_mut() = Some(executor);
        self
    }

    /// Make a workflow available as a child workflow target.
    pub fn register_workflow(&self, entrypoint: Rc<dyn WorkflowEntrypoint>) {
        self.registry
            .workflows
            .borrow_mut()
            .insert(entrypoint.workflow_type().to_owned(), entrypoint);
    }

    /// Every native call so far, in order.
    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.registry.calls.borrow().clone()
    }

    /// Number of activity invocations that reached the engine.
    pub fn activity_call_count(&self) -> usize {
        self.count(|call| matches!(call, RuntimeCall::Activity { .. }))
    }

    /// Number of child starts that reached the engine.
    pub fn child_start_count(&self) -> usize {
        self.count(|call| matches!(call, RuntimeCall::StartChild { .. }))
    }

    /// Deliver a signal to the instance running on this runtime.
    pub fn signal(&self, signal: &str, args: serde_json::Value) -> Result<(), EngineError> {
        registered(&self.handlers, OperationKind::Signal, signal)?.signal(signal, args)
    }

    /// Query the instance running on this runtime.
    pub fn query(
        &self,
        query: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, EngineError> {
        registered(&self.handlers, OperationKind::Query, query)?.query(query, args)
    }

    /// Run an update on the instance running on this runtime.
    pub async fn update(
        &self,
        update: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, EngineError> {
        let sink = registered(&self.handlers, OperationKind::Update, update)?;
        sink.update(update, args).await
    }

    fn count(&self, pred: impl Fn(&RuntimeCall) -> bool) -> usize {
        self.registry.calls.borrow().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: RuntimeCall) {
        self.registry.calls.borrow_mut().push(call);
    }
}

#[async_trait(?Send)]
impl WorkflowRuntime for LocalRuntime {
    fn info(&self) -> &ExecutionInfo {
        &self.info
    }

    async fn execute_activity(
        &self,
        activity: &str,
        input: serde_json::Value,
        options: &ActivityOptions,
    ) -> Result<ActivityOutcome, EngineError> {
        self.record(RuntimeCall::Activity {
            name: activity.to_owned(),
            input: input.clone(),
            options: options.clone(),
        });
        let executor = self
            .registry
            .activities
            .borrow()
            .clone()
            .ok_or_else(|| EngineError::Other("no activity executor configured".into()))?;
        executor.execute(activity, input).await
    }

    async fn start_child(
        &self,
        request: ChildStart,
    ) -> Result<Box<dyn NativeChildHandle>, EngineError> {
        self.record(RuntimeCall::StartChild {
            workflow_type: request.workflow_type.clone(),
            workflow_id: request.workflow_id.clone(),
            task_queue: request.task_queue.clone(),
            args: request.args.clone(),
        });
        let entrypoint = self
            .registry
            .workflows
            .borrow()
            .get(&request.workflow_type)
            .cloned()
            .ok_or_else(|| {
                EngineError::Other(format!(
                    "workflow type '{}' is not registered",
                    request.workflow_type
                ))
            })?;

        let run = self.registry.runs.get() + 1;
        self.registry.runs.set(run);
        let child = LocalRuntime {
            info: ExecutionInfo {
                workflow_id: request.workflow_id.clone(),
                run_id: RunId::new(format!("run-{run}")),
                workflow_type: request.workflow_type,
                task_queue: request.task_queue,
                attempt: 1,
            },
            registry: Rc::clone(&self.registry),
            handlers: Rc::new(RefCell::new(None)),
        };
        let handlers = Rc::clone(&child.handlers);
        let result = entrypoint.invoke(Rc::new(child), request.args).shared();
        Ok(Box::new(LocalChildHandle {
            workflow_id: request.workflow_id,
            result,
            registry: Rc::clone(&self.registry),
            handlers,
        }))
    }

    async fn sleep(&self, duration: DurationMs) {
        self.record(RuntimeCall::Sleep(duration));
        tokio::task::yield_now().await;
    }

    fn register_handlers(&self, sink: Rc<dyn DeliverySink>) {
        *self.handlers.borrow_mut() = Some(sink);
    }
}

type ChildResult = Shared<LocalBoxFuture<'static, Result<serde_json::Value, EngineError>>>;

struct LocalChildHandle {
    workflow_id: WorkflowId,
    result: ChildResult,
    registry: Rc<Registry>,
    handlers: HandlerSlot,
}

#[async_trait(?Send)]
impl NativeChildHandle for LocalChildHandle {
    fn workflow_id(&self) -> &WorkflowId {
        &self.workflow_id
    }

    async fn result(&self) -> Result<serde_json::Value, EngineError> {
        self.result.clone().await
    }

    async fn signal(&self, signal: &str, args: serde_json::Value) -> Result<(), EngineError> {
        self.registry
            .calls
            .borrow_mut()
            .push(RuntimeCall::SignalChild {
                workflow_id: self.workflow_id.clone(),
                signal: signal.to_owned(),
                args: args.clone(),
            });
        // Queued now; handled once the child runs.
        registered(&self.handlers, OperationKind::Signal, signal)?.signal(signal, args)
    }
}
