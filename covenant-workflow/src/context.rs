//! What workflow bodies and handlers see while they run.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Poll, Waker};

use covenant_activity::ActivityProxy;
use covenant_contract::{Contract, WorkflowDefinition};
use covenant_core::{DurationMs, ExecutionInfo, WorkflowRuntime};
use futures::future::poll_fn;

use crate::child::ChildWorkflowOrchestrator;

struct ContextInner<S> {
    contract: Contract,
    definition: Arc<WorkflowDefinition>,
    runtime: Rc<dyn WorkflowRuntime>,
    state: Rc<RefCell<S>>,
    waiters: RefCell<Vec<Waker>>,
    activities: ActivityProxy,
    children: ChildWorkflowOrchestrator,
}

/// Handle passed to the workflow body and to every signal and update
/// handler of one instance.
///
/// All clones share the same state. State is only reachable through
/// closures ([`WorkflowContext::state`], [`WorkflowContext::update_state`]),
/// so no borrow can be held across an await point.
pub struct WorkflowContext<S> {
    inner: Rc<ContextInner<S>>,
}

impl<S> Clone for WorkflowContext<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S> WorkflowContext<S> {
    pub(crate) fn new(
        contract: Contract,
        definition: Arc<WorkflowDefinition>,
        runtime: Rc<dyn WorkflowRuntime>,
        state: Rc<RefCell<S>>,
        activities: ActivityProxy,
    ) -> Self {
        let children = ChildWorkflowOrchestrator::new(Rc::clone(&runtime));
        Self {
            inner: Rc::new(ContextInner {
                contract,
                definition,
                runtime,
                state,
                waiters: RefCell::new(Vec::new()),
                activities,
                children,
            }),
        }
    }

    /// The current execution.
    pub fn info(&self) -> &ExecutionInfo {
        self.inner.runtime.info()
    }

    /// Name of the running workflow.
    pub fn workflow_name(&self) -> &str {
        self.inner.definition.name()
    }

    /// The contract this workflow belongs to.
    pub fn contract(&self) -> &Contract {
        &self.inner.contract
    }

    /// Read the instance state.
    pub fn state<R>(&self, read: impl FnOnce(&S) -> R) -> R {
        read(&*self.inner.state.borrow())
    }

    /// Mutate the instance state. Wakes every [`WorkflowContext::wait_until`].
    pub fn update_state<R>(&self, write: impl FnOnce(&mut S) -> R) -> R {
        let result = write(&mut *self.inner.state.borrow_mut());
        let waiters = std::mem::take(&mut *self.inner.waiters.borrow_mut());
        for waiter in waiters {
            waiter.wake();
        }
        result
    }

    /// Resolve once `condition` holds for the instance state.
    ///
    /// Re-checked after every [`WorkflowContext::update_state`], so a body
    /// can wait for state that signal and update handlers change without
    /// polling a timer.
    pub async fn wait_until(&self, condition: impl Fn(&S) -> bool) {
        poll_fn(|cx| {
            if self.state(&condition) {
                return Poll::Ready(());
            }
            let mut waiters = self.inner.waiters.borrow_mut();
            if !waiters.iter().any(|waiter| waiter.will_wake(cx.waker())) {
                waiters.push(cx.waker().clone());
            }
            Poll::Pending
        })
        .await
    }

    /// Activities this workflow may call.
    pub fn activities(&self) -> &ActivityProxy {
        &self.inner.activities
    }

    /// Child workflow starts from this instance.
    pub fn children(&self) -> &ChildWorkflowOrchestrator {
        &self.inner.children
    }

    /// Durable timer.
    pub async fn sleep(&self, duration: DurationMs) {
        self.inner.runtime.sleep(duration).await;
    }
}

impl<S> fmt::Debug for WorkflowContext<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowContext")
            .field("workflow", &self.workflow_name())
            .field("workflow_id", &self.info().workflow_id)
            .finish()
    }
}
