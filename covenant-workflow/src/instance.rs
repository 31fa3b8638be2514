//! The cooperative instance loop.
//!
//! A [`WorkflowRun`] drives one workflow instance: its main body plus every
//! signal and update delivered through an [`InstanceHandle`]. Deliveries
//! wait in a mailbox and run strictly one at a time; on each turn the
//! active delivery is polled first, then the main body. Nothing runs in
//! parallel and no lock guards the state. The handle is also registered
//! with the runtime as the instance's [`DeliverySink`], so deliveries the
//! engine routes take the same path.
//!
//! Deliveries are held until the workflow input has been validated. Once
//! the body finishes, queued deliveries are drained before the run
//! resolves. Anything delivered after that fails with
//! [`ContractError::InstanceClosed`].

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use async_trait::async_trait;
use covenant_contract::WorkflowDefinition;
use covenant_core::{
    ContractError, DeliverySink, EngineError, OperationKind, validate, validate_now,
};
use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use serde_json::Value;

use crate::builder::Handlers;
use crate::context::WorkflowContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Input not yet validated; deliveries wait.
    Starting,
    /// Body running; deliveries are processed.
    Running,
    /// Body finished; queued deliveries are drained.
    Draining,
    /// Nothing more is accepted.
    Closed,
}

pub(crate) enum Delivery {
    Signal {
        name: String,
        payload: Value,
        ack: oneshot::Sender<Result<(), ContractError>>,
    },
    Update {
        name: String,
        payload: Value,
        reply: oneshot::Sender<Result<Value, ContractError>>,
    },
}

impl Delivery {
    fn reject(self, err: ContractError) {
        // The sender may have stopped waiting; that is fine.
        match self {
            Delivery::Signal { ack, .. } => {
                let _ = ack.send(Err(err));
            }
            Delivery::Update { reply, .. } => {
                let _ = reply.send(Err(err));
            }
        }
    }
}

pub(crate) struct Mailbox {
    phase: Phase,
    queue: VecDeque<Delivery>,
    waker: Option<Waker>,
}

impl Mailbox {
    pub(crate) fn new() -> Self {
        Self {
            phase: Phase::Starting,
            queue: VecDeque::new(),
            waker: None,
        }
    }

    fn take_ready(&mut self) -> Option<Delivery> {
        match self.phase {
            Phase::Running | Phase::Draining => self.queue.pop_front(),
            Phase::Starting | Phase::Closed => None,
        }
    }

    fn has_ready(&self) -> bool {
        matches!(self.phase, Phase::Running | Phase::Draining) && !self.queue.is_empty()
    }

    pub(crate) fn open(&mut self) {
        if self.phase == Phase::Starting {
            self.phase = Phase::Running;
        }
    }

    fn close(&mut self, workflow: &str) {
        self.phase = Phase::Closed;
        for delivery in self.queue.drain(..) {
            delivery.reject(ContractError::InstanceClosed {
                workflow: workflow.to_owned(),
            });
        }
    }
}

pub(crate) type SharedMailbox = Rc<RefCell<Mailbox>>;

/// Resolves once a delivery has been handled.
///
/// Dropping it does not withdraw the delivery.
#[must_use = "dropping the reply discards the handler's outcome, not the delivery"]
pub struct Reply<T> {
    receiver: oneshot::Receiver<Result<T, ContractError>>,
    workflow: String,
}

/// Outcome of a signal delivery: `Ok(())` once the handler has run.
pub type SignalAck = Reply<()>;

impl<T> Future for Reply<T> {
    type Output = Result<T, ContractError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // The run was dropped before handling the delivery.
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(ContractError::InstanceClosed {
                workflow: self.workflow.clone(),
            })),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> fmt::Debug for Reply<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply").field("workflow", &self.workflow).finish()
    }
}

pub(crate) struct Shared<S> {
    pub(crate) definition: Arc<WorkflowDefinition>,
    pub(crate) handlers: Rc<Handlers<S>>,
    pub(crate) state: Rc<RefCell<S>>,
    pub(crate) mailbox: SharedMailbox,
}

/// Delivery side of a running workflow instance.
///
/// Signals and updates are checked against the contract immediately and
/// queued; their payloads are validated when the loop picks them up.
/// Queries are answered on the spot from a snapshot of the state.
pub struct InstanceHandle<S> {
    shared: Rc<Shared<S>>,
}

impl<S> Clone for InstanceHandle<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<S> InstanceHandle<S> {
    pub(crate) fn new(shared: Rc<Shared<S>>) -> Self {
        Self { shared }
    }

    fn workflow(&self) -> &str {
        self.shared.definition.name()
    }

    fn enqueue(&self, delivery: Delivery) -> Result<(), ContractError> {
        let mut mailbox = self.shared.mailbox.borrow_mut();
        if mailbox.phase == Phase::Closed {
            return Err(ContractError::InstanceClosed {
                workflow: self.workflow().to_owned(),
            });
        }
        mailbox.queue.push_back(delivery);
        if let Some(waker) = mailbox.waker.take() {
            waker.wake();
        }
        Ok(())
    }

    /// Queue signal `name`.
    pub fn signal(&self, name: &str, payload: Value) -> Result<SignalAck, ContractError> {
        self.shared.definition.require(OperationKind::Signal, name)?;
        let (ack, receiver) = oneshot::channel();
        self.enqueue(Delivery::Signal {
            name: name.to_owned(),
            payload,
            ack,
        })?;
        tracing::debug!(workflow = self.workflow(), signal = name, "signal queued");
        Ok(Reply {
            receiver,
            workflow: self.workflow().to_owned(),
        })
    }

    /// Queue update `name`; the reply resolves to its validated result.
    pub fn update(&self, name: &str, payload: Value) -> Result<Reply<Value>, ContractError> {
        self.shared.definition.require(OperationKind::Update, name)?;
        let (reply, receiver) = oneshot::channel();
        self.enqueue(Delivery::Update {
            name: name.to_owned(),
            payload,
            reply,
        })?;
        tracing::debug!(workflow = self.workflow(), update = name, "update queued");
        Ok(Reply {
            receiver,
            workflow: self.workflow().to_owned(),
        })
    }

    /// Answer query `name` from the current state.
    ///
    /// Never queued and never suspends. Fails with an engine rejection if
    /// the state is being mutated at this instant.
    pub fn query(&self, name: &str, payload: Value) -> Result<Value, ContractError> {
        let descriptor = self.shared.definition.require(OperationKind::Query, name)?;
        let handler = self.shared.handlers.queries.get(name).ok_or_else(|| {
            ContractError::Configuration(format!("query '{name}' has no handler"))
        })?;

        let input = validate_now(descriptor.input(), payload)?.map_err(|issues| {
            tracing::warn!(workflow = self.workflow(), query = name, "query input rejected");
            ContractError::QueryInputValidation {
                query: name.to_owned(),
                issues,
            }
        })?;

        let output = {
            let state = self.shared.state.try_borrow().map_err(|_| {
                ContractError::Engine(EngineError::Rejected {
                    kind: OperationKind::Query,
                    name: name.to_owned(),
                    message: "workflow state is being updated".into(),
                })
            })?;
            handler(&*state, input)?
        };

        let Some(schema) = descriptor.output() else {
            return Ok(output);
        };
        validate_now(schema, output)?.map_err(|issues| {
            tracing::warn!(workflow = self.workflow(), query = name, "query output rejected");
            ContractError::QueryOutputValidation {
                query: name.to_owned(),
                issues,
            }
        })
    }

    /// Whether the instance still accepts signals and updates.
    pub fn is_open(&self) -> bool {
        self.shared.mailbox.borrow().phase != Phase::Closed
    }
}

/// How a refused delivery is reported back through the engine.
fn rejected(kind: OperationKind, name: &str, err: ContractError) -> EngineError {
    match err {
        ContractError::Engine(err) => err,
        other => EngineError::Rejected {
            kind,
            name: name.to_owned(),
            message: other.to_string(),
        },
    }
}

#[async_trait(?Send)]
impl<S: 'static> DeliverySink for InstanceHandle<S> {
    fn signal(&self, signal: &str, args: Value) -> Result<(), EngineError> {
        // The sender does not wait for the handler; the loop logs its failures.
        let _ack = InstanceHandle::signal(self, signal, args)
            .map_err(|err| rejected(OperationKind::Signal, signal, err))?;
        Ok(())
    }

    fn query(&self, query: &str, args: Value) -> Result<Value, EngineError> {
        InstanceHandle::query(self, query, args)
            .map_err(|err| rejected(OperationKind::Query, query, err))
    }

    async fn update(&self, update: &str, args: Value) -> Result<Value, EngineError> {
        let reply = InstanceHandle::update(self, update, args)
            .map_err(|err| rejected(OperationKind::Update, update, err))?;
        reply
            .await
            .map_err(|err| rejected(OperationKind::Update, update, err))
    }
}

impl<S> fmt::Debug for InstanceHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceHandle")
            .field("workflow", &self.workflow())
            .field("open", &self.is_open())
            .finish()
    }
}

async fn run_signal<S: 'static>(
    shared: Rc<Shared<S>>,
    ctx: WorkflowContext<S>,
    name: String,
    payload: Value,
) -> Result<(), ContractError> {
    let workflow = shared.definition.name();
    let descriptor = shared.definition.require(OperationKind::Signal, &name)?;
    let payload = validate(descriptor.input(), payload).await.map_err(|issues| {
        tracing::warn!(workflow, signal = %name, issues = issues.len(), "signal input rejected");
        ContractError::SignalInputValidation {
            signal: name.clone(),
            issues,
        }
    })?;
    let handler = shared.handlers.signals.get(&name).cloned().ok_or_else(|| {
        ContractError::Configuration(format!("signal '{name}' has no handler"))
    })?;
    tracing::debug!(workflow, signal = %name, "handling signal");
    handler(ctx, payload).await.inspect_err(|err| {
        tracing::warn!(workflow, signal = %name, error = %err, "signal handler failed");
    })
}

async fn run_update<S: 'static>(
    shared: Rc<Shared<S>>,
    ctx: WorkflowContext<S>,
    name: String,
    payload: Value,
) -> Result<Value, ContractError> {
    let workflow = shared.definition.name();
    let descriptor = shared.definition.require(OperationKind::Update, &name)?;
    let payload = validate(descriptor.input(), payload).await.map_err(|issues| {
        tracing::warn!(workflow, update = %name, issues = issues.len(), "update input rejected");
        ContractError::UpdateInputValidation {
            update: name.clone(),
            issues,
        }
    })?;
    let handler = shared.handlers.updates.get(&name).cloned().ok_or_else(|| {
        ContractError::Configuration(format!("update '{name}' has no handler"))
    })?;
    tracing::debug!(workflow, update = %name, "handling update");
    let output = handler(ctx, payload).await?;
    match descriptor.output() {
        Some(schema) => validate(schema, output).await.map_err(|issues| {
            tracing::warn!(workflow, update = %name, issues = issues.len(), "update output rejected");
            ContractError::UpdateOutputValidation {
                update: name.clone(),
                issues,
            }
        }),
        None => Ok(output),
    }
}

type Dispatch = Box<dyn Fn(Delivery) -> LocalBoxFuture<'static, ()>>;

pub(crate) fn dispatcher<S: 'static>(shared: Rc<Shared<S>>, ctx: WorkflowContext<S>) -> Dispatch {
    Box::new(move |delivery: Delivery| {
        let shared = Rc::clone(&shared);
        let ctx = ctx.clone();
        async move {
            match delivery {
                Delivery::Signal { name, payload, ack } => {
                    let outcome = run_signal(shared, ctx, name, payload).await;
                    let _ = ack.send(outcome);
                }
                Delivery::Update {
                    name,
                    payload,
                    reply,
                } => {
                    let outcome = run_update(shared, ctx, name, payload).await;
                    let _ = reply.send(outcome);
                }
            }
        }
        .boxed_local()
    })
}

/// One workflow instance in flight.
///
/// Resolves to the body's validated result once the body has finished and
/// every delivery queued before that has been handled.
#[must_use = "a workflow run does nothing unless polled"]
pub struct WorkflowRun {
    workflow: String,
    mailbox: SharedMailbox,
    dispatch: Dispatch,
    body: Option<LocalBoxFuture<'static, Result<Value, ContractError>>>,
    active: Option<LocalBoxFuture<'static, ()>>,
    result: Option<Result<Value, ContractError>>,
}

impl WorkflowRun {
    pub(crate) fn new(
        workflow: String,
        mailbox: SharedMailbox,
        dispatch: Dispatch,
        body: LocalBoxFuture<'static, Result<Value, ContractError>>,
    ) -> Self {
        Self {
            workflow,
            mailbox,
            dispatch,
            body: Some(body),
            active: None,
            result: None,
        }
    }

    fn finish(&mut self) -> Result<Value, ContractError> {
        self.mailbox.borrow_mut().close(&self.workflow);
        tracing::debug!(workflow = %self.workflow, "workflow instance closed");
        self.result.take().unwrap_or_else(|| {
            Err(ContractError::InstanceClosed {
                workflow: self.workflow.clone(),
            })
        })
    }
}

impl Future for WorkflowRun {
    type Output = Result<Value, ContractError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        this.mailbox.borrow_mut().waker = Some(cx.waker().clone());

        loop {
            if this.active.is_none() {
                let next = this.mailbox.borrow_mut().take_ready();
                if let Some(delivery) = next {
                    this.active = Some((this.dispatch)(delivery));
                }
            }
            if let Some(active) = this.active.as_mut()
                && active.as_mut().poll(cx).is_ready()
            {
                this.active = None;
                continue;
            }

            if let Some(body) = this.body.as_mut()
                && let Poll::Ready(result) = body.as_mut().poll(cx)
            {
                this.body = None;
                this.result = Some(result);
                let mut mailbox = this.mailbox.borrow_mut();
                match mailbox.phase {
                    // Input never validated: nothing queued may run.
                    Phase::Starting => mailbox.close(&this.workflow),
                    _ => mailbox.phase = Phase::Draining,
                }
                continue;
            }

            if this.active.is_none() && this.mailbox.borrow().has_ready() {
                continue;
            }
            if this.body.is_none() && this.active.is_none() {
                return Poll::Ready(this.finish());
            }
            return Poll::Pending;
        }
    }
}

impl Drop for WorkflowRun {
    fn drop(&mut self) {
        // An abandoned run still answers every queued delivery.
        if let Ok(mut mailbox) = self.mailbox.try_borrow_mut()
            && mailbox.phase != Phase::Closed
        {
            mailbox.close(&self.workflow);
        }
    }
}

impl fmt::Debug for WorkflowRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowRun")
            .field("workflow", &self.workflow)
            .field("body_done", &self.body.is_none())
            .field("handling", &self.active.is_some())
            .finish()
    }
}
