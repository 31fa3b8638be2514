//! RecordingClient — scripted engine client that records every call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::engine::{
    EngineClient, EngineWorkflowHandle, StartWorkflow, WorkflowDescription, WorkflowStatus,
};
use crate::error::EngineError;
use crate::id::{RunId, WorkflowId};

/// A call observed by [`RecordingClient`].
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCall {
    /// `EngineClient::start`.
    Start {
        /// Workflow name.
        workflow_type: String,
        /// Queue.
        task_queue: String,
        /// Execution id.
        workflow_id: WorkflowId,
        /// Argument as sent.
        args: serde_json::Value,
    },
    /// `EngineClient::get_handle`.
    GetHandle(WorkflowId),
    /// `EngineWorkflowHandle::result`.
    Result(WorkflowId),
    /// `EngineWorkflowHandle::signal`.
    Signal {
        /// Execution id.
        workflow_id: WorkflowId,
        /// Signal name.
        name: String,
        /// Payload as sent.
        args: serde_json::Value,
    },
    /// `EngineWorkflowHandle::query`.
    Query {
        /// Execution id.
        workflow_id: WorkflowId,
        /// Query name.
        name: String,
        /// Argument as sent.
        args: serde_json::Value,
    },
    /// `EngineWorkflowHandle::execute_update`.
    Update {
        /// Execution id.
        workflow_id: WorkflowId,
        /// Update name.
        name: String,
        /// Argument as sent.
        args: serde_json::Value,
    },
    /// `EngineWorkflowHandle::terminate`.
    Terminate {
        /// Execution id.
        workflow_id: WorkflowId,
        /// Reason given.
        reason: Option<String>,
    },
    /// `EngineWorkflowHandle::cancel`.
    Cancel(WorkflowId),
    /// `EngineWorkflowHandle::describe`.
    Describe(WorkflowId),
}

#[derive(Default)]
struct Script {
    calls: Vec<ClientCall>,
    results: HashMap<String, Result<serde_json::Value, EngineError>>,
    queries: HashMap<String, serde_json::Value>,
    updates: HashMap<String, serde_json::Value>,
    executions: HashMap<WorkflowId, Execution>,
}

struct Execution {
    workflow_type: String,
    task_queue: String,
    status: WorkflowStatus,
}

/// Scripted [`EngineClient`] for tests.
///
/// Results are scripted per workflow type, query and update responses per
/// operation name. Every call is recorded so tests can assert that rejected
/// calls never reached the engine.
#[derive(Clone, Default)]
pub struct RecordingClient {
    script: Arc<Mutex<Script>>,
}

impl RecordingClient {
    /// Create a client with nothing scripted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the result of every execution of `workflow_type`.
    pub fn with_result(self, workflow_type: impl Into<String>, value: serde_json::Value) -> Self {
        self.lock().results.insert(workflow_type.into(), Ok(value));
        self
    }

    /// Script a failure for every execution of `workflow_type`.
    pub fn with_failure(self, workflow_type: impl Into<String>, err: EngineError) -> Self {
        self.lock().results.insert(workflow_type.into(), Err(err));
        self
    }

    /// Script the response of a query.
    pub fn with_query_response(self, query: impl Into<String>, value: serde_json::Value) -> Self {
        self.lock().queries.insert(query.into(), value);
        self
    }

    /// Script the response of an update.
    pub fn with_update_response(self, update: impl Into<String>, value: serde_json::Value) -> Self {
        self.lock().updates.insert(update.into(), value);
        self
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<ClientCall> {
        self.lock().calls.clone()
    }

    /// Number of calls that reached the engine.
    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn handle(&self, workflow_id: WorkflowId) -> Box<dyn EngineWorkflowHandle> {
        Box::new(RecordingHandle {
            workflow_id,
            client: self.clone(),
        })
    }
}

#[async_trait]
impl EngineClient for RecordingClient {
    async fn start(
        &self,
        request: StartWorkflow,
    ) -> Result<Box<dyn EngineWorkflowHandle>, EngineError> {
        let workflow_id = request.options.workflow_id.clone();
        {
            let mut script = self.lock();
            script.calls.push(ClientCall::Start {
                workflow_type: request.workflow_type.clone(),
                task_queue: request.task_queue.clone(),
                workflow_id: workflow_id.clone(),
                args: request.args,
            });
            if script.executions.contains_key(&workflow_id) {
                return Err(EngineError::AlreadyStarted(workflow_id.to_string()));
            }
            script.executions.insert(
                workflow_id.clone(),
                Execution {
                    workflow_type: request.workflow_type,
                    task_queue: request.task_queue,
                    status: WorkflowStatus::Running,
                },
            );
        }
        Ok(self.handle(workflow_id))
    }

    async fn get_handle(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<Box<dyn EngineWorkflowHandle>, EngineError> {
        self.lock()
            .calls
            .push(ClientCall::GetHandle(workflow_id.clone()));
        Ok(self.handle(workflow_id.clone()))
    }
}

struct RecordingHandle {
    workflow_id: WorkflowId,
    client: RecordingClient,
}

impl RecordingHandle {
    fn set_status(&self, status: WorkflowStatus) -> Result<(), EngineError> {
        let mut script = self.client.lock();
        let execution = script
            .executions
            .get_mut(&self.workflow_id)
            .ok_or_else(|| EngineError::NotFound(self.workflow_id.to_string()))?;
        execution.status = status;
        Ok(())
    }
}

#[async_trait]
impl EngineWorkflowHandle for RecordingHandle {
    fn workflow_id(&self) -> &WorkflowId {
        &self.workflow_id
    }

    async fn result(&self) -> Result<serde_json::Value, EngineError> {
        let mut script = self.client.lock();
        script.calls.push(ClientCall::Result(self.workflow_id.clone()));
        let workflow_type = script
            .executions
            .get(&self.workflow_id)
            .map(|e| e.workflow_type.clone())
            .ok_or_else(|| EngineError::NotFound(self.workflow_id.to_string()))?;
        let result = script.results.get(&workflow_type).cloned().unwrap_or_else(|| {
            Err(EngineError::Other(format!(
                "no result scripted for '{workflow_type}'"
            )))
        });
        if let Some(execution) = script.executions.get_mut(&self.workflow_id) {
            execution.status = match &result {
                Ok(_) => WorkflowStatus::Completed,
                Err(_) => WorkflowStatus::Failed,
            };
        }
        result
    }

    async fn signal(&self, signal: &str, args: serde_json::Value) -> Result<(), EngineError> {
        self.client.lock().calls.push(ClientCall::Signal {
            workflow_id: self.workflow_id.clone(),
            name: signal.to_owned(),
            args,
        });
        Ok(())
    }

    async fn query(
        &self,
        query: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, EngineError> {
        let mut script = self.client.lock();
        script.calls.push(ClientCall::Query {
            workflow_id: self.workflow_id.clone(),
            name: query.to_owned(),
            args,
        });
        Ok(script
            .queries
            .get(query)
            .cloned()
            .unwrap_or(serde_json::Value::Null))
    }

    async fn execute_update(
        &self,
        update: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, EngineError> {
        let mut script = self.client.lock();
        script.calls.push(ClientCall::Update {
            workflow_id: self.workflow_id.clone(),
            name: update.to_owned(),
            args,
        });
        Ok(script
            .updates
            .get(update)
            .cloned()
            .unwrap_or(serde_json::Value::Null))
    }

    async fn terminate(&self, reason: Option<String>) -> Result<(), EngineError> {
        self.client.lock().calls.push(ClientCall::Terminate {
            workflow_id: self.workflow_id.clone(),
            reason,
        });
        self.set_status(WorkflowStatus::Terminated)
    }

    async fn cancel(&self) -> Result<(), EngineError> {
        self.client
            .lock()
            .calls
            .push(ClientCall::Cancel(self.workflow_id.clone()));
        self.set_status(WorkflowStatus::Cancelled)
    }

    async fn describe(&self) -> Result<WorkflowDescription, EngineError> {
        let mut script = self.client.lock();
        script
            .calls
            .push(ClientCall::Describe(self.workflow_id.clone()));
        let execution = script
            .executions
            .get(&self.workflow_id)
            .ok_or_else(|| EngineError::NotFound(self.workflow_id.to_string()))?;
        Ok(WorkflowDescription {
            workflow_id: self.workflow_id.clone(),
            run_id: Some(RunId::new("run-1")),
            workflow_type: execution.workflow_type.clone(),
            task_queue: execution.task_queue.clone(),
            status: execution.status,
        })
    }
}
