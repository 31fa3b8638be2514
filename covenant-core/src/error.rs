//! Error taxonomy shared by every covenant crate.
//!
//! Construction-time faults ([`ContractError::Assembly`],
//! [`ContractError::Configuration`]) are fatal. Per-call validation errors
//! name the operation and carry every [`Issue`]. Business failures from
//! activities travel only as [`ActivityError`]; technical failures reported
//! by the engine travel as [`EngineError`]. The child-workflow path folds
//! every failure into [`ChildWorkflowError`].

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::schema::{Issue, describe_issues};

/// The kinds of named operation a contract declares.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// A workflow.
    Workflow,
    /// An activity.
    Activity,
    /// A signal.
    Signal,
    /// A query.
    Query,
    /// An update.
    Update,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationKind::Workflow => "workflow",
            OperationKind::Activity => "activity",
            OperationKind::Signal => "signal",
            OperationKind::Query => "query",
            OperationKind::Update => "update",
        })
    }
}

/// Failures reported by the durable-execution engine itself.
///
/// This layer never produces these on its own; it passes them through.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// No execution with this id.
    #[error("workflow execution not found: {0}")]
    NotFound(String),

    /// An execution with this id is already running.
    #[error("workflow execution already started: {0}")]
    AlreadyStarted(String),

    /// An activity failed with a non-business (technical) error.
    #[error("activity '{activity}' failed: {message}")]
    ActivityFailed {
        /// Activity name.
        activity: String,
        /// Failure description.
        message: String,
    },

    /// The workflow execution failed.
    #[error("workflow failed: {0}")]
    WorkflowFailed(String),

    /// The workflow execution was cancelled.
    #[error("workflow cancelled")]
    Cancelled,

    /// The workflow execution was terminated.
    #[error("workflow terminated: {0}")]
    Terminated(String),

    /// The engine rejected a signal, query or update.
    #[error("{kind} '{name}' rejected: {message}")]
    Rejected {
        /// Operation kind.
        kind: OperationKind,
        /// Operation name.
        name: String,
        /// Rejection reason.
        message: String,
    },

    /// Connection or protocol failure talking to the engine.
    #[error("transport error: {0}")]
    Transport(String),

    /// Catch-all.
    #[error("{0}")]
    Other(String),
}

/// A business or technical failure raised by an activity implementation.
///
/// `code` is what retry policies key on (see
/// `RetryPolicy::non_retryable_error_codes`).
#[derive(Debug, Clone, Error)]
#[error("activity error [{code}]: {message}")]
pub struct ActivityError {
    /// Machine-readable failure code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Structured failure details carried across the process boundary.
    pub details: Option<serde_json::Value>,
    /// Local cause, if any. Not carried across the process boundary.
    #[source]
    pub cause: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl ActivityError {
    /// Create an activity error with a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            cause: None,
        }
    }

    /// Attach structured details.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Attach the underlying cause.
    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }
}

/// A child workflow name that the target contract does not define.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("child workflow '{workflow}' is not defined (available: {})", .available.join(", "))]
pub struct ChildWorkflowNotFoundError {
    /// The requested name.
    pub workflow: String,
    /// Every workflow name the target contract defines, sorted.
    pub available: Vec<String>,
}

/// Why a child-workflow call failed.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum ChildFailure {
    /// The target contract has no such workflow. The engine was not called.
    NotFound(ChildWorkflowNotFoundError),
    /// The argument failed the target's input schema. The engine was not called.
    InvalidInput(Vec<Issue>),
    /// The child's result failed the target's output schema.
    InvalidOutput(Vec<Issue>),
    /// The engine failed to start or run the child.
    Execution(EngineError),
}

/// The single error surface of child-workflow orchestration.
#[derive(Debug, Clone)]
pub struct ChildWorkflowError {
    /// Target workflow name.
    pub workflow: String,
    /// What went wrong.
    pub failure: ChildFailure,
}

impl ChildWorkflowError {
    /// Create a child workflow error.
    pub fn new(workflow: impl Into<String>, failure: ChildFailure) -> Self {
        Self {
            workflow: workflow.into(),
            failure,
        }
    }

    /// Whether the target workflow was undefined.
    pub fn is_not_found(&self) -> bool {
        matches!(self.failure, ChildFailure::NotFound(_))
    }

    /// Validation issues, for input/output failures.
    pub fn issues(&self) -> &[Issue] {
        match &self.failure {
            ChildFailure::InvalidInput(issues) | ChildFailure::InvalidOutput(issues) => issues,
            _ => &[],
        }
    }

    /// The engine failure, for execution failures.
    pub fn engine_error(&self) -> Option<&EngineError> {
        match &self.failure {
            ChildFailure::Execution(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for ChildWorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.failure {
            ChildFailure::NotFound(err) => write!(f, "{err}"),
            ChildFailure::InvalidInput(issues) => write!(
                f,
                "child workflow '{}' input is invalid: {}",
                self.workflow,
                describe_issues(issues)
            ),
            ChildFailure::InvalidOutput(issues) => write!(
                f,
                "child workflow '{}' output is invalid: {}",
                self.workflow,
                describe_issues(issues)
            ),
            ChildFailure::Execution(err) => {
                write!(f, "child workflow '{}' failed: {err}", self.workflow)
            }
        }
    }
}

impl std::error::Error for ChildWorkflowError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.failure {
            ChildFailure::NotFound(err) => Some(err),
            ChildFailure::Execution(err) => Some(err),
            _ => None,
        }
    }
}

/// Every error this layer raises.
#[non_exhaustive]
#[derive(Debug, Clone, Error)]
pub enum ContractError {
    /// The contract declaration violates a structural rule.
    #[error("contract assembly failed: {0}")]
    Assembly(String),

    /// A workflow implementation or handler map is misconfigured.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The named workflow is not part of the contract.
    #[error("workflow '{workflow}' is not defined (available: {})", .available.join(", "))]
    WorkflowNotFound {
        /// Requested name.
        workflow: String,
        /// Defined names, sorted.
        available: Vec<String>,
    },

    /// Workflow argument failed its input schema.
    #[error("workflow '{workflow}' input is invalid: {}", describe_issues(.issues))]
    WorkflowInputValidation {
        /// Workflow name.
        workflow: String,
        /// Issues found.
        issues: Vec<Issue>,
    },

    /// Workflow result failed its output schema.
    #[error("workflow '{workflow}' output is invalid: {}", describe_issues(.issues))]
    WorkflowOutputValidation {
        /// Workflow name.
        workflow: String,
        /// Issues found.
        issues: Vec<Issue>,
    },

    /// The activity is not reachable from the calling scope.
    #[error("activity '{activity}' is not defined (available: {})", .available.join(", "))]
    ActivityDefinitionNotFound {
        /// Requested name.
        activity: String,
        /// Reachable names, sorted.
        available: Vec<String>,
    },

    /// Activity argument failed its input schema.
    #[error("activity '{activity}' input is invalid: {}", describe_issues(.issues))]
    ActivityInputValidation {
        /// Activity name.
        activity: String,
        /// Issues found.
        issues: Vec<Issue>,
    },

    /// Activity result failed its output schema.
    #[error("activity '{activity}' output is invalid: {}", describe_issues(.issues))]
    ActivityOutputValidation {
        /// Activity name.
        activity: String,
        /// Issues found.
        issues: Vec<Issue>,
    },

    /// The activity reported a failure.
    #[error(transparent)]
    Activity(#[from] ActivityError),

    /// Signal payload failed its input schema.
    #[error("signal '{signal}' input is invalid: {}", describe_issues(.issues))]
    SignalInputValidation {
        /// Signal name.
        signal: String,
        /// Issues found.
        issues: Vec<Issue>,
    },

    /// Query argument failed its input schema.
    #[error("query '{query}' input is invalid: {}", describe_issues(.issues))]
    QueryInputValidation {
        /// Query name.
        query: String,
        /// Issues found.
        issues: Vec<Issue>,
    },

    /// Query result failed its output schema.
    #[error("query '{query}' output is invalid: {}", describe_issues(.issues))]
    QueryOutputValidation {
        /// Query name.
        query: String,
        /// Issues found.
        issues: Vec<Issue>,
    },

    /// Update argument failed its input schema.
    #[error("update '{update}' input is invalid: {}", describe_issues(.issues))]
    UpdateInputValidation {
        /// Update name.
        update: String,
        /// Issues found.
        issues: Vec<Issue>,
    },

    /// Update result failed its output schema.
    #[error("update '{update}' output is invalid: {}", describe_issues(.issues))]
    UpdateOutputValidation {
        /// Update name.
        update: String,
        /// Issues found.
        issues: Vec<Issue>,
    },

    /// A child-workflow call failed.
    #[error(transparent)]
    ChildWorkflow(#[from] ChildWorkflowError),

    /// The workflow does not declare a signal, query or update with this name.
    #[error("{kind} '{name}' is not declared by workflow '{workflow}' (available: {})", .available.join(", "))]
    UnknownOperation {
        /// Operation kind.
        kind: OperationKind,
        /// Requested name.
        name: String,
        /// Workflow name.
        workflow: String,
        /// Declared names of that kind, sorted.
        available: Vec<String>,
    },

    /// The workflow instance has finished and accepts no more deliveries.
    #[error("workflow '{workflow}' instance is closed")]
    InstanceClosed {
        /// Workflow name.
        workflow: String,
    },

    /// The engine reported a failure.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

impl ContractError {
    /// Validation issues carried by this error, if it is a validation error.
    pub fn issues(&self) -> Option<&[Issue]> {
        match self {
            ContractError::WorkflowInputValidation { issues, .. }
            | ContractError::WorkflowOutputValidation { issues, .. }
            | ContractError::ActivityInputValidation { issues, .. }
            | ContractError::ActivityOutputValidation { issues, .. }
            | ContractError::SignalInputValidation { issues, .. }
            | ContractError::QueryInputValidation { issues, .. }
            | ContractError::QueryOutputValidation { issues, .. }
            | ContractError::UpdateInputValidation { issues, .. }
            | ContractError::UpdateOutputValidation { issues, .. } => Some(issues),
            ContractError::ChildWorkflow(err) => match &err.failure {
                ChildFailure::InvalidInput(issues) | ChildFailure::InvalidOutput(issues) => {
                    Some(issues)
                }
                _ => None,
            },
            _ => None,
        }
    }

    /// Whether this error came from the validation boundary.
    pub fn is_validation(&self) -> bool {
        self.issues().is_some()
    }
}
