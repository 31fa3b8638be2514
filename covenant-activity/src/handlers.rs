//! Worker-side activity handler map.
//!
//! The engine's worker registers one callable per activity name. Each
//! callable built here validates its argument, runs the implementation and
//! validates the result before anything travels back to the workflow.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use covenant_contract::{Contract, OperationDescriptor};
use covenant_core::{
    ActivityError, ActivityExecutor, ActivityFailure, ActivityOutcome, ContractError, EngineError,
    Issue, validate,
};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::{Value, json};

/// Failure code for an activity argument rejected by the worker.
pub const INPUT_VALIDATION_CODE: &str = "ActivityInputValidationError";
/// Failure code for an activity result rejected by the worker.
pub const OUTPUT_VALIDATION_CODE: &str = "ActivityOutputValidationError";

/// A type-erased activity implementation.
pub type ActivityFn =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, ActivityError>> + Send + Sync>;

/// Encode a worker-side validation error as a business failure, so the
/// workflow side can rebuild the original error kind.
///
/// Retrying is up to the engine's policy. List [`INPUT_VALIDATION_CODE`] and
/// [`OUTPUT_VALIDATION_CODE`] in `RetryPolicy::non_retryable_error_codes` to
/// stop it from retrying a call that cannot succeed.
pub(crate) fn validation_failure(code: &str, message: String, issues: &[Issue]) -> ActivityFailure {
    ActivityFailure {
        code: code.to_owned(),
        message,
        details: Some(json!({ "issues": issues })),
    }
}

/// Rebuild a worker-side validation error from its failure encoding.
pub(crate) fn decode_validation_failure(
    activity: &str,
    failure: &ActivityFailure,
) -> Option<ContractError> {
    let issues = failure
        .details
        .as_ref()
        .and_then(|details| details.get("issues"))
        .and_then(|issues| serde_json::from_value::<Vec<Issue>>(issues.clone()).ok())?;
    let activity = activity.to_owned();
    match failure.code.as_str() {
        INPUT_VALIDATION_CODE => Some(ContractError::ActivityInputValidation { activity, issues }),
        OUTPUT_VALIDATION_CODE => Some(ContractError::ActivityOutputValidation { activity, issues }),
        _ => None,
    }
}

struct WrappedActivity {
    descriptor: Arc<OperationDescriptor>,
    implementation: ActivityFn,
}

/// Name-keyed map of validated activity callables, ready for a worker.
///
/// ```
/// use covenant_activity::ActivityHandlers;
/// use covenant_contract::{Contract, JsonSchema, OperationDescriptor, WorkflowSpec};
///
/// # fn main() -> Result<(), covenant_core::ContractError> {
/// let contract = Contract::builder("greetings")
///     .activity("greet", OperationDescriptor::new(JsonSchema::any(), JsonSchema::any()))
///     .workflow("hello", WorkflowSpec::new(JsonSchema::any(), JsonSchema::any()))
///     .build()?;
///
/// let handlers = ActivityHandlers::builder(&contract)
///     .handler("greet", |name| async move { Ok(format!("hello {name}").into()) })
///     .build()?;
/// assert_eq!(handlers.names(), vec!["greet"]);
/// # Ok(())
/// # }
/// ```
pub struct ActivityHandlers {
    activities: HashMap<String, WrappedActivity>,
}

impl ActivityHandlers {
    /// Handlers for every activity the contract declares.
    pub fn builder(contract: &Contract) -> ActivityHandlersBuilder {
        ActivityHandlersBuilder {
            declared: Ok(contract.all_activities()),
            implementations: Vec::new(),
        }
    }

    /// Handlers for the activities reachable from one workflow only.
    pub fn for_workflow(contract: &Contract, workflow: &str) -> ActivityHandlersBuilder {
        ActivityHandlersBuilder {
            declared: contract.workflow_activities(workflow),
            implementations: Vec::new(),
        }
    }

    /// Registered activity names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.activities.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run one activity through the validation boundary.
    pub async fn invoke(&self, name: &str, input: Value) -> Result<Value, ContractError> {
        let activity = self.activities.get(name).ok_or_else(|| {
            ContractError::ActivityDefinitionNotFound {
                activity: name.to_owned(),
                available: self.names(),
            }
        })?;

        let input = validate(activity.descriptor.input(), input)
            .await
            .map_err(|issues| {
                tracing::warn!(activity = name, issues = issues.len(), "activity input rejected by worker");
                ContractError::ActivityInputValidation {
                    activity: name.to_owned(),
                    issues,
                }
            })?;

        tracing::debug!(activity = name, "running activity");
        let output = (activity.implementation)(input).await?;

        match activity.descriptor.output() {
            Some(schema) => validate(schema, output).await.map_err(|issues| {
                tracing::warn!(activity = name, issues = issues.len(), "activity output rejected by worker");
                ContractError::ActivityOutputValidation {
                    activity: name.to_owned(),
                    issues,
                }
            }),
            None => Ok(output),
        }
    }
}

impl fmt::Debug for ActivityHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityHandlers")
            .field("activities", &self.names())
            .finish()
    }
}

#[async_trait]
impl ActivityExecutor for ActivityHandlers {
    async fn execute(&self, activity: &str, input: Value) -> Result<ActivityOutcome, EngineError> {
        match self.invoke(activity, input).await {
            Ok(value) => Ok(ActivityOutcome::Completed(value)),
            Err(ContractError::Activity(err)) => Ok(ActivityOutcome::Failed(err.into())),
            Err(err @ ContractError::ActivityInputValidation { .. }) => {
                let failure = validation_failure(
                    INPUT_VALIDATION_CODE,
                    err.to_string(),
                    err.issues().unwrap_or_default(),
                );
                Ok(ActivityOutcome::Failed(failure))
            }
            Err(err @ ContractError::ActivityOutputValidation { .. }) => {
                let failure = validation_failure(
                    OUTPUT_VALIDATION_CODE,
                    err.to_string(),
                    err.issues().unwrap_or_default(),
                );
                Ok(ActivityOutcome::Failed(failure))
            }
            Err(err) => Err(EngineError::ActivityFailed {
                activity: activity.to_owned(),
                message: err.to_string(),
            }),
        }
    }
}

/// Collects implementations and checks them against the contract.
pub struct ActivityHandlersBuilder {
    declared: Result<BTreeMap<String, Arc<OperationDescriptor>>, ContractError>,
    implementations: Vec<(String, ActivityFn)>,
}

impl ActivityHandlersBuilder {
    /// Register the implementation of `name`.
    pub fn handler<F, Fut>(mut self, name: impl Into<String>, implementation: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ActivityError>> + Send + 'static,
    {
        let implementation: ActivityFn = Arc::new(move |input: Value| implementation(input).boxed());
        self.implementations.push((name.into(), implementation));
        self
    }

    /// Register an already type-erased implementation.
    pub fn handler_fn(mut self, name: impl Into<String>, implementation: ActivityFn) -> Self {
        self.implementations.push((name.into(), implementation));
        self
    }

    /// Fail unless every declared activity has exactly one implementation
    /// and no implementation is undeclared.
    pub fn build(self) -> Result<ActivityHandlers, ContractError> {
        let declared = self.declared?;
        let mut activities = HashMap::with_capacity(declared.len());
        for (name, implementation) in self.implementations {
            let Some(descriptor) = declared.get(&name) else {
                return Err(ContractError::Configuration(format!(
                    "implementation provided for undeclared activity '{name}'"
                )));
            };
            let wrapped = WrappedActivity {
                descriptor: Arc::clone(descriptor),
                implementation,
            };
            if activities.insert(name.clone(), wrapped).is_some() {
                return Err(ContractError::Configuration(format!(
                    "activity '{name}' has more than one implementation"
                )));
            }
        }

        let missing: Vec<&str> = declared
            .keys()
            .filter(|name| !activities.contains_key(*name))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(ContractError::Configuration(format!(
                "missing activity implementations: {}",
                missing.join(", ")
            )));
        }

        tracing::debug!(activities = activities.len(), "activity handlers built");
        Ok(ActivityHandlers { activities })
    }
}
