//! Workflow-side activity proxy.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use covenant_contract::{Contract, OperationDescriptor};
use covenant_core::{
    ActivityOptions, ActivityOutcome, ContractError, Issue, WorkflowRuntime, validate,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::handlers::decode_validation_failure;

/// Validated access to the activities one workflow may call.
///
/// Built per workflow instance. Every call checks the name, validates the
/// argument before the engine sees it, unwraps business failures into
/// [`covenant_core::ActivityError`] and validates the result.
pub struct ActivityProxy {
    workflow: String,
    activities: BTreeMap<String, Arc<OperationDescriptor>>,
    runtime: Rc<dyn WorkflowRuntime>,
    defaults: ActivityOptions,
    overrides: HashMap<String, ActivityOptions>,
}

impl ActivityProxy {
    /// Proxy for the activities reachable from `workflow`.
    pub fn new(
        contract: &Contract,
        workflow: &str,
        runtime: Rc<dyn WorkflowRuntime>,
    ) -> Result<Self, ContractError> {
        Ok(Self {
            workflow: workflow.to_owned(),
            activities: contract.workflow_activities(workflow)?,
            runtime,
            defaults: ActivityOptions::default(),
            overrides: HashMap::new(),
        })
    }

    /// Options sent with every call unless overridden per activity.
    pub fn with_options(mut self, options: ActivityOptions) -> Self {
        self.defaults = options;
        self
    }

    /// Options sent with calls to `activity` only.
    pub fn with_activity_options(mut self, activity: impl Into<String>, options: ActivityOptions) -> Self {
        self.overrides.insert(activity.into(), options);
        self
    }

    /// Options a call to `activity` is sent with.
    pub fn options_for(&self, activity: &str) -> &ActivityOptions {
        self.overrides.get(activity).unwrap_or(&self.defaults)
    }

    /// Reachable activity names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.activities.keys().cloned().collect()
    }

    /// Call `activity` with the proxy's options.
    pub async fn call(&self, activity: &str, input: Value) -> Result<Value, ContractError> {
        let options = self.options_for(activity).clone();
        self.call_with(activity, input, &options).await
    }

    /// Call `activity` with explicit options.
    pub async fn call_with(
        &self,
        activity: &str,
        input: Value,
        options: &ActivityOptions,
    ) -> Result<Value, ContractError> {
        let descriptor = self.activities.get(activity).ok_or_else(|| {
            ContractError::ActivityDefinitionNotFound {
                activity: activity.to_owned(),
                available: self.names(),
            }
        })?;

        let input = validate(descriptor.input(), input).await.map_err(|issues| {
            tracing::warn!(
                workflow = %self.workflow,
                activity,
                issues = issues.len(),
                "activity input rejected before scheduling"
            );
            ContractError::ActivityInputValidation {
                activity: activity.to_owned(),
                issues,
            }
        })?;

        tracing::debug!(workflow = %self.workflow, activity, "scheduling activity");
        let output = match self.runtime.execute_activity(activity, input, options).await? {
            ActivityOutcome::Completed(value) => value,
            ActivityOutcome::Failed(failure) => {
                if let Some(err) = decode_validation_failure(activity, &failure) {
                    return Err(err);
                }
                return Err(ContractError::Activity(failure.into()));
            }
        };

        match descriptor.output() {
            Some(schema) => validate(schema, output).await.map_err(|issues| {
                tracing::warn!(
                    workflow = %self.workflow,
                    activity,
                    issues = issues.len(),
                    "activity output rejected"
                );
                ContractError::ActivityOutputValidation {
                    activity: activity.to_owned(),
                    issues,
                }
            }),
            None => Ok(output),
        }
    }

    /// Call `activity` with a serializable argument and decode the result.
    pub async fn call_as<I, O>(&self, activity: &str, input: &I) -> Result<O, ContractError>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let input = serde_json::to_value(input).map_err(|e| ContractError::ActivityInputValidation {
            activity: activity.to_owned(),
            issues: vec![Issue::new(e.to_string())],
        })?;
        let output = self.call(activity, input).await?;
        serde_json::from_value(output).map_err(|e| ContractError::ActivityOutputValidation {
            activity: activity.to_owned(),
            issues: vec![Issue::new(e.to_string())],
        })
    }
}

impl fmt::Debug for ActivityProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityProxy")
            .field("workflow", &self.workflow)
            .field("activities", &self.names())
            .finish()
    }
}
