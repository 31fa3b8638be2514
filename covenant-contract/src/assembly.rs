//! Structural validation of a contract specification.
//!
//! Checks run once, in a fixed order, and the first violation aborts
//! assembly:
//! 1. the task queue name is not blank
//! 2. at least one workflow is declared
//! 3. every operation name is an identifier and unique in its scope
//! 4. no workflow-scoped activity collides with a global activity or with
//!    another workflow's scoped activity
//! 5. every descriptor carries schema-shaped input and, where required,
//!    output

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};

use covenant_core::{ContractError, OperationKind, SchemaRef};
use regex::Regex;

use crate::model::{Contract, ContractInner, DescriptorMap, OperationDescriptor, WorkflowDefinition};

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("identifier pattern is a valid regex")
});

/// Whether `name` is acceptable as an operation name.
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// A schema field as supplied, before it is known to be schema-shaped.
pub(crate) enum Slot {
    Schema(SchemaRef),
    Missing,
    Invalid(String),
}

pub(crate) struct RawDescriptor {
    pub(crate) input: Slot,
    pub(crate) output: Slot,
}

impl From<OperationDescriptor> for RawDescriptor {
    fn from(descriptor: OperationDescriptor) -> Self {
        Self {
            input: Slot::Schema(descriptor.input),
            output: descriptor.output.map_or(Slot::Missing, Slot::Schema),
        }
    }
}

pub(crate) struct RawWorkflow {
    pub(crate) name: String,
    pub(crate) descriptor: RawDescriptor,
    pub(crate) activities: Vec<(String, RawDescriptor)>,
    pub(crate) signals: Vec<(String, RawDescriptor)>,
    pub(crate) queries: Vec<(String, RawDescriptor)>,
    pub(crate) updates: Vec<(String, RawDescriptor)>,
}

pub(crate) struct RawContract {
    pub(crate) task_queue: String,
    pub(crate) workflows: Vec<RawWorkflow>,
    pub(crate) activities: Vec<(String, RawDescriptor)>,
}

fn fail(message: impl Into<String>) -> ContractError {
    ContractError::Assembly(message.into())
}

fn check_names<'a>(
    kind: OperationKind,
    names: impl Iterator<Item = &'a str>,
    scope: &str,
) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for name in names {
        if !is_identifier(name) {
            return Err(fail(format!(
                "{kind} name '{name}' in {scope} is not a valid identifier"
            )));
        }
        if !seen.insert(name) {
            return Err(fail(format!(
                "{kind} '{name}' is declared more than once in {scope}"
            )));
        }
    }
    Ok(())
}

fn keys(entries: &[(String, RawDescriptor)]) -> impl Iterator<Item = &str> {
    entries.iter().map(|(name, _)| name.as_str())
}

/// How a descriptor's output slot must look.
#[derive(Clone, Copy, PartialEq)]
enum OutputRule {
    Required,
    Absent,
}

fn take_schema(slot: Slot, what: &str) -> Result<Option<SchemaRef>, ContractError> {
    match slot {
        Slot::Schema(schema) => Ok(Some(schema)),
        Slot::Missing => Ok(None),
        Slot::Invalid(reason) => Err(fail(format!("{what} is not a schema: {reason}"))),
    }
}

fn shape(
    kind: OperationKind,
    name: &str,
    raw: RawDescriptor,
    rule: OutputRule,
) -> Result<(SchemaRef, Option<SchemaRef>), ContractError> {
    let input = take_schema(raw.input, &format!("{kind} '{name}' input"))?
        .ok_or_else(|| fail(format!("{kind} '{name}' has no input schema")))?;
    let output = take_schema(raw.output, &format!("{kind} '{name}' output"))?;
    match (rule, &output) {
        (OutputRule::Required, None) => {
            Err(fail(format!("{kind} '{name}' has no output schema")))
        }
        (OutputRule::Absent, Some(_)) => Err(fail(format!(
            "{kind} '{name}' declares an output schema, but {kind}s return nothing"
        ))),
        _ => Ok((input, output)),
    }
}

fn shape_all(
    kind: OperationKind,
    entries: Vec<(String, RawDescriptor)>,
    rule: OutputRule,
) -> Result<DescriptorMap, ContractError> {
    entries
        .into_iter()
        .map(|(name, raw)| {
            let (input, output) = shape(kind, &name, raw, rule)?;
            Ok((
                name,
                Arc::new(OperationDescriptor::from_parts(input, output)),
            ))
        })
        .collect()
}

/// Validate a raw specification and freeze it into a [`Contract`].
pub(crate) fn assemble(raw: RawContract) -> Result<Contract, ContractError> {
    if raw.task_queue.trim().is_empty() {
        return Err(fail("task queue name must not be blank"));
    }
    if raw.workflows.is_empty() {
        return Err(fail("contract must declare at least one workflow"));
    }

    check_names(
        OperationKind::Workflow,
        raw.workflows.iter().map(|w| w.name.as_str()),
        "the contract",
    )?;
    check_names(OperationKind::Activity, keys(&raw.activities), "the contract")?;
    for workflow in &raw.workflows {
        let scope = format!("workflow '{}'", workflow.name);
        check_names(OperationKind::Activity, keys(&workflow.activities), &scope)?;
        check_names(OperationKind::Signal, keys(&workflow.signals), &scope)?;
        check_names(OperationKind::Query, keys(&workflow.queries), &scope)?;
        check_names(OperationKind::Update, keys(&workflow.updates), &scope)?;
    }

    let globals: HashSet<&str> = keys(&raw.activities).collect();
    let mut scoped_owner: HashMap<&str, &str> = HashMap::new();
    for workflow in &raw.workflows {
        for activity in keys(&workflow.activities) {
            if globals.contains(activity) {
                return Err(fail(format!(
                    "workflow '{}' declares activity '{activity}', which is already a global activity",
                    workflow.name
                )));
            }
            if let Some(owner) = scoped_owner.insert(activity, &workflow.name) {
                return Err(fail(format!(
                    "activity '{activity}' is declared by both workflow '{owner}' and workflow '{}'",
                    workflow.name
                )));
            }
        }
    }

    let activities = shape_all(OperationKind::Activity, raw.activities, OutputRule::Required)?;
    let mut workflows = HashMap::with_capacity(raw.workflows.len());
    for workflow in raw.workflows {
        let (input, output) = shape(
            OperationKind::Workflow,
            &workflow.name,
            workflow.descriptor,
            OutputRule::Required,
        )?;
        let Some(output) = output else {
            return Err(fail(format!(
                "workflow '{}' has no output schema",
                workflow.name
            )));
        };
        let definition = WorkflowDefinition {
            input,
            output,
            activities: shape_all(
                OperationKind::Activity,
                workflow.activities,
                OutputRule::Required,
            )?,
            signals: shape_all(OperationKind::Signal, workflow.signals, OutputRule::Absent)?,
            queries: shape_all(OperationKind::Query, workflow.queries, OutputRule::Required)?,
            updates: shape_all(OperationKind::Update, workflow.updates, OutputRule::Required)?,
            name: workflow.name,
        };
        workflows.insert(definition.name.clone(), Arc::new(definition));
    }

    tracing::debug!(
        task_queue = %raw.task_queue,
        workflows = workflows.len(),
        activities = activities.len(),
        "contract assembled"
    );

    Ok(Contract {
        inner: Arc::new(ContractInner {
            task_queue: raw.task_queue,
            workflows,
            activities,
        }),
    })
}
