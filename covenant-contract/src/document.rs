//! Declarative contracts loaded from JSON.
//!
//! ```json
//! {
//!   "taskQueue": "orders",
//!   "activities": {
//!     "chargeCard": { "input": {"type": "object"}, "output": {"type": "object"} }
//!   },
//!   "workflows": {
//!     "processOrder": {
//!       "input": {"type": "object", "required": ["orderId"]},
//!       "output": {"type": "object"},
//!       "signals": { "cancel": { "input": {} } },
//!       "queries": { "status": { "input": {}, "output": {"type": "string"} } }
//!     }
//!   }
//! }
//! ```
//!
//! Every schema field must be a JSON Schema object; anything else fails
//! assembly.

use std::collections::BTreeMap;
use std::sync::Arc;

use covenant_core::{ContractError, SchemaRef};
use serde::Deserialize;
use serde_json::Value;

use crate::assembly::{RawContract, RawDescriptor, RawWorkflow, Slot, assemble};
use crate::json_schema::JsonSchema;
use crate::model::Contract;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct DescriptorDocument {
    #[serde(default)]
    input: Option<Value>,
    #[serde(default)]
    output: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct WorkflowDocument {
    #[serde(default)]
    input: Option<Value>,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    activities: BTreeMap<String, DescriptorDocument>,
    #[serde(default)]
    signals: BTreeMap<String, DescriptorDocument>,
    #[serde(default)]
    queries: BTreeMap<String, DescriptorDocument>,
    #[serde(default)]
    updates: BTreeMap<String, DescriptorDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ContractDocument {
    task_queue: String,
    #[serde(default)]
    workflows: BTreeMap<String, WorkflowDocument>,
    #[serde(default)]
    activities: BTreeMap<String, DescriptorDocument>,
}

fn slot(value: Option<Value>) -> Slot {
    match value {
        None => Slot::Missing,
        Some(document @ (Value::Object(_) | Value::Bool(_))) => match JsonSchema::compile(document) {
            Ok(schema) => Slot::Schema(Arc::new(schema) as SchemaRef),
            Err(err) => Slot::Invalid(err.to_string()),
        },
        Some(other) => Slot::Invalid(format!(
            "expected a schema object, found {}",
            kind_of(&other)
        )),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn descriptor(document: DescriptorDocument) -> RawDescriptor {
    RawDescriptor {
        input: slot(document.input),
        output: slot(document.output),
    }
}

fn descriptors(documents: BTreeMap<String, DescriptorDocument>) -> Vec<(String, RawDescriptor)> {
    documents
        .into_iter()
        .map(|(name, document)| (name, descriptor(document)))
        .collect()
}

impl Contract {
    /// Assemble a contract from its declarative JSON form.
    pub fn from_document(document: &Value) -> Result<Self, ContractError> {
        let parsed = ContractDocument::deserialize(document)
            .map_err(|e| ContractError::Assembly(format!("malformed contract document: {e}")))?;
        let workflows = parsed
            .workflows
            .into_iter()
            .map(|(name, workflow)| RawWorkflow {
                name,
                descriptor: RawDescriptor {
                    input: slot(workflow.input),
                    output: slot(workflow.output),
                },
                activities: descriptors(workflow.activities),
                signals: descriptors(workflow.signals),
                queries: descriptors(workflow.queries),
                updates: descriptors(workflow.updates),
            })
            .collect();
        assemble(RawContract {
            task_queue: parsed.task_queue,
            workflows,
            activities: descriptors(parsed.activities),
        })
    }

    /// Parse `text` as JSON and assemble it with [`Contract::from_document`].
    pub fn from_json_str(text: &str) -> Result<Self, ContractError> {
        let document: Value = serde_json::from_str(text)
            .map_err(|e| ContractError::Assembly(format!("contract is not valid JSON: {e}")))?;
        Self::from_document(&document)
    }
}
