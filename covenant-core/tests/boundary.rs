//! Acceptance tests for the validation boundary and protocol traits.
//!
//! Tests cover:
//! - Trait object safety (Box<dyn Trait> is Send + Sync where required)
//! - validate() never panics and succeeds iff the value conforms
//! - Typed ID conversions
//! - Option wire formats

use covenant_core::*;
use proptest::prelude::*;
use serde_json::json;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Object safety
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn _assert_send_sync<T: Send + Sync>() {}

#[test]
fn engine_client_is_object_safe_send_sync() {
    _assert_send_sync::<std::sync::Arc<dyn EngineClient>>();
    _assert_send_sync::<Box<dyn EngineWorkflowHandle>>();
}

#[test]
fn activity_executor_is_object_safe_send_sync() {
    _assert_send_sync::<std::sync::Arc<dyn ActivityExecutor>>();
}

#[test]
fn schema_is_object_safe_send_sync() {
    _assert_send_sync::<SchemaRef>();
}

#[test]
fn contract_error_is_send_sync() {
    _assert_send_sync::<ContractError>();
}

#[test]
fn workflow_runtime_is_object_safe() {
    fn _takes(_: std::rc::Rc<dyn WorkflowRuntime>) {}
    fn _takes_entry(_: std::rc::Rc<dyn WorkflowEntrypoint>) {}
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation boundary properties
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Accepts integers in 0..=100.
struct Percent;

impl Schema for Percent {
    fn validate(&self, value: serde_json::Value) -> Validation {
        match value.as_i64() {
            Some(n) if (0..=100).contains(&n) => Validation::Ready(Ok(value)),
            Some(n) => Validation::Ready(Err(vec![Issue::new(format!("{n} is out of range"))])),
            None => Validation::Ready(Err(vec![Issue::new("expected integer")])),
        }
    }
}

fn arb_json() -> impl Strategy<Value = serde_json::Value> {
    let leaf = prop_oneof![
        Just(serde_json::Value::Null),
        any::<bool>().prop_map(serde_json::Value::from),
        any::<i64>().prop_map(serde_json::Value::from),
        "[a-z]{0,8}".prop_map(serde_json::Value::from),
    ];
    leaf.prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(serde_json::Value::from),
            prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                .prop_map(|m| serde_json::Value::Object(m.into_iter().collect())),
        ]
    })
}

proptest! {
    #[test]
    fn validate_succeeds_iff_value_conforms(value in arb_json()) {
        let conforms = value.as_i64().is_some_and(|n| (0..=100).contains(&n));
        let outcome = validate_now(&Percent, value.clone()).unwrap();
        prop_assert_eq!(outcome.is_ok(), conforms);
        if conforms {
            prop_assert_eq!(outcome.unwrap(), value);
        }
    }
}

#[tokio::test]
async fn async_boundary_matches_sync_boundary_for_ready_schemas() {
    for value in [json!(5), json!(500), json!("5")] {
        let sync = validate_now(&Percent, value.clone()).unwrap();
        let asynchronous = validate(&Percent, value).await;
        assert_eq!(sync, asynchronous);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Typed IDs and wire formats
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[test]
fn workflow_id_is_transparent_on_the_wire() {
    let id = WorkflowId::from("order-42");
    assert_eq!(serde_json::to_value(&id).unwrap(), json!("order-42"));
    assert_eq!(id.to_string(), "order-42");
}

#[test]
fn execution_info_uses_camel_case() {
    let info = ExecutionInfo {
        workflow_id: WorkflowId::new("wf"),
        run_id: RunId::new("r"),
        workflow_type: "processOrder".into(),
        task_queue: "orders".into(),
        attempt: 1,
    };
    let value = serde_json::to_value(&info).unwrap();
    assert_eq!(value["workflowType"], json!("processOrder"));
    assert_eq!(value["taskQueue"], json!("orders"));
}
