//! Client façade against a scripted engine client.

use std::sync::Arc;

use covenant_client::ContractClient;
use covenant_contract::{Contract, JsonSchema, WorkflowSpec};
use covenant_core::test_utils::{ClientCall, RecordingClient};
use covenant_core::{ContractError, EngineError, StartOptions, WorkflowId, WorkflowStatus};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

fn schema(document: Value) -> JsonSchema {
    JsonSchema::compile(document).unwrap()
}

fn orders() -> Contract {
    Contract::builder("orders")
        .workflow(
            "processOrder",
            WorkflowSpec::new(
                schema(json!({
                    "type": "object",
                    "properties": {
                        "orderId": {"type": "string"},
                        "amount": {"type": "number", "minimum": 0}
                    },
                    "required": ["orderId", "amount"]
                })),
                schema(json!({
                    "type": "object",
                    "properties": {"status": {"enum": ["paid", "failed"]}},
                    "required": ["status"]
                })),
            )
            .signal(
                "addItem",
                schema(json!({
                    "type": "object",
                    "properties": {"sku": {"type": "string"}},
                    "required": ["sku"]
                })),
            )
            .query("status", JsonSchema::any(), schema(json!({"type": "string"})))
            .query(
                "lineItem",
                schema(json!({"type": "integer", "minimum": 0})),
                JsonSchema::any(),
            )
            .update(
                "setPriority",
                schema(json!({"type": "integer", "minimum": 1, "maximum": 5})),
                schema(json!({"type": "integer"})),
            ),
        )
        .build()
        .unwrap()
}

fn client(engine: &RecordingClient) -> ContractClient {
    ContractClient::new(orders(), Arc::new(engine.clone()))
}

fn order(id: &str) -> StartOptions {
    StartOptions::new(id)
}

#[tokio::test]
async fn unknown_workflow_never_reaches_the_engine() {
    let engine = RecordingClient::new();
    let client = client(&engine);

    let err = client
        .start("shipOrder", json!({}), order("o-1"))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "workflow 'shipOrder' is not defined (available: processOrder)"
    );
    assert!(client.execute("shipOrder", json!({}), order("o-1")).await.is_err());
    assert!(client.get_handle("shipOrder", "o-1").await.is_err());
    assert_eq!(engine.call_count(), 0);
}

#[tokio::test]
async fn invalid_argument_is_rejected_before_start() {
    let engine = RecordingClient::new();
    let err = client(&engine)
        .start("processOrder", json!({"orderId": "o-1", "amount": "x"}), order("o-1"))
        .await
        .unwrap_err();

    assert!(matches!(err, ContractError::WorkflowInputValidation { ref workflow, .. } if workflow == "processOrder"));
    assert!(err.is_validation());
    assert_eq!(engine.call_count(), 0);
}

#[tokio::test]
async fn execute_validates_the_result() {
    let engine = RecordingClient::new().with_result("processOrder", json!({"status": "paid"}));
    let result = client(&engine)
        .execute("processOrder", json!({"orderId": "o-1", "amount": 10}), order("o-1"))
        .await
        .unwrap();

    assert_eq!(result, json!({"status": "paid"}));
    assert_eq!(
        engine.calls(),
        vec![
            ClientCall::Start {
                workflow_type: "processOrder".into(),
                task_queue: "orders".into(),
                workflow_id: WorkflowId::new("o-1"),
                args: json!({"orderId": "o-1", "amount": 10}),
            },
            ClientCall::Result(WorkflowId::new("o-1")),
        ]
    );
}

#[tokio::test]
async fn malformed_result_is_an_output_validation_error() {
    let engine = RecordingClient::new().with_result("processOrder", json!({"status": "lost"}));
    let err = client(&engine)
        .execute("processOrder", json!({"orderId": "o-1", "amount": 10}), order("o-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ContractError::WorkflowOutputValidation { .. }));
}

#[tokio::test]
async fn engine_failures_pass_through() {
    let engine = RecordingClient::new()
        .with_failure("processOrder", EngineError::WorkflowFailed("card declined".into()));
    let client = client(&engine);
    let err = client
        .execute("processOrder", json!({"orderId": "o-1", "amount": 10}), order("o-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ContractError::Engine(EngineError::WorkflowFailed(ref m)) if m == "card declined"));

    let again = client
        .start("processOrder", json!({"orderId": "o-1", "amount": 10}), order("o-1"))
        .await
        .unwrap_err();
    assert!(matches!(again, ContractError::Engine(EngineError::AlreadyStarted(_))));
}

#[tokio::test]
async fn handle_operations_are_validated_both_ways() {
    let engine = RecordingClient::new()
        .with_query_response("status", json!(3))
        .with_update_response("setPriority", json!(2));
    let handle = client(&engine)
        .start("processOrder", json!({"orderId": "o-1", "amount": 10}), order("o-1"))
        .await
        .unwrap();
    let before = engine.call_count();

    let err = handle.signal("addItem", json!({"qty": 1})).await.unwrap_err();
    assert!(matches!(err, ContractError::SignalInputValidation { .. }));
    let err = handle.update("setPriority", json!(9)).await.unwrap_err();
    assert!(matches!(err, ContractError::UpdateInputValidation { .. }));
    let err = handle.signal("pause", json!(null)).await.unwrap_err();
    assert!(matches!(err, ContractError::UnknownOperation { .. }));
    let err = handle.query("lineItem", json!("first")).await.unwrap_err();
    assert!(matches!(err, ContractError::QueryInputValidation { ref query, .. } if query == "lineItem"));
    assert_eq!(engine.call_count(), before);

    handle.signal("addItem", json!({"sku": "a"})).await.unwrap();
    assert_eq!(handle.update("setPriority", json!(2)).await.unwrap(), json!(2));
    let err = handle.query("status", json!(null)).await.unwrap_err();
    assert!(matches!(err, ContractError::QueryOutputValidation { ref query, .. } if query == "status"));
    assert_eq!(engine.call_count(), before + 3);
}

#[tokio::test]
async fn lifecycle_calls_are_forwarded() {
    let engine = RecordingClient::new();
    let client = client(&engine);
    let handle = client
        .start("processOrder", json!({"orderId": "o-1", "amount": 1}), order("o-1"))
        .await
        .unwrap();

    assert_eq!(handle.describe().await.unwrap().status, WorkflowStatus::Running);
    handle.cancel().await.unwrap();
    assert_eq!(handle.describe().await.unwrap().status, WorkflowStatus::Cancelled);

    let other = client
        .start("processOrder", json!({"orderId": "o-2", "amount": 1}), order("o-2"))
        .await
        .unwrap();
    other.terminate(Some("stale")).await.unwrap();
    assert!(engine.calls().contains(&ClientCall::Terminate {
        workflow_id: WorkflowId::new("o-2"),
        reason: Some("stale".into()),
    }));
    assert_eq!(other.describe().await.unwrap().status, WorkflowStatus::Terminated);
}

#[tokio::test]
async fn existing_executions_are_reached_by_id() {
    let engine = RecordingClient::new();
    let handle = client(&engine).get_handle("processOrder", "o-404").await.unwrap();
    assert_eq!(handle.workflow_id().as_str(), "o-404");
    assert_eq!(handle.workflow_name(), "processOrder");

    let err = handle.describe().await.unwrap_err();
    assert!(matches!(err, ContractError::Engine(EngineError::NotFound(_))));
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderInput<'a> {
    order_id: &'a str,
    amount: f64,
}

#[derive(Debug, Deserialize, PartialEq)]
struct OrderOutcome {
    status: String,
}

#[tokio::test]
async fn typed_execution_round_trips_through_serde() {
    let engine = RecordingClient::new().with_result("processOrder", json!({"status": "paid"}));
    let outcome: OrderOutcome = client(&engine)
        .execute_as(
            "processOrder",
            &OrderInput {
                order_id: "o-1",
                amount: 12.5,
            },
            order("o-1"),
        )
        .await
        .unwrap();
    assert_eq!(
        outcome,
        OrderOutcome {
            status: "paid".into()
        }
    );
}

#[tokio::test]
async fn execute_many_keeps_request_order() {
    let engine = RecordingClient::new().with_result("processOrder", json!({"status": "paid"}));
    let results = client(&engine)
        .execute_many(vec![
            ("processOrder".into(), json!({"orderId": "a", "amount": 1}), order("a")),
            ("processOrder".into(), json!({"orderId": "b"}), order("b")),
            ("shipOrder".into(), json!({}), order("c")),
        ])
        .await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap(), &json!({"status": "paid"}));
    assert!(matches!(results[1], Err(ContractError::WorkflowInputValidation { .. })));
    assert!(matches!(results[2], Err(ContractError::WorkflowNotFound { .. })));
}
