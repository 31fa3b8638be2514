//! End-to-end behavior of a contract loaded from its JSON form, served by
//! a worker on the in-process runtime and called through the client.
//!
//! Covers the guarantees every caller relies on:
//!
//! 1. **Rejected arguments stop early**: nothing runs and the engine is not called
//! 2. **Malformed activity results never reach workflow code**
//! 3. **Undefined child workflows**: a named failure and no child start
//! 4. **Ordered deliveries**: signals run one at a time, in order
//! 5. **Shadowed activity names**: rejected when the contract is assembled

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use covenant_activity::ActivityHandlers;
use covenant_client::ContractClient;
use covenant_contract::Contract;
use covenant_core::test_utils::{LocalRuntime, RecordingClient, RuntimeCall};
use covenant_core::{
    ChildFailure, ChildWorkflowOptions, ContractError, DurationMs, PathSegment, StartOptions,
};
use covenant_workflow::{WorkflowBuilder, WorkflowImplementation};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new("debug"))
        .try_init();
}

fn contract_document() -> Value {
    json!({
        "taskQueue": "orders",
        "activities": {
            "processPayment": {
                "input": {
                    "type": "object",
                    "properties": {"amount": {"type": "number", "exclusiveMinimum": 0}},
                    "required": ["amount"]
                },
                "output": {
                    "type": "object",
                    "properties": {"transactionId": {"type": "string"}},
                    "required": ["transactionId"]
                }
            }
        },
        "workflows": {
            "testWorkflow": {
                "input": {
                    "type": "object",
                    "properties": {"value": {"type": "number"}},
                    "required": ["value"]
                },
                "output": {"type": "object"}
            },
            "processOrder": {
                "input": {
                    "type": "object",
                    "properties": {
                        "orderId": {"type": "string"},
                        "amount": {"type": "number"}
                    },
                    "required": ["orderId", "amount"]
                },
                "output": {"type": "object", "required": ["status"]},
                "activities": {
                    "reserveStock": {
                        "input": {"type": "array", "items": {"type": "string"}},
                        "output": {"type": "boolean"}
                    }
                },
                "signals": {"addItem": {"input": {"type": "string", "minLength": 1}}},
                "queries": {"items": {"input": {}, "output": {"type": "array"}}}
            },
            "shipOrder": {
                "input": {"type": "object", "required": ["orderId"]},
                "output": {"type": "object"}
            }
        }
    })
}

fn contract() -> Contract {
    Contract::from_document(&contract_document()).unwrap()
}

fn worker(contract: &Contract, payment_result: Value) -> Arc<ActivityHandlers> {
    let handlers = ActivityHandlers::builder(contract)
        .handler("processPayment", move |_| {
            let result = payment_result.clone();
            async move { Ok(result) }
        })
        .handler("reserveStock", |_| async { Ok(json!(true)) })
        .build()
        .unwrap();
    Arc::new(handlers)
}

#[derive(Default)]
struct Order {
    log: Vec<String>,
    items: Vec<String>,
}

fn process_order(contract: &Contract) -> WorkflowImplementation<Order> {
    WorkflowBuilder::<Order>::new(contract, "processOrder")
        .signal("addItem", |ctx, item| async move {
            let item = item.as_str().unwrap_or_default().to_owned();
            ctx.update_state(|order| order.log.push(format!("start:{item}")));
            ctx.sleep(DurationMs::from_millis(1)).await;
            ctx.update_state(|order| {
                order.log.push(format!("end:{item}"));
                order.items.push(item);
            });
            Ok(())
        })
        .query("items", |order, _| Ok(json!(order.items)))
        .build(|ctx, input| async move {
            ctx.wait_until(|order| order.items.len() >= 2).await;
            let items = ctx.state(|order| json!(order.items));
            let reserved = ctx.activities().call("reserveStock", items.clone()).await?;
            let receipt = ctx
                .activities()
                .call("processPayment", json!({"amount": input["amount"]}))
                .await?;
            Ok(json!({
                "status": "paid",
                "transactionId": receipt["transactionId"],
                "reserved": reserved,
                "items": items,
                "log": ctx.state(|order| order.log.clone()),
            }))
        })
        .unwrap()
}

#[tokio::test]
async fn rejected_start_argument_stops_before_anything_runs() {
    init_tracing();
    let contract = contract();

    let engine = RecordingClient::new();
    let client = ContractClient::new(contract.clone(), Arc::new(engine.clone()));
    let err = client
        .start("testWorkflow", json!({"value": "x"}), StartOptions::new("test-1"))
        .await
        .unwrap_err();
    let ContractError::WorkflowInputValidation { workflow, issues } = &err else {
        panic!("expected an input validation error, got {err:?}");
    };
    assert_eq!(workflow, "testWorkflow");
    assert_eq!(issues[0].path, vec![PathSegment::from("value")]);
    assert_eq!(engine.call_count(), 0);

    let ran = Rc::new(Cell::new(false));
    let flag = Rc::clone(&ran);
    let test_workflow = WorkflowBuilder::<()>::new(&contract, "testWorkflow")
        .build(move |ctx, input| {
            let flag = Rc::clone(&flag);
            async move {
                flag.set(true);
                ctx.activities()
                    .call("processPayment", json!({"amount": input["value"]}))
                    .await?;
                Ok(json!({}))
            }
        })
        .unwrap();
    let runtime = Rc::new(
        LocalRuntime::new("testWorkflow", "test-1")
            .with_activities(worker(&contract, json!({"transactionId": "tx-1"}))),
    );
    let err = test_workflow
        .run(runtime.clone(), json!({"value": "x"}))
        .await
        .unwrap_err();
    assert!(matches!(err, ContractError::WorkflowInputValidation { .. }));
    assert!(!ran.get());
    assert!(runtime.calls().is_empty());
}

#[tokio::test]
async fn malformed_payment_result_never_reaches_the_workflow() {
    init_tracing();
    let contract = contract();
    let runtime = Rc::new(
        LocalRuntime::new("processOrder", "order-1")
            .with_activities(worker(&contract, json!({"status": "ok"}))),
    );
    let (run, handle) = process_order(&contract)
        .start(runtime.clone(), json!({"orderId": "o-1", "amount": 20}))
        .unwrap();
    let _first = handle.signal("addItem", json!("widget")).unwrap();
    let _second = handle.signal("addItem", json!("gadget")).unwrap();

    let err = run.await.unwrap_err();
    let ContractError::ActivityOutputValidation { activity, issues } = &err else {
        panic!("expected an output validation error, got {err:?}");
    };
    assert_eq!(activity, "processPayment");
    assert_eq!(issues[0].path, vec![PathSegment::from("transactionId")]);
    assert_eq!(runtime.activity_call_count(), 2);
}

#[tokio::test]
async fn undefined_child_workflow_lists_the_real_names() {
    init_tracing();
    let contract = contract();
    let parent = WorkflowBuilder::<()>::new(&contract, "shipOrder")
        .build(|ctx, input| async move {
            let label = ctx
                .children()
                .execute(ctx.contract(), "doesNotExist", input, ChildWorkflowOptions::default())
                .await?;
            Ok(label)
        })
        .unwrap();
    let runtime = Rc::new(LocalRuntime::new("shipOrder", "ship-1"));

    let err = parent
        .run(runtime.clone(), json!({"orderId": "o-1"}))
        .await
        .unwrap_err();
    let ContractError::ChildWorkflow(child) = &err else {
        panic!("expected a child workflow error, got {err:?}");
    };
    let ChildFailure::NotFound(not_found) = &child.failure else {
        panic!("expected not found, got {child:?}");
    };
    assert_eq!(not_found.workflow, "doesNotExist");
    assert_eq!(
        not_found.available,
        vec!["processOrder", "shipOrder", "testWorkflow"]
    );
    assert_eq!(runtime.child_start_count(), 0);
}

#[tokio::test]
async fn signals_apply_one_at_a_time_in_delivery_order() {
    init_tracing();
    let contract = contract();
    let runtime = Rc::new(
        LocalRuntime::new("processOrder", "order-2")
            .with_activities(worker(&contract, json!({"transactionId": "tx-9"}))),
    );
    let (run, handle) = process_order(&contract)
        .start(runtime.clone(), json!({"orderId": "o-2", "amount": 20}))
        .unwrap();
    let first = handle.signal("addItem", json!("widget")).unwrap();
    let second = handle.signal("addItem", json!("gadget")).unwrap();

    let output = run.await.unwrap();
    first.await.unwrap();
    second.await.unwrap();

    assert_eq!(
        output,
        json!({
            "status": "paid",
            "transactionId": "tx-9",
            "reserved": true,
            "items": ["widget", "gadget"],
            "log": ["start:widget", "end:widget", "start:gadget", "end:gadget"],
        })
    );
    assert_eq!(handle.query("items", json!(null)).unwrap(), json!(["widget", "gadget"]));

    let activities: Vec<RuntimeCall> = runtime
        .calls()
        .into_iter()
        .filter(|call| matches!(call, RuntimeCall::Activity { .. }))
        .collect();
    assert_eq!(activities.len(), 2);
    assert!(matches!(&activities[0], RuntimeCall::Activity { name, .. } if name == "reserveStock"));
}

#[test]
fn scoped_activity_shadowing_a_global_one_fails_assembly() {
    let mut document = contract_document();
    document["activities"]["log"] = json!({"input": {}, "output": {}});
    document["workflows"]["processOrder"]["activities"]["log"] =
        json!({"input": {}, "output": {}});

    let err = Contract::from_document(&document).unwrap_err();
    let ContractError::Assembly(message) = &err else {
        panic!("expected an assembly error, got {err:?}");
    };
    assert!(message.contains("workflow 'processOrder'"));
    assert!(message.contains("'log'"));
}
