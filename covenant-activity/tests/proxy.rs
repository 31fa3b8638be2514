//! Activity proxy against an in-process runtime and a real handler map.

use std::rc::Rc;
use std::sync::Arc;

use covenant_activity::*;
use covenant_contract::{Contract, JsonSchema, OperationDescriptor, WorkflowSpec};
use covenant_core::test_utils::{LocalRuntime, RuntimeCall};
use covenant_core::{ActivityError, ActivityOptions, ContractError, DurationMs, RetryPolicy};
use proptest::prelude::*;
use serde_json::{Value, json};

fn payments() -> Contract {
    let amount = JsonSchema::compile(json!({
        "type": "object",
        "properties": {"amount": {"type": "number", "exclusiveMinimum": 0}},
        "required": ["amount"]
    }))
    .unwrap();
    let receipt = JsonSchema::compile(json!({
        "type": "object",
        "properties": {"transactionId": {"type": "string"}},
        "required": ["transactionId"]
    }))
    .unwrap();
    Contract::builder("payments")
        .activity("processPayment", OperationDescriptor::new(amount, receipt))
        .workflow(
            "checkout",
            WorkflowSpec::new(JsonSchema::any(), JsonSchema::any()).activity(
                "echo",
                OperationDescriptor::new(JsonSchema::any(), JsonSchema::any()),
            ),
        )
        .workflow("refund", WorkflowSpec::new(JsonSchema::any(), JsonSchema::any()))
        .build()
        .unwrap()
}

fn runtime_with(payment: fn(Value) -> Result<Value, ActivityError>) -> Rc<LocalRuntime> {
    let handlers = ActivityHandlers::builder(&payments())
        .handler("processPayment", move |input| async move { payment(input) })
        .handler("echo", |input| async move { Ok(input) })
        .build()
        .unwrap();
    Rc::new(LocalRuntime::new("checkout", "order-1").with_activities(Arc::new(handlers)))
}

fn proxy(runtime: &Rc<LocalRuntime>, workflow: &str) -> ActivityProxy {
    ActivityProxy::new(&payments(), workflow, runtime.clone()).unwrap()
}

#[tokio::test]
async fn valid_call_round_trips() {
    let runtime = runtime_with(|_| Ok(json!({"transactionId": "tx-1"})));
    let result = proxy(&runtime, "checkout")
        .call("processPayment", json!({"amount": 12.5}))
        .await
        .unwrap();
    assert_eq!(result, json!({"transactionId": "tx-1"}));
    assert_eq!(runtime.activity_call_count(), 1);
}

#[tokio::test]
async fn invalid_input_never_reaches_the_engine() {
    let runtime = runtime_with(|_| Ok(json!({"transactionId": "tx-1"})));
    let err = proxy(&runtime, "checkout")
        .call("processPayment", json!({"amount": -3}))
        .await
        .unwrap_err();
    assert!(matches!(err, ContractError::ActivityInputValidation { ref activity, .. } if activity == "processPayment"));
    assert_eq!(runtime.activity_call_count(), 0);
}

#[tokio::test]
async fn malformed_result_is_an_output_validation_error() {
    let runtime = runtime_with(|_| Ok(json!({"status": "paid"})));
    let err = proxy(&runtime, "checkout")
        .call("processPayment", json!({"amount": 10}))
        .await
        .unwrap_err();
    match err {
        ContractError::ActivityOutputValidation { activity, issues } => {
            assert_eq!(activity, "processPayment");
            assert_eq!(issues[0].to_string(), "$.transactionId: required field is missing");
        }
        other => panic!("expected an output validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn business_failures_surface_as_activity_errors() {
    let runtime = runtime_with(|_| {
        Err(ActivityError::new("CARD_DECLINED", "card declined").with_details(json!({"last4": "4242"})))
    });
    let err = proxy(&runtime, "checkout")
        .call("processPayment", json!({"amount": 10}))
        .await
        .unwrap_err();
    match err {
        ContractError::Activity(err) => {
            assert_eq!(err.code, "CARD_DECLINED");
            assert_eq!(err.details, Some(json!({"last4": "4242"})));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_activity_lists_reachable_names() {
    let runtime = runtime_with(|v| Ok(v));
    let err = proxy(&runtime, "refund")
        .call("echo", json!(1))
        .await
        .unwrap_err();
    match err {
        ContractError::ActivityDefinitionNotFound { activity, available } => {
            assert_eq!(activity, "echo");
            assert_eq!(available, vec!["processPayment"]);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(runtime.activity_call_count(), 0);
}

#[tokio::test]
async fn options_are_forwarded_untouched() {
    let runtime = runtime_with(|_| Ok(json!({"transactionId": "tx"})));
    let defaults = ActivityOptions::default().with_start_to_close_timeout(DurationMs::from_secs(5));
    let payment = ActivityOptions::default().with_retry(RetryPolicy {
        maximum_attempts: Some(3),
        ..RetryPolicy::default()
    });
    let proxy = proxy(&runtime, "checkout")
        .with_options(defaults.clone())
        .with_activity_options("processPayment", payment.clone());

    proxy.call("echo", json!("hi")).await.unwrap();
    proxy.call("processPayment", json!({"amount": 1})).await.unwrap();

    let sent: Vec<ActivityOptions> = runtime
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            RuntimeCall::Activity { options, .. } => Some(options),
            _ => None,
        })
        .collect();
    assert_eq!(sent, vec![defaults, payment]);
}

#[tokio::test]
async fn call_as_decodes_typed_results() {
    #[derive(serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Receipt {
        transaction_id: String,
    }

    let runtime = runtime_with(|_| Ok(json!({"transactionId": "tx-9"})));
    let receipt: Receipt = proxy(&runtime, "checkout")
        .call_as("processPayment", &json!({"amount": 3}))
        .await
        .unwrap();
    assert_eq!(receipt.transaction_id, "tx-9");
}

#[test]
fn unknown_workflow_is_rejected_at_construction() {
    let runtime = runtime_with(|v| Ok(v));
    let err = ActivityProxy::new(&payments(), "nope", runtime).unwrap_err();
    assert!(matches!(err, ContractError::WorkflowNotFound { .. }));
}

proptest! {
    #[test]
    fn conforming_results_resolve_deep_equal(amount in 0.01f64..1e9, id in "[a-z0-9-]{1,16}") {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let produced = json!({"transactionId": id, "amount": amount});
        let expected = produced.clone();
        let handlers = ActivityHandlers::builder(&payments())
            .handler("processPayment", move |_| {
                let produced = produced.clone();
                async move { Ok(produced) }
            })
            .handler("echo", |input| async move { Ok(input) })
            .build()
            .unwrap();
        let runtime = Rc::new(LocalRuntime::new("checkout", "p").with_activities(Arc::new(handlers)));
        let result = rt.block_on(proxy(&runtime, "checkout").call("processPayment", json!({"amount": amount})));
        prop_assert_eq!(result.unwrap(), expected);
    }
}
