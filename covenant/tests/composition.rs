//! The prelude is enough to declare, implement and call a contract.

use std::rc::Rc;
use std::sync::Arc;

use covenant_core::test_utils::{LocalRuntime, RecordingClient};
use covenant::prelude::*;
use serde_json::json;

fn greeter() -> Contract {
    Contract::builder("greetings")
        .activity(
            "greet",
            OperationDescriptor::new(
                JsonSchema::compile(json!({"type": "string", "minLength": 1})).unwrap(),
                JsonSchema::compile(json!({"type": "string"})).unwrap(),
            ),
        )
        .workflow("hello", WorkflowSpec::new(JsonSchema::any(), JsonSchema::any()))
        .build()
        .unwrap()
}

#[tokio::test]
async fn worker_and_client_share_one_contract() {
    let contract = greeter();

    let activities = ActivityHandlers::builder(&contract)
        .handler("greet", |name| async move {
            Ok(json!(format!("hello, {}", name.as_str().unwrap_or_default())))
        })
        .build()
        .unwrap();
    let hello = WorkflowBuilder::<()>::new(&contract, "hello")
        .build(|ctx, input| async move { ctx.activities().call("greet", input).await })
        .unwrap();

    let runtime = Rc::new(LocalRuntime::new("hello", "hello-1").with_activities(Arc::new(activities)));
    assert_eq!(hello.run(runtime, json!("ada")).await.unwrap(), json!("hello, ada"));

    let engine = RecordingClient::new();
    let client = ContractClient::new(contract, Arc::new(engine.clone()));
    let err = client
        .start("goodbye", json!(null), StartOptions::new("bye-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ContractError::WorkflowNotFound { .. }));
    assert_eq!(engine.call_count(), 0);
}
