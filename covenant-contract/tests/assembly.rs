//! Assembly invariants and lookup behaviour of assembled contracts.

use std::collections::BTreeSet;
use std::sync::Arc;

use covenant_contract::*;
use covenant_core::{ContractError, OperationKind, Schema};
use proptest::prelude::*;
use serde_json::json;

fn open() -> JsonSchema {
    JsonSchema::any()
}

fn activity() -> OperationDescriptor {
    OperationDescriptor::new(open(), open())
}

fn assembly_message(result: Result<Contract, ContractError>) -> String {
    match result {
        Err(ContractError::Assembly(message)) => message,
        other => panic!("expected an assembly error, got {other:?}"),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Ordered checks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[test]
fn blank_queue_is_rejected_first() {
    let message = assembly_message(Contract::builder("   ").build());
    assert!(message.contains("task queue"), "{message}");
}

#[test]
fn at_least_one_workflow() {
    let message = assembly_message(Contract::builder("q").activity("log", activity()).build());
    assert!(message.contains("at least one workflow"), "{message}");
}

#[test]
fn names_must_be_identifiers() {
    for bad in ["1st", "has-dash", "", "with space", "ü"] {
        let message = assembly_message(
            Contract::builder("q")
                .workflow("wf", WorkflowSpec::new(open(), open()).signal(bad, open()))
                .build(),
        );
        assert!(message.contains("not a valid identifier"), "{bad}: {message}");
    }
    for good in ["_private", "$ref", "camelCase", "snake_case_2"] {
        assert!(is_identifier(good), "{good}");
    }
}

#[test]
fn duplicate_names_in_one_scope_are_rejected() {
    let message = assembly_message(
        Contract::builder("q")
            .workflow(
                "wf",
                WorkflowSpec::new(open(), open())
                    .update("add", open(), open())
                    .update("add", open(), open()),
            )
            .build(),
    );
    assert!(message.contains("update 'add' is declared more than once"), "{message}");
}

#[test]
fn scoped_activity_may_not_shadow_a_global_one() {
    let message = assembly_message(
        Contract::builder("q")
            .activity("log", activity())
            .workflow(
                "processOrder",
                WorkflowSpec::new(open(), open()).activity("log", activity()),
            )
            .build(),
    );
    assert!(message.contains("processOrder"), "{message}");
    assert!(message.contains("'log'"), "{message}");
}

#[test]
fn scoped_activities_of_different_workflows_may_not_collide() {
    let message = assembly_message(
        Contract::builder("q")
            .workflow("a", WorkflowSpec::new(open(), open()).activity("send", activity()))
            .workflow("b", WorkflowSpec::new(open(), open()).activity("send", activity()))
            .build(),
    );
    assert!(message.contains("workflow 'a'") && message.contains("workflow 'b'"), "{message}");
}

#[test]
fn name_check_precedes_collision_check() {
    // Both a bad name and a collision: the bad name is reported.
    let message = assembly_message(
        Contract::builder("q")
            .activity("log", activity())
            .workflow(
                "wf",
                WorkflowSpec::new(open(), open())
                    .activity("log", activity())
                    .query("bad-name", open(), open()),
            )
            .build(),
    );
    assert!(message.contains("bad-name"), "{message}");
}

#[test]
fn activity_without_output_is_rejected() {
    let message = assembly_message(
        Contract::builder("q")
            .activity("fire", OperationDescriptor::input_only(open()))
            .workflow("wf", WorkflowSpec::new(open(), open()))
            .build(),
    );
    assert!(message.contains("activity 'fire' has no output schema"), "{message}");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Lookups
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn orders() -> Contract {
    Contract::builder("orders")
        .activity("chargeCard", activity())
        .activity("sendEmail", activity())
        .workflow(
            "processOrder",
            WorkflowSpec::new(open(), open())
                .activity("reserveStock", activity())
                .signal("cancel", open())
                .query("status", open(), open())
                .update("addItem", open(), open()),
        )
        .workflow("refund", WorkflowSpec::new(open(), open()))
        .build()
        .unwrap()
}

#[test]
fn lookups_are_referentially_stable() {
    let contract = orders();
    let clone = contract.clone();
    assert!(contract.ptr_eq(&clone));
    assert!(Arc::ptr_eq(
        contract.workflow("processOrder").unwrap(),
        clone.workflow("processOrder").unwrap()
    ));
    assert!(Arc::ptr_eq(
        contract.activity("chargeCard").unwrap(),
        contract.activity("chargeCard").unwrap()
    ));
}

#[test]
fn workflow_activities_merges_and_is_idempotent() {
    let contract = orders();
    let first = contract.workflow_activities("processOrder").unwrap();
    let second = contract.workflow_activities("processOrder").unwrap();
    assert_eq!(
        first.keys().collect::<Vec<_>>(),
        vec!["chargeCard", "reserveStock", "sendEmail"]
    );
    assert_eq!(first.keys().collect::<Vec<_>>(), second.keys().collect::<Vec<_>>());
    for (name, descriptor) in &first {
        assert!(Arc::ptr_eq(descriptor, &second[name]));
    }

    // Scoped activities stay out of other workflows.
    let refund = contract.workflow_activities("refund").unwrap();
    assert!(!refund.contains_key("reserveStock"));
    assert_eq!(contract.all_activities().len(), 3);
}

#[test]
fn unknown_workflow_lists_real_names() {
    let err = orders().workflow_activities("doesNotExist").unwrap_err();
    match err {
        ContractError::WorkflowNotFound { workflow, available } => {
            assert_eq!(workflow, "doesNotExist");
            assert_eq!(available, vec!["processOrder", "refund"]);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn require_reports_unknown_operations() {
    let contract = orders();
    let workflow = contract.workflow("processOrder").unwrap();
    assert!(workflow.require(OperationKind::Query, "status").is_ok());
    let err = workflow.require(OperationKind::Signal, "pause").unwrap_err();
    assert_eq!(
        err.to_string(),
        "signal 'pause' is not declared by workflow 'processOrder' (available: cancel)"
    );
}

#[test]
fn descriptors_expose_their_schemas() {
    let contract = Contract::builder("q")
        .workflow(
            "wf",
            WorkflowSpec::new(
                JsonSchema::compile(json!({"type": "object"})).unwrap(),
                JsonSchema::compile(json!({"type": "string"})).unwrap(),
            )
            .signal("ping", open()),
        )
        .build()
        .unwrap();
    let workflow = contract.workflow("wf").unwrap();
    assert_eq!(workflow.input().json_schema(), Some(json!({"type": "object"})));
    assert_eq!(workflow.output().json_schema(), Some(json!({"type": "string"})));
    assert!(workflow.signal("ping").unwrap().output().is_none());
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Properties
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn identifier() -> impl Strategy<Value = String> {
    "[A-Za-z_$][A-Za-z0-9_$]{0,8}"
}

proptest! {
    #[test]
    fn assembled_name_sets_equal_declared_sets(
        workflows in prop::collection::btree_set(identifier(), 1..5),
        activities in prop::collection::btree_set(identifier(), 0..5),
        signals in prop::collection::btree_set(identifier(), 0..4),
    ) {
        let mut builder = Contract::builder("queue");
        for name in &activities {
            builder = builder.activity(name.clone(), activity());
        }
        for name in &workflows {
            let mut spec = WorkflowSpec::new(open(), open());
            for signal in &signals {
                spec = spec.signal(signal.clone(), open());
            }
            builder = builder.workflow(name.clone(), spec);
        }
        let contract = builder.build().unwrap();

        prop_assert_eq!(contract.workflow_names().into_iter().collect::<BTreeSet<_>>(), workflows.clone());
        prop_assert_eq!(contract.activity_names().into_iter().collect::<BTreeSet<_>>(), activities);
        for name in &workflows {
            let definition = contract.workflow(name).unwrap();
            prop_assert_eq!(definition.signal_names().into_iter().collect::<BTreeSet<_>>(), signals.clone());
        }
    }

    #[test]
    fn json_schema_never_panics_and_accepts_iff_conforming(n in any::<i64>(), s in ".{0,12}") {
        let schema = JsonSchema::compile(json!({
            "type": "object",
            "properties": {"n": {"type": "integer", "minimum": 0}, "s": {"type": "string", "maxLength": 6}},
            "required": ["n", "s"]
        })).unwrap();
        let conforms = n >= 0 && s.chars().count() <= 6;
        let issues = schema.check(&json!({"n": n, "s": s}));
        prop_assert_eq!(issues.is_empty(), conforms);
    }
}
