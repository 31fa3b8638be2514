//! # covenant-core — error taxonomy, validation boundary, engine protocol
//!
//! covenant sits in front of a durable-execution engine. Application
//! authors declare each workflow's input/output schemas and its activities,
//! signals, queries and updates once; covenant then hands every caller a
//! validated, name-checked wrapper. This crate holds the pieces every other
//! covenant crate shares.
//!
//! ## Contents
//!
//! | Piece | Types | What it does |
//! |-------|-------|-------------|
//! | Validation boundary | [`Schema`], [`validate`], [`validate_now`] | One primitive: value in, value or issues out |
//! | Error taxonomy | [`ContractError`], [`ActivityError`], [`ChildWorkflowError`], [`EngineError`] | Discriminated failure kinds |
//! | Engine protocol | [`WorkflowRuntime`], [`DeliverySink`], [`EngineClient`], [`ActivityExecutor`], [`WorkflowEntrypoint`] | What covenant consumes and exposes |
//! | Options | [`ActivityOptions`], [`ChildWorkflowOptions`], [`StartOptions`] | Engine pass-through configuration |
//!
//! ## Design Principle
//!
//! covenant implements no durability, transport or scheduling. Every engine
//! interaction goes through the traits in [`engine`], so a Temporal worker,
//! an in-process test double and a future engine all plug in the same way.
//!
//! Schema vendors plug in through the single [`Schema`] capability; nothing
//! in covenant branches on which vendor produced a schema.

#![deny(missing_docs)]

pub mod duration;
pub mod engine;
pub mod error;
pub mod id;
pub mod options;
pub mod schema;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use duration::DurationMs;
pub use engine::{
    ActivityExecutor, ActivityFailure, ActivityOutcome, ChildStart, DeliverySink, EngineClient,
    EngineWorkflowHandle, ExecutionInfo, NativeChildHandle, StartWorkflow, WorkflowDescription,
    WorkflowEntrypoint, WorkflowRuntime, WorkflowStatus,
};
pub use error::{
    ActivityError, ChildFailure, ChildWorkflowError, ChildWorkflowNotFoundError, ContractError,
    EngineError, OperationKind,
};
pub use id::{RunId, WorkflowId};
pub use options::{ActivityOptions, ChildWorkflowOptions, RetryPolicy, StartOptions};
pub use schema::{
    Issue, Outcome, PathSegment, Schema, SchemaRef, Validation, describe_issues, validate,
    validate_now,
};
