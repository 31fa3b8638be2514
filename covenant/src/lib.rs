#![deny(missing_docs)]
//! # covenant — umbrella crate
//!
//! One import surface for covenant. Re-exports the protocol crate and the
//! worker and client layers behind feature flags, plus a `prelude` for the
//! common path: declare a contract, implement it in a worker, call it from
//! a client.

#[cfg(feature = "activity")]
pub use covenant_activity;
#[cfg(feature = "client")]
pub use covenant_client;
#[cfg(feature = "core")]
pub use covenant_contract;
#[cfg(feature = "core")]
pub use covenant_core;
#[cfg(feature = "worker")]
pub use covenant_workflow;

/// Happy-path imports for building on covenant.
pub mod prelude {
    #[cfg(feature = "core")]
    pub use covenant_core::{
        ActivityError, ActivityOptions, ChildWorkflowError, ChildWorkflowOptions, ContractError,
        DurationMs, EngineClient, EngineError, Issue, RetryPolicy, Schema, StartOptions,
        WorkflowId, WorkflowRuntime,
    };

    #[cfg(feature = "core")]
    pub use covenant_contract::{
        Contract, JsonSchema, OperationDescriptor, TypedSchema, WorkflowSpec, schema_fn,
    };

    #[cfg(feature = "activity")]
    pub use covenant_activity::{ActivityHandlers, ActivityProxy};

    #[cfg(feature = "worker")]
    pub use covenant_workflow::{
        InstanceHandle, WorkflowBuilder, WorkflowContext, WorkflowImplementation,
        WorkflowRegistry,
    };

    #[cfg(feature = "client")]
    pub use covenant_client::{ContractClient, ContractWorkflowHandle};
}
