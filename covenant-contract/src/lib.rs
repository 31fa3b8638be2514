//! # covenant-contract — contract model and assembly
//!
//! A [`Contract`] is the single declaration of what a group of workflows
//! accepts and returns: each workflow's input and output schema, the
//! activities it may call, and its signals, queries and updates. It is
//! assembled once, checked structurally, and then shared read-only by
//! every proxy, handler map and client.
//!
//! Two construction paths feed the same checks:
//!
//! - [`Contract::builder`] with [`WorkflowSpec`] for contracts written in Rust
//! - [`Contract::from_document`] for declarative JSON contracts
//!
//! Schemas are anything implementing [`covenant_core::Schema`]. This crate
//! ships [`JsonSchema`] (a compiled JSON Schema subset), [`TypedSchema`]
//! (serde + schemars) and closure-backed [`FnSchema`] / [`AsyncFnSchema`].

#![deny(missing_docs)]

mod assembly;
mod builder;
mod document;
pub mod json_schema;
mod model;
pub mod typed;

pub use assembly::is_identifier;
pub use builder::{ContractBuilder, WorkflowSpec};
pub use json_schema::JsonSchema;
pub use model::{Contract, OperationDescriptor, WorkflowDefinition};
pub use typed::{AsyncFnSchema, FnSchema, TypedSchema, async_schema_fn, schema_fn};
