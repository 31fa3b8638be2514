//! # covenant-workflow — contract-checked workflow implementations
//!
//! Builds runnable workflows out of a [`covenant_contract::Contract`]:
//!
//! - [`WorkflowBuilder`] collects the body and every signal, query and
//!   update handler, and refuses to build unless the handler set matches
//!   the contract exactly.
//! - [`WorkflowImplementation`] validates input before the body runs and
//!   output after it returns, and implements
//!   [`covenant_core::WorkflowEntrypoint`] so an engine can load it.
//! - [`WorkflowRun`] and [`InstanceHandle`] form the cooperative loop of
//!   one instance: deliveries are queued and handled one at a time,
//!   interleaved with the body at await points only.
//! - [`ChildWorkflowOrchestrator`] starts child workflows of this or any
//!   other contract, with the target's schemas applied on both sides.
//!
//! ## Example
//!
//! ```rust,ignore
//! let order = WorkflowBuilder::<OrderState>::new(&contract, "processOrder")
//!     .signal("addItem", |ctx, item| async move {
//!         ctx.update_state(|s| s.items.push(item));
//!         Ok(())
//!     })
//!     .query("itemCount", |state, _| Ok(json!(state.items.len())))
//!     .build(|ctx, input| async move {
//!         let paid = ctx.activities().call("processPayment", input).await?;
//!         Ok(json!({"status": "paid", "receipt": paid}))
//!     })?;
//! ```

#![deny(missing_docs)]

mod builder;
mod child;
mod context;
mod implementation;
mod instance;

pub use builder::{BodyFn, QueryFn, SignalFn, UpdateFn, WorkflowBuilder};
pub use child::{ChildWorkflowHandle, ChildWorkflowOrchestrator};
pub use context::WorkflowContext;
pub use implementation::{WorkflowImplementation, WorkflowRegistry};
pub use instance::{InstanceHandle, Reply, SignalAck, WorkflowRun};
