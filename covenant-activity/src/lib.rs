//! # covenant-activity — validated activity calls
//!
//! Both sides of an activity invocation:
//!
//! - [`ActivityProxy`] runs inside workflow code. It resolves only the
//!   activities the workflow may reach, validates arguments before
//!   anything is scheduled and validates results before workflow code sees
//!   them.
//! - [`ActivityHandlers`] runs in the worker. It is the name-to-callable
//!   map the engine dispatches to, and it implements
//!   [`covenant_core::ActivityExecutor`].
//!
//! Only [`covenant_core::ActivityError`] represents a business failure
//! across this boundary. Validation errors raised by the worker travel as
//! failures with the [`INPUT_VALIDATION_CODE`] or [`OUTPUT_VALIDATION_CODE`]
//! code and are rebuilt into the matching error kind by the proxy.

#![deny(missing_docs)]

mod handlers;
mod proxy;

pub use handlers::{
    ActivityFn, ActivityHandlers, ActivityHandlersBuilder, INPUT_VALIDATION_CODE,
    OUTPUT_VALIDATION_CODE,
};
pub use proxy::ActivityProxy;
