//! # covenant-client — validated workflow calls from outside the worker
//!
//! [`ContractClient`] wraps an [`covenant_core::EngineClient`] with a
//! contract. Unknown workflow names are rejected locally, arguments are
//! validated before the engine sees them, and results are validated before
//! the caller does. [`ContractWorkflowHandle`] applies the same rule to
//! every signal, query and update.
//!
//! ```rust,ignore
//! let client = ContractClient::new(contract, Arc::new(engine));
//! let handle = client
//!     .start("processOrder", json!({"orderId": "o-1"}), StartOptions::new("order-o-1"))
//!     .await?;
//! handle.signal("addItem", json!({"sku": "a"})).await?;
//! let summary = handle.result().await?;
//! ```

#![deny(missing_docs)]

mod client;
mod handle;

pub use client::ContractClient;
pub use handle::ContractWorkflowHandle;
