//! In-memory engine doubles for testing.
//!
//! Available behind the `test-utils` feature flag. These implement the
//! engine protocol just far enough to drive covenant end to end without a
//! real durable-execution engine.

mod local_runtime;
mod recording_client;

pub use local_runtime::{LocalRuntime, RuntimeCall};
pub use recording_client::{ClientCall, RecordingClient};
