//! Minimal in-process engine for flow operators.
//!
//! Streams are registered by name in a [`StreamRegistry`]; each operator runs
//! in its own tokio task, receives the messages of its subscribed inputs in
//! arrival order through one inbox, and publishes on the streams it declared.

pub mod config;
pub mod error;
mod pipeline;
mod registry;
mod stream;

pub use config::{EngineConfig, OverflowPolicy};
pub use error::{EngineError, StreamError};
pub use pipeline::{Ingress, Pipeline, RunningPipeline};
pub use registry::{OperatorOutputs, StreamRegistry};
pub use stream::{Stream, Subscription};
