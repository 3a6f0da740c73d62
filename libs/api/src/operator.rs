use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::OperatorError;
use crate::message::Message;
use crate::stream::{OperatorSetup, StreamDecl, StreamView};

/// Boxed future returned by operator and stream methods.
pub type OpFuture<'a, T = ()> = Pin<Box<dyn Future<Output = Result<T, OperatorError>> + Send + 'a>>;

/// Handle to a declared output stream.
pub trait OutputStream: Send + Sync {
    fn decl(&self) -> &StreamDecl;

    /// Deliver `msg` to every subscriber of this stream, stamping the
    /// stream name on it.
    fn send(&self, msg: Message) -> OpFuture<'_>;
}

/// Output side of an operator, provided by the engine.
///
/// Only the streams the operator declared at setup are reachable.
pub trait OutputContext: Send + Sync {
    /// Resolve a declared output by name.
    fn lookup_output(&self, name: &str) -> Result<Arc<dyn OutputStream>, OperatorError>;

    /// Names of every output the operator declared.
    fn output_names(&self) -> Vec<String>;

    /// Lookup + send in one step.
    fn send<'a>(&'a self, stream: &'a str, msg: Message) -> OpFuture<'a> {
        Box::pin(async move { self.lookup_output(stream)?.send(msg).await })
    }
}

/// A unit of the pipeline.
///
/// Lifecycle driven by the engine:
/// 1. `setup`: once. Narrow the input view and declare outputs.
/// 2. `handle` for every message from the subscribed inputs, sequentially and
///    in arrival order, concurrently with `run`.
/// 3. `stop`: once, after inputs are exhausted, `run` returned, or the
///    pipeline was cancelled.
pub trait Operator: Send + Sync {
    fn name(&self) -> &str;

    fn setup(&mut self, inputs: StreamView) -> Result<OperatorSetup, OperatorError>;

    fn handle<'a>(&'a self, ctx: &'a dyn OutputContext, msg: Message) -> OpFuture<'a> {
        let _ = (ctx, msg);
        Box::pin(async { Ok(()) })
    }

    /// Self-driven production (sources). Returning ends the production phase.
    fn run<'a>(&'a self, ctx: &'a dyn OutputContext) -> OpFuture<'a> {
        let _ = ctx;
        Box::pin(async { Ok(()) })
    }

    fn stop(&self) -> OpFuture<'_> {
        Box::pin(async { Ok(()) })
    }
}
