//! Shared vocabulary of the flow workspace: payload values and their schema,
//! timestamped messages, stream declarations and views, and the operator
//! contract that the engine drives.
//!
//! The engine implements [`OutputContext`] / [`OutputStream`]; operator crates
//! only ever see these traits.

pub mod error;
pub mod message;
pub mod operator;
pub mod stream;
pub mod value;

pub use error::{ErrorKind, OperatorError};
pub use message::{Message, Timestamp};
pub use operator::{OpFuture, Operator, OutputContext, OutputStream};
pub use stream::{OperatorSetup, StreamDecl, StreamPredicate, StreamView};
pub use value::{DataType, Elements, Payload, Value};
