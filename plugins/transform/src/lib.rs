//! Stateless transformation operators.
//!
//! Every operator takes an optional input filter applied to its input view at
//! setup, declares its outputs once, and handles each message independently.

use std::sync::Arc;

use flow_api::{Message, StreamDecl, StreamPredicate, Value};

mod concat;
mod expand;
mod gate;
mod map;
mod unzip;

pub use concat::Concat;
pub use expand::Expand;
pub use gate::Gate;
pub use map::Map;
pub use unzip::Unzip;

/// Decides whether a message passes a [`Gate`].
pub type MessagePredicate = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

/// Computes a new payload from a message.
pub type Mapper = Arc<dyn Fn(&Message) -> Value + Send + Sync>;

pub(crate) fn stream_predicate(
    f: impl Fn(&StreamDecl) -> bool + Send + Sync + 'static,
) -> StreamPredicate {
    Arc::new(f)
}
