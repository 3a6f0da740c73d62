use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::value::{DataType, Payload};

/// Name and element type of a stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamDecl {
    pub name: String,
    pub data_type: DataType,
}

impl StreamDecl {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self { name: name.into(), data_type }
    }

    /// Declaration whose element type comes from a [`Payload`] type.
    pub fn of<T: Payload>(name: impl Into<String>) -> Self {
        Self::new(name, T::data_type())
    }
}

/// Stream selector applied at setup time.
pub type StreamPredicate = Arc<dyn Fn(&StreamDecl) -> bool + Send + Sync>;

/// Set of input streams handed to an operator at setup.
///
/// Operators narrow it with [`filter`](Self::filter) or
/// [`filter_by_name`](Self::filter_by_name) and hand the result back in
/// [`OperatorSetup::inputs`]; the engine subscribes the operator to exactly
/// those streams.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamView {
    streams: Vec<StreamDecl>,
}

impl StreamView {
    pub fn new(streams: Vec<StreamDecl>) -> Self {
        Self { streams }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn filter(self, predicate: impl Fn(&StreamDecl) -> bool) -> Self {
        Self {
            streams: self.streams.into_iter().filter(|s| predicate(s)).collect(),
        }
    }

    pub fn filter_by_name(self, name: &str) -> Self {
        self.filter(|s| s.name == name)
    }

    /// Apply an optional configured predicate; `None` keeps every stream.
    pub fn filter_with(self, predicate: Option<&StreamPredicate>) -> Self {
        match predicate {
            Some(p) => self.filter(|s| p(s)),
            None => self,
        }
    }

    pub fn streams(&self) -> &[StreamDecl] {
        &self.streams
    }

    pub fn names(&self) -> Vec<String> {
        self.streams.iter().map(|s| s.name.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.streams.iter().any(|s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Element type shared by every stream in the view, `Any` otherwise.
    pub fn common_type(&self) -> DataType {
        DataType::unify(self.streams.iter().map(|s| s.data_type.clone()))
    }
}

/// What an operator returns from setup: the inputs it subscribes to and the
/// outputs it declares. Both are fixed for the operator's lifetime.
#[derive(Debug, Clone, Default)]
pub struct OperatorSetup {
    pub inputs: StreamView,
    pub outputs: Vec<StreamDecl>,
}

impl OperatorSetup {
    pub fn new(inputs: StreamView, outputs: Vec<StreamDecl>) -> Self {
        Self { inputs, outputs }
    }

    /// No inputs; output set only.
    pub fn source(outputs: Vec<StreamDecl>) -> Self {
        Self { inputs: StreamView::empty(), outputs }
    }

    /// Inputs only; no outputs.
    pub fn sink(inputs: StreamView) -> Self {
        Self { inputs, outputs: Vec::new() }
    }
}
