use std::collections::HashMap;
use std::sync::Arc;

use flow_api::{OperatorError, OutputContext, OutputStream, StreamDecl};

use crate::error::EngineError;
use crate::stream::Stream;

/// All streams of a pipeline, keyed by name. Names are unique.
#[derive(Default)]
pub struct StreamRegistry {
    streams: HashMap<String, Arc<Stream>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, decl: StreamDecl) -> Result<Arc<Stream>, EngineError> {
        if self.streams.contains_key(&decl.name) {
            return Err(EngineError::DuplicateStream(decl.name));
        }
        let stream = Arc::new(Stream::new(decl));
        self.streams
            .insert(stream.name().to_string(), Arc::clone(&stream));
        Ok(stream)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Stream>> {
        self.streams.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.streams.contains_key(name)
    }

    /// Declarations sorted by name.
    pub fn decls(&self) -> Vec<StreamDecl> {
        let mut decls: Vec<StreamDecl> = self.streams.values().map(|s| s.decl().clone()).collect();
        decls.sort_by(|a, b| a.name.cmp(&b.name));
        decls
    }
}

/// [`OutputContext`] of one operator: exactly the streams it declared.
pub struct OperatorOutputs {
    operator: String,
    outputs: HashMap<String, Arc<Stream>>,
}

impl OperatorOutputs {
    pub fn new(operator: impl Into<String>, streams: impl IntoIterator<Item = Arc<Stream>>) -> Self {
        Self {
            operator: operator.into(),
            outputs: streams
                .into_iter()
                .map(|s| (s.name().to_string(), s))
                .collect(),
        }
    }

    pub async fn close_all(&self) {
        for stream in self.outputs.values() {
            stream.close().await;
        }
    }
}

impl OutputContext for OperatorOutputs {
    fn lookup_output(&self, name: &str) -> Result<Arc<dyn OutputStream>, OperatorError> {
        match self.outputs.get(name) {
            Some(stream) => Ok(Arc::clone(stream) as Arc<dyn OutputStream>),
            None => Err(OperatorError::new(format!(
                "operator '{}' has no output stream '{name}'",
                self.operator
            ))),
        }
    }

    fn output_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.outputs.keys().cloned().collect();
        names.sort();
        names
    }
}
