use std::sync::Arc;

use flow_api::{
    DataType, Message, OpFuture, Operator, OperatorError, OperatorSetup, OutputContext, Payload,
    StreamDecl, StreamPredicate, StreamView,
};

use crate::{Mapper, stream_predicate};

/// One-to-one payload transformation. The timestamp is kept.
pub struct Map {
    name: String,
    output: String,
    mapper: Mapper,
    output_type: DataType,
    input_filter: Option<StreamPredicate>,
}

impl Map {
    /// Untyped mapping; the output is declared `Any` unless
    /// [`with_output_type`](Self::with_output_type) says otherwise.
    pub fn new(
        name: impl Into<String>,
        output: impl Into<String>,
        mapper: impl Fn(&Message) -> flow_api::Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            output: output.into(),
            mapper: Arc::new(mapper),
            output_type: DataType::Any,
            input_filter: None,
        }
    }

    /// Mapping into a concrete [`Payload`] type, which also fixes the output type.
    pub fn typed<T, F>(name: impl Into<String>, output: impl Into<String>, mapper: F) -> Self
    where
        T: Payload,
        F: Fn(&Message) -> T + Send + Sync + 'static,
    {
        Self::new(name, output, move |msg: &Message| mapper(msg).into_value())
            .with_output_type(T::data_type())
    }

    pub fn with_output_type(mut self, data_type: DataType) -> Self {
        self.output_type = data_type;
        self
    }

    pub fn with_input_filter(
        mut self,
        filter: impl Fn(&StreamDecl) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.input_filter = Some(stream_predicate(filter));
        self
    }
}

impl Operator for Map {
    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&mut self, inputs: StreamView) -> Result<OperatorSetup, OperatorError> {
        let inputs = inputs.filter_with(self.input_filter.as_ref());
        let output = StreamDecl::new(self.output.clone(), self.output_type.clone());
        Ok(OperatorSetup::new(inputs, vec![output]))
    }

    fn handle<'a>(&'a self, ctx: &'a dyn OutputContext, msg: Message) -> OpFuture<'a> {
        Box::pin(async move {
            let payload = (self.mapper)(&msg);
            ctx.send(&self.output, Message::new(payload, msg.timestamp)).await
        })
    }
}
