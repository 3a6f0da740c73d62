use std::sync::Arc;

use flow_api::{
    DataType, Message, OpFuture, Operator, OperatorError, OperatorSetup, OutputContext,
    StreamDecl, StreamPredicate, StreamView, Value,
};

use crate::{Mapper, stream_predicate};

/// One-to-many: emits every element of the (optionally pre-mapped) payload
/// as its own message with the input's timestamp.
///
/// Lists and tuples are split; any other payload is emitted as a single
/// element.
pub struct Expand {
    name: String,
    output: String,
    mapper: Option<Mapper>,
    output_type: Option<DataType>,
    input_filter: Option<StreamPredicate>,
}

impl Expand {
    pub fn new(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            output: output.into(),
            mapper: None,
            output_type: None,
            input_filter: None,
        }
    }

    pub fn with_mapper(
        mut self,
        mapper: impl Fn(&Message) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.mapper = Some(Arc::new(mapper));
        self
    }

    pub fn with_output_type(mut self, data_type: DataType) -> Self {
        self.output_type = Some(data_type);
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

impl Operator for Expand {
    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&mut self, inputs: StreamView) -> Result<OperatorSetup, OperatorError> {
        let inputs = inputs.filter_with(self.input_filter.as_ref());
        let data_type = match (&self.output_type, &self.mapper) {
            (Some(t), _) => t.clone(),
            (None, None) => inputs.common_type().element_type(),
            (None, Some(_)) => DataType::Any,
        };
        let output = StreamDecl::new(self.output.clone(), data_type);
        Ok(OperatorSetup::new(inputs, vec![output]))
    }

    fn handle<'a>(&'a self, ctx: &'a dyn OutputContext, msg: Message) -> OpFuture<'a> {
        Box::pin(async move {
            let (payload, timestamp) = match &self.mapper {
                Some(f) => (f(&msg), msg.timestamp),
                None => (msg.payload, msg.timestamp),
            };
            for element in payload.into_elements() {
                ctx.send(&self.output, Message::new(element, timestamp.clone()))
                    .await?;
            }
            Ok(())
        })
    }
}
