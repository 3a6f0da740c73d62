use flow_api::{
    Message, OpFuture, Operator, OperatorError, OperatorSetup, OutputContext, StreamDecl,
    StreamPredicate, StreamView,
};

use crate::stream_predicate;

/// Merges its inputs into one output in arrival order.
pub struct Concat {
    name: String,
    output: String,
    input_filter: Option<StreamPredicate>,
}

impl Concat {
    pub fn new(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            output: output.into(),
            input_filter: None,
        }
    }

    pub fn with_input_filter(
        mut self,
        filter: impl Fn(&StreamDecl) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.input_filter = Some(stream_predicate(filter));
        self
    }
}

impl Operator for Concat {
    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&mut self, inputs: StreamView) -> Result<OperatorSetup, OperatorError> {
        let inputs = inputs.filter_with(self.input_filter.as_ref());
        let output = StreamDecl::new(self.output.clone(), inputs.common_type());
        Ok(OperatorSetup::new(inputs, vec![output]))
    }

    fn handle<'a>(&'a self, ctx: &'a dyn OutputContext, msg: Message) -> OpFuture<'a> {
        Box::pin(async move { ctx.send(&self.output, msg).await })
    }
}
