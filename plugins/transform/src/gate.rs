use std::sync::Arc;

use flow_api::{
    Message, OpFuture, Operator, OperatorError, OperatorSetup, OutputContext, StreamDecl,
    StreamPredicate, StreamView,
};

use crate::{MessagePredicate, stream_predicate};

/// Forwards a message unchanged iff the predicate accepts it.
pub struct Gate {
    name: String,
    output: String,
    predicate: MessagePredicate,
    input_filter: Option<StreamPredicate>,
}

impl Gate {
    pub fn new(
        name: impl Into<String>,
        output: impl Into<String>,
        predicate: impl Fn(&Message) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            output: output.into(),
            predicate: Arc::new(predicate),
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

impl Operator for Gate {
    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&mut self, inputs: StreamView) -> Result<OperatorSetup, OperatorError> {
        let inputs = inputs.filter_with(self.input_filter.as_ref());
        let output = StreamDecl::new(self.output.clone(), inputs.common_type());
        Ok(OperatorSetup::new(inputs, vec![output]))
    }

    fn handle<'a>(&'a self, ctx: &'a dyn OutputContext, msg: Message) -> OpFuture<'a> {
        Box::pin(async move {
            if (self.predicate)(&msg) {
                ctx.send(&self.output, msg).await?;
            } else {
                tracing::trace!(operator = %self.name, timestamp = %msg.timestamp, "message rejected");
            }
            Ok(())
        })
    }
}
