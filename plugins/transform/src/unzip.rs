use flow_api::{
    DataType, Message, OpFuture, Operator, OperatorError, OperatorSetup, OutputContext,
    StreamDecl, StreamPredicate, StreamView,
};

use crate::stream_predicate;

/// Splits pair payloads: the first element goes to `left`, the second to
/// `right`, both with the input's timestamp. A payload that is not a 2-tuple
/// fails the operator.
pub struct Unzip {
    name: String,
    left: String,
    right: String,
    input_filter: Option<StreamPredicate>,
}

impl Unzip {
    pub fn new(name: impl Into<String>, left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            left: left.into(),
            right: right.into(),
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

impl Operator for Unzip {
    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&mut self, inputs: StreamView) -> Result<OperatorSetup, OperatorError> {
        if self.left == self.right {
            return Err(OperatorError::config(format!(
                "unzip '{}': both outputs are named '{}'",
                self.name, self.left
            )));
        }
        let inputs = inputs.filter_with(self.input_filter.as_ref());
        let (left_type, right_type) = match inputs.common_type() {
            DataType::Tuple(types) if types.len() == 2 => (types[0].clone(), types[1].clone()),
            _ => (DataType::Any, DataType::Any),
        };
        let outputs = vec![
            StreamDecl::new(self.left.clone(), left_type),
            StreamDecl::new(self.right.clone(), right_type),
        ];
        Ok(OperatorSetup::new(inputs, outputs))
    }

    fn handle<'a>(&'a self, ctx: &'a dyn OutputContext, msg: Message) -> OpFuture<'a> {
        Box::pin(async move {
            let (left, right) = msg
                .payload
                .into_pair()
                .map_err(|e| e.with_context(format!("unzip '{}' on '{}'", self.name, msg.stream)))?;
            ctx.send(&self.left, Message::new(left, msg.timestamp.clone()))
                .await?;
            ctx.send(&self.right, Message::new(right, msg.timestamp))
                .await
        })
    }
}
