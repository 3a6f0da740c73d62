use std::sync::Arc;

use flow_api::{Message, Operator, OperatorError, OutputContext, StreamDecl, StreamView};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::error::{EngineError, StreamError};
use crate::registry::{OperatorOutputs, StreamRegistry};
use crate::stream::{Stream, Subscription};

struct Node {
    operator: Box<dyn Operator>,
    outputs: OperatorOutputs,
    inbox: Option<mpsc::Receiver<Message>>,
}

// ═══════════════════════════════════════════════════════════════
//  Pipeline (build phase)
// ═══════════════════════════════════════════════════════════════

/// Operators wired by stream name.
///
/// Operators are added in dependency order: every input must already be
/// declared, either by an ingress or by an earlier operator.
pub struct Pipeline {
    config: EngineConfig,
    registry: StreamRegistry,
    nodes: Vec<Node>,
}

impl Pipeline {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            registry: StreamRegistry::new(),
            nodes: Vec::new(),
        }
    }

    /// Declare a stream fed from outside the pipeline.
    pub fn add_ingress(&mut self, decl: StreamDecl) -> Result<Ingress, EngineError> {
        let stream = self.registry.declare(decl)?;
        tracing::debug!(stream = %stream.name(), "ingress declared");
        Ok(Ingress { stream })
    }

    pub async fn add_operator<O: Operator + 'static>(
        &mut self,
        operator: O,
        inputs: &[&str],
    ) -> Result<Vec<StreamDecl>, EngineError> {
        self.add_boxed(Box::new(operator), inputs).await
    }

    /// Run `setup` against the view of `inputs`, declare the returned
    /// outputs and attach the operator's inbox to the inputs it kept.
    pub async fn add_boxed(
        &mut self,
        mut operator: Box<dyn Operator>,
        inputs: &[&str],
    ) -> Result<Vec<StreamDecl>, EngineError> {
        let name = operator.name().to_string();
        if self.nodes.iter().any(|n| n.operator.name() == name) {
            return Err(EngineError::DuplicateOperator(name));
        }

        let mut decls = Vec::with_capacity(inputs.len());
        for input in inputs {
            let stream = self
                .registry
                .get(input)
                .ok_or_else(|| EngineError::StreamNotFound(input.to_string()))?;
            decls.push(stream.decl().clone());
        }

        let setup = operator
            .setup(StreamView::new(decls))
            .map_err(|source| EngineError::Setup {
                operator: name.clone(),
                source,
            })?;

        for kept in setup.inputs.streams() {
            if !inputs.contains(&kept.name.as_str()) {
                return Err(EngineError::Setup {
                    operator: name,
                    source: OperatorError::new(format!(
                        "subscribed to '{}' which is not one of its inputs",
                        kept.name
                    )),
                });
            }
        }
        for (i, decl) in setup.outputs.iter().enumerate() {
            let repeated = setup.outputs[..i].iter().any(|d| d.name == decl.name);
            if repeated || self.registry.contains(&decl.name) {
                return Err(EngineError::DuplicateStream(decl.name.clone()));
            }
        }

        let mut outputs = Vec::with_capacity(setup.outputs.len());
        for decl in &setup.outputs {
            outputs.push(self.registry.declare(decl.clone())?);
        }

        let inbox = if setup.inputs.is_empty() {
            None
        } else {
            let (tx, rx) = mpsc::channel(self.config.buffer);
            for kept in setup.inputs.streams() {
                if let Some(stream) = self.registry.get(&kept.name) {
                    stream.attach(&name, tx.clone(), self.config.overflow).await;
                }
            }
            Some(rx)
        };

        tracing::info!(
            operator = %name,
            inputs = ?setup.inputs.names(),
            outputs = ?setup.outputs.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
            "operator set up"
        );

        self.nodes.push(Node {
            operator,
            outputs: OperatorOutputs::new(&name, outputs),
            inbox,
        });
        Ok(setup.outputs)
    }

    /// Observe a stream from outside. Subscribe before `start` to see every
    /// message.
    pub async fn subscribe(&self, stream: &str) -> Result<Subscription, EngineError> {
        let stream = self
            .registry
            .get(stream)
            .ok_or_else(|| EngineError::StreamNotFound(stream.to_string()))?;
        Ok(stream.subscribe(self.config.buffer, self.config.overflow).await)
    }

    pub fn streams(&self) -> Vec<StreamDecl> {
        self.registry.decls()
    }

    /// Spawn one task per operator.
    ///
    /// Each task is watched by a supervisor in a [`JoinSet`] that names the
    /// operator in the outcome, so a panic surfaces as [`EngineError::Join`]
    /// like any other failure.
    pub fn start(self, token: CancellationToken) -> RunningPipeline {
        let mut tasks = JoinSet::new();
        for node in self.nodes {
            let operator = node.operator.name().to_string();
            let handle = tokio::spawn(drive(node, token.clone()));
            tasks.spawn(async move {
                match handle.await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(source)) => Err(EngineError::Operator { operator, source }),
                    Err(source) => Err(EngineError::Join { operator, source }),
                }
            });
        }
        RunningPipeline { tasks, token }
    }
}

/// Writer side of an ingress stream.
#[derive(Clone, Debug)]
pub struct Ingress {
    stream: Arc<Stream>,
}

impl Ingress {
    pub fn decl(&self) -> &StreamDecl {
        self.stream.decl()
    }

    pub async fn send(&self, msg: Message) -> Result<(), StreamError> {
        self.stream.publish(msg).await
    }

    pub async fn close(&self) {
        self.stream.close().await;
    }
}

// ═══════════════════════════════════════════════════════════════
//  RunningPipeline
// ═══════════════════════════════════════════════════════════════

pub struct RunningPipeline {
    tasks: JoinSet<Result<(), EngineError>>,
    token: CancellationToken,
}

impl RunningPipeline {
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Wait for every operator, in completion order. The first failure
    /// (error or panic) cancels the pipeline and is the one returned;
    /// operators stopped by that cancellation report success.
    pub async fn join(mut self) -> Result<(), EngineError> {
        let mut first = None;
        while let Some(joined) = self.tasks.join_next().await {
            // Supervisors only await a handle and are never aborted.
            let Ok(outcome) = joined else { continue };
            if let Err(err) = outcome {
                if first.is_none() {
                    tracing::error!(error = %err, "cancelling pipeline");
                    self.token.cancel();
                }
                first.get_or_insert(err);
            }
        }
        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Operator task: `run` and the inbox loop side by side until both finish,
/// an error occurs or the pipeline is cancelled. Outputs are closed on every
/// exit short of a panic; after a panic the cancelled token stops the rest.
async fn drive(node: Node, token: CancellationToken) -> Result<(), OperatorError> {
    let Node {
        operator,
        outputs,
        inbox,
    } = node;
    let name = operator.name().to_string();
    let op: &dyn Operator = operator.as_ref();
    let ctx: &dyn OutputContext = &outputs;

    tracing::debug!(operator = %name, "operator started");

    let inbox_loop = async move {
        if let Some(mut inbox) = inbox {
            while let Some(msg) = inbox.recv().await {
                op.handle(ctx, msg).await?;
            }
        }
        Ok::<(), OperatorError>(())
    };

    let result = tokio::select! {
        r = async { tokio::try_join!(op.run(ctx), inbox_loop).map(|_| ()) } => r,
        _ = token.cancelled() => {
            tracing::debug!(operator = %name, "operator cancelled");
            Ok(())
        }
    };

    let stopped = op.stop().await;
    outputs.close_all().await;

    match result.and(stopped) {
        Ok(()) => {
            tracing::info!(operator = %name, "operator finished");
            Ok(())
        }
        Err(e) => {
            tracing::error!(operator = %name, error = ?e, "operator failed, cancelling pipeline");
            token.cancel();
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use flow_api::{DataType, ErrorKind, OpFuture, OperatorSetup, Value};

    /// Forwards every input message to `out`.
    struct Relay {
        name: String,
    }

    impl Operator for Relay {
        fn name(&self) -> &str {
            &self.name
        }

        fn setup(&mut self, inputs: StreamView) -> Result<OperatorSetup, OperatorError> {
            let out = StreamDecl::new(format!("{}.out", self.name), inputs.common_type());
            Ok(OperatorSetup::new(inputs, vec![out]))
        }

        fn handle<'a>(&'a self, ctx: &'a dyn OutputContext, msg: Message) -> OpFuture<'a> {
            Box::pin(async move {
                let out = format!("{}.out", self.name);
                ctx.send(&out, msg).await
            })
        }
    }

    /// Fails on the first message it sees.
    struct Failing;

    impl Operator for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn setup(&mut self, inputs: StreamView) -> Result<OperatorSetup, OperatorError> {
            Ok(OperatorSetup::sink(inputs))
        }

        fn handle<'a>(&'a self, _ctx: &'a dyn OutputContext, _msg: Message) -> OpFuture<'a> {
            Box::pin(async { Err(OperatorError::shape("boom")) })
        }
    }

    /// Panics on the first message it sees.
    struct Panicking;

    impl Operator for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        fn setup(&mut self, inputs: StreamView) -> Result<OperatorSetup, OperatorError> {
            Ok(OperatorSetup::sink(inputs))
        }

        fn handle<'a>(&'a self, _ctx: &'a dyn OutputContext, _msg: Message) -> OpFuture<'a> {
            Box::pin(async { panic!("handler bug") })
        }
    }

    /// Source that never finishes on its own.
    struct Endless;

    impl Operator for Endless {
        fn name(&self) -> &str {
            "endless"
        }

        fn setup(&mut self, _inputs: StreamView) -> Result<OperatorSetup, OperatorError> {
            Ok(OperatorSetup::source(vec![StreamDecl::new("ticks", DataType::Int)]))
        }

        fn run<'a>(&'a self, _ctx: &'a dyn OutputContext) -> OpFuture<'a> {
            Box::pin(std::future::pending())
        }
    }

    fn relay(name: &str) -> Relay {
        Relay { name: name.into() }
    }

    #[tokio::test]
    async fn messages_flow_in_order_and_streams_close() {
        let mut pipeline = Pipeline::new(EngineConfig::default());
        let input = pipeline
            .add_ingress(StreamDecl::new("in", DataType::Int))
            .unwrap();
        let outs = pipeline.add_operator(relay("r"), &["in"]).await.unwrap();
        assert_eq!(outs, vec![StreamDecl::new("r.out", DataType::Int)]);

        let sub = pipeline.subscribe("r.out").await.unwrap();
        let running = pipeline.start(CancellationToken::new());

        for i in 0..5i64 {
            input.send(Message::new(i, i as u64)).await.unwrap();
        }
        input.close().await;

        let got = sub.collect().await;
        let payloads: Vec<Value> = got.iter().map(|m| m.payload.clone()).collect();
        assert_eq!(payloads, (0..5i64).map(Value::Int).collect::<Vec<_>>());
        assert!(got.iter().all(|m| m.stream == "r.out"));
        running.join().await.unwrap();
    }

    #[tokio::test]
    async fn merged_inputs_keep_arrival_order() {
        let mut pipeline = Pipeline::new(EngineConfig::default());
        let a = pipeline.add_ingress(StreamDecl::new("a", DataType::Int)).unwrap();
        let b = pipeline.add_ingress(StreamDecl::new("b", DataType::Int)).unwrap();
        pipeline.add_operator(relay("m"), &["a", "b"]).await.unwrap();
        let sub = pipeline.subscribe("m.out").await.unwrap();
        let running = pipeline.start(CancellationToken::new());

        a.send(Message::new(1i64, 1u64)).await.unwrap();
        b.send(Message::new(2i64, 1u64)).await.unwrap();
        a.send(Message::new(3i64, 2u64)).await.unwrap();
        a.close().await;
        b.close().await;

        let got: Vec<Value> = sub.collect().await.into_iter().map(|m| m.payload).collect();
        assert_eq!(got, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        running.join().await.unwrap();
    }

    #[tokio::test]
    async fn wiring_errors_are_reported() {
        let mut pipeline = Pipeline::new(EngineConfig::default());
        pipeline.add_ingress(StreamDecl::new("in", DataType::Any)).unwrap();

        let err = pipeline.add_operator(relay("r"), &["missing"]).await.unwrap_err();
        assert!(matches!(err, EngineError::StreamNotFound(s) if s == "missing"));

        pipeline.add_operator(relay("r"), &["in"]).await.unwrap();
        let err = pipeline.add_operator(relay("r"), &["in"]).await.unwrap_err();
        assert!(matches!(err, EngineError::DuplicateOperator(s) if s == "r"));

        let err = pipeline
            .add_ingress(StreamDecl::new("r.out", DataType::Any))
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateStream(s) if s == "r.out"));
    }

    #[tokio::test]
    async fn ingress_rejects_mistyped_payload() {
        let mut pipeline = Pipeline::new(EngineConfig::default());
        let input = pipeline.add_ingress(StreamDecl::new("in", DataType::Int)).unwrap();
        let err = input.send(Message::new(1.5f64, 1u64)).await.unwrap_err();
        assert!(matches!(err, StreamError::TypeMismatch { .. }));
    }

    #[tokio::test]
    async fn failure_cancels_the_rest() {
        let mut pipeline = Pipeline::new(EngineConfig::default());
        let input = pipeline.add_ingress(StreamDecl::new("in", DataType::Any)).unwrap();
        pipeline.add_operator(Endless, &[]).await.unwrap();
        pipeline.add_operator(Failing, &["in"]).await.unwrap();
        let running = pipeline.start(CancellationToken::new());
        let token = running.token();

        input.send(Message::new(1i64, 1u64)).await.unwrap();

        let err = running.join().await.unwrap_err();
        match err {
            EngineError::Operator { operator, source } => {
                assert_eq!(operator, "failing");
                assert_eq!(source.kind(), ErrorKind::Shape);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn panic_cancels_the_rest() {
        let mut pipeline = Pipeline::new(EngineConfig::default());
        let input = pipeline.add_ingress(StreamDecl::new("in", DataType::Any)).unwrap();
        pipeline.add_operator(Endless, &[]).await.unwrap();
        pipeline.add_operator(Panicking, &["in"]).await.unwrap();
        let running = pipeline.start(CancellationToken::new());
        let token = running.token();

        input.send(Message::new(1i64, 1u64)).await.unwrap();

        let joined = tokio::time::timeout(Duration::from_secs(5), running.join()).await;
        match joined.expect("join must not wait on the endless source") {
            Err(EngineError::Join { operator, source }) => {
                assert_eq!(operator, "panicking");
                assert!(source.is_panic());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn shutdown_stops_endless_source() {
        let mut pipeline = Pipeline::new(EngineConfig::default());
        pipeline.add_operator(Endless, &[]).await.unwrap();
        let mut ticks = pipeline.subscribe("ticks").await.unwrap();
        let running = pipeline.start(CancellationToken::new());

        running.shutdown();
        running.join().await.unwrap();
        assert!(ticks.recv().await.is_none());
    }
}
