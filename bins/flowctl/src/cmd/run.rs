use flow_engine::Pipeline;
use tokio_util::sync::CancellationToken;

use crate::config::{FlowConfig, RunArgs};
use crate::error::CliError;

pub async fn run(args: RunArgs) -> Result<(), CliError> {
    tracing::info!("flowctl starting");

    // --- Load config ---
    let config = FlowConfig::load(&args.config)?;
    tracing::info!(config = %args.config, operators = config.operators.len(), "loaded config");
    if config.operators.is_empty() {
        return Err(CliError::NoOperators);
    }

    // --- Build ---
    let pipeline = build(config).await?;

    // --- Run until done or Ctrl+C ---
    let token = CancellationToken::new();
    let running = pipeline.start(token.clone());
    tracing::info!("pipeline running");

    let join = running.join();
    tokio::pin!(join);
    tokio::select! {
        result = &mut join => {
            result?;
            tracing::info!("pipeline finished");
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("shutting down...");
            token.cancel();
            join.await?;
            tracing::info!("shutdown complete");
        }
    }
    Ok(())
}

async fn build(config: FlowConfig) -> Result<Pipeline, CliError> {
    let mut pipeline = Pipeline::new(config.engine);
    for op_cfg in config.operators {
        let name = op_cfg.name().to_string();
        let kind = op_cfg.kind();
        let inputs = op_cfg.inputs().to_vec();
        let inputs: Vec<&str> = inputs.iter().map(String::as_str).collect();

        let outputs = pipeline.add_boxed(op_cfg.into_operator(), &inputs).await?;
        tracing::info!(
            operator = %name,
            kind,
            outputs = ?outputs.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
            "added operator"
        );
    }
    Ok(pipeline)
}
