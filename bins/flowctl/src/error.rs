#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("no operators configured")]
    NoOperators,

    #[error("{0}")]
    Engine(#[from] flow_engine::EngineError),

    #[error("recording: {0}")]
    Record(#[from] flow_api::OperatorError),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
