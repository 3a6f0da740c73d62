use flow_api::{DataType, OperatorError};

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("stream '{stream}' expects {expected}, got {actual}")]
    TypeMismatch {
        stream: String,
        expected: DataType,
        actual: DataType,
    },

    #[error("stream '{0}' is closed")]
    Closed(String),
}

impl StreamError {
    /// Convert for the operator seam. A mistyped payload is a data-integrity
    /// error; sending on a closed stream is a logic error.
    pub fn into_operator_error(self) -> OperatorError {
        match self {
            StreamError::TypeMismatch { .. } => OperatorError::format_err(self.to_string()),
            StreamError::Closed(_) => OperatorError::new(self.to_string()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("stream '{0}' is already declared")]
    DuplicateStream(String),

    #[error("stream '{0}' not found")]
    StreamNotFound(String),

    #[error("operator '{0}' is already registered")]
    DuplicateOperator(String),

    #[error("setup ({operator}): {source}")]
    Setup { operator: String, source: OperatorError },

    #[error("operator '{operator}' failed: {source}")]
    Operator { operator: String, source: OperatorError },

    #[error("operator '{operator}' task aborted: {source}")]
    Join { operator: String, source: tokio::task::JoinError },

    #[error(transparent)]
    Stream(#[from] StreamError),
}
