use std::fmt;

/// What went wrong inside an operator.
///
/// Every kind is fatal once the pipeline runs: the engine stops the failing
/// operator and cancels the rest. The kind only tells the caller where to
/// look (the config file, the disk, the recorded data, or an upstream
/// operator that emitted the wrong shape).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected operator settings, reported by `setup`.
    Config,
    /// Opening, reading or writing a recording or log file failed.
    Io,
    /// Recorded data cannot be trusted: truncated or undecodable record,
    /// a stream the manifest does not list, or a payload of the wrong type.
    Format,
    /// A payload that is not the shape the operator needs, e.g. a non-pair
    /// reaching unzip.
    Shape,
    /// Wiring or state mistakes: unknown output, operator used before setup.
    Logic,
}

impl ErrorKind {
    fn label(self) -> &'static str {
        match self {
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
            ErrorKind::Format => "format",
            ErrorKind::Shape => "shape",
            ErrorKind::Logic => "logic",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error type of the operator contract (`setup`, `handle`, `run`, `stop`).
///
/// `Display` is the bare message; `Debug` prefixes the kind, which is what
/// the engine logs when an operator fails.
#[derive(Clone)]
pub struct OperatorError {
    kind: ErrorKind,
    message: String,
}

impl OperatorError {
    fn of(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
        }
    }

    pub fn new(msg: impl Into<String>) -> Self {
        Self::of(ErrorKind::Logic, msg)
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::of(ErrorKind::Config, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::of(ErrorKind::Io, msg)
    }

    pub fn format_err(msg: impl Into<String>) -> Self {
        Self::of(ErrorKind::Format, msg)
    }

    pub fn shape(msg: impl Into<String>) -> Self {
        Self::of(ErrorKind::Shape, msg)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// `"{ctx}: {message}"`, same kind.
    pub fn with_context(self, ctx: impl fmt::Display) -> Self {
        Self::of(self.kind, format!("{ctx}: {}", self.message))
    }
}

impl fmt::Debug for OperatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl fmt::Display for OperatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for OperatorError {}

macro_rules! from_error {
    ($($source:ty => $kind:ident),* $(,)?) => {
        $(
            impl From<$source> for OperatorError {
                fn from(e: $source) -> Self {
                    Self::of(ErrorKind::$kind, e.to_string())
                }
            }
        )*
    };
}

from_error! {
    String => Logic,
    &str => Logic,
    std::io::Error => Io,
    serde_json::Error => Format,
}
