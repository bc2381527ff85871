use thiserror::Error;
pub type Result<T> = std::result::Result<T, PipelineError>;
/// Coarse error taxonomy the driver uses to decide between stopping and skipping a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Shape,
    DegenerateInput,
    Io,
}
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("malformed sample buffer: {0}")]
    Shape(String),
    #[error("degenerate input: {0}")]
    DegenerateInput(String),
    #[error("recording {path}, line {line}: {reason}")]
    Recording {
        path: String,
        line: usize,
        reason: String,
    },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Config(_) | PipelineError::Json(_) => ErrorKind::Config,
            PipelineError::Shape(_) => ErrorKind::Shape,
            PipelineError::DegenerateInput(_) => ErrorKind::DegenerateInput,
            PipelineError::Recording { .. } | PipelineError::Io(_) => ErrorKind::Io,
        }
    }
}
