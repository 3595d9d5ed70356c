use thiserror::Error;
use tm_jobs::SchedulingError;

pub type Result<T> = std::result::Result<T, ToolError>;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("cancelled")]
    Cancelled,
}

impl From<anyhow::Error> for ToolError {
    fn from(e: anyhow::Error) -> Self {
        Self::ExecutionFailed(format!("{e:#}"))
    }
}

impl From<SchedulingError> for ToolError {
    fn from(e: SchedulingError) -> Self {
        match e {
            SchedulingError::Cancelled { .. } => Self::Cancelled,
            other => Self::ExecutionFailed(other.to_string()),
        }
    }
}
