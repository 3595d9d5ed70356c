use thiserror::Error;

pub type Result<T> = std::result::Result<T, LlmError>;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("invalid completion request: {0}")]
    InvalidInput(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-retryable rejection from the provider (4xx other than 429).
    #[error("provider rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    ResponseFormat(String),

    /// Rate limiting or a provider-side failure.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for LlmError {
    fn from(e: serde_json::Error) -> Self {
        Self::ResponseFormat(e.to_string())
    }
}
