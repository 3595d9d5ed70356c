use crate::error::{LlmError, Result};
use crate::openai::{ChatCompletion, ChatRequest, ToolNames};
use crate::provider::{CompletionRequest, LlmProvider};
use crate::types::ChatResponse;
use async_trait::async_trait;
use std::time::{Duration, Instant};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

const MAX_TOOL_NAME_LEN: usize = 64;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const ERROR_BODY_CHARS: usize = 500;

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    api_base: String,
}

impl LlmClient {
    pub fn new(api_key: &str, model: &str, api_base: Option<&str>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(%e, "reqwest client build failed; falling back to default client");
                reqwest::Client::new()
            });
        let api_base = api_base
            .map(|b| b.trim().trim_end_matches('/'))
            .filter(|b| !b.is_empty())
            .unwrap_or(DEFAULT_API_BASE)
            .to_string();
        Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
            api_base,
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }
}

#[async_trait]
impl LlmProvider for LlmClient {
    #[tracing::instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<ChatResponse> {
        if request.history.is_empty() {
            return Err(LlmError::InvalidInput(
                "completion needs at least one history message".to_string(),
            ));
        }

        let names = ToolNames::new(request.functions);
        let body = ChatRequest::build(&self.model, request, &names);
        let started = Instant::now();
        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        tracing::debug!(
            status = status.as_u16(),
            latency_ms = started.elapsed().as_millis() as u64,
            body_len = text.len(),
            "chat completion response received"
        );
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(LlmError::Unavailable(format!(
                "status {status}: {}",
                truncate(&text, ERROR_BODY_CHARS)
            )));
        }
        if !status.is_success() {
            return Err(LlmError::Rejected {
                status: status.as_u16(),
                body: truncate(&text, ERROR_BODY_CHARS),
            });
        }

        let completion: ChatCompletion = serde_json::from_str(&text)?;
        completion.into_response(&names)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Rejects names no provider accepts even after sanitization.
pub fn validate_tool_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(LlmError::InvalidInput("tool name must not be empty".to_string()));
    }
    if name.len() > MAX_TOOL_NAME_LEN {
        return Err(LlmError::InvalidInput(format!(
            "tool name {name:?} exceeds {MAX_TOOL_NAME_LEN} characters"
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|ch| !(ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.')))
    {
        return Err(LlmError::InvalidInput(format!(
            "tool name {name:?} contains unsupported character {bad:?}"
        )));
    }
    Ok(())
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
