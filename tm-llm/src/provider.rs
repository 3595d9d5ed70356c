use crate::error::Result;
use crate::types::{ChatMessage, ChatResponse, ToolDefinition};
use async_trait::async_trait;

/// One completion round: everything the provider sees for a single call.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub system_prompt: &'a str,
    pub history: &'a [ChatMessage],
    pub functions: &'a [ToolDefinition],
    pub temperature: f32,
    /// When false the provider must answer in text only.
    pub allow_tool_calls: bool,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<ChatResponse>;

    fn model(&self) -> &str;
}
