//! LLM completion seam for Taskmate.
//!
//! `LlmProvider` is what the turn orchestrator talks to; `LlmClient` is the
//! bundled OpenAI-compatible HTTP binding.

mod client;
mod error;
mod openai;
mod provider;
mod types;

pub use client::{DEFAULT_API_BASE, LlmClient, validate_tool_name};
pub use error::{LlmError, Result};
pub use provider::{CompletionRequest, LlmProvider};
pub use types::{ChatMessage, ChatResponse, Role, ToolCall, ToolDefinition, Usage};
