//! OpenAI chat-completions wire format.
//!
//! Requests borrow from the caller's history; nothing is cloned except the
//! sanitized tool names.

use crate::error::{LlmError, Result};
use crate::provider::CompletionRequest;
use crate::types::{ChatMessage, ChatResponse, Role, ToolCall, ToolDefinition, Usage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Maps `plugin.function` names onto `^[a-zA-Z0-9_-]+$` and back.
#[derive(Debug, Default)]
pub(crate) struct ToolNames {
    to_wire: HashMap<String, String>,
    from_wire: HashMap<String, String>,
}

impl ToolNames {
    pub(crate) fn new(functions: &[ToolDefinition]) -> Self {
        let mut names = Self::default();
        for function in functions {
            let base = sanitize_tool_name(&function.name);
            let mut candidate = base.clone();
            let mut suffix = 1;
            while names.from_wire.contains_key(&candidate) {
                candidate = format!("{base}_{suffix}");
                suffix += 1;
            }
            names
                .to_wire
                .insert(function.name.clone(), candidate.clone());
            names.from_wire.insert(candidate, function.name.clone());
        }
        names
    }

    /// Calls replayed from history may name functions not offered in this
    /// request; those are sanitized without a reverse mapping.
    pub(crate) fn to_wire(&self, name: &str) -> String {
        self.to_wire
            .get(name)
            .cloned()
            .unwrap_or_else(|| sanitize_tool_name(name))
    }

    pub(crate) fn from_wire(&self, wire: String) -> String {
        self.from_wire.get(&wire).cloned().unwrap_or(wire)
    }
}

fn sanitize_tool_name(name: &str) -> String {
    let out: String = name
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if out.is_empty() { "tool".to_string() } else { out }
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parallel_tool_calls: Option<bool>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct WireToolCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionCall<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunctionCall<'a> {
    name: String,
    arguments: &'a str,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunction<'a> {
    name: String,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

impl<'a> ChatRequest<'a> {
    pub(crate) fn build(model: &'a str, request: CompletionRequest<'a>, names: &ToolNames) -> Self {
        let mut messages = Vec::with_capacity(request.history.len() + 1);
        if !request.system_prompt.is_empty() {
            messages.push(WireMessage {
                role: Role::System.as_str(),
                content: Some(request.system_prompt),
                tool_calls: Vec::new(),
                tool_call_id: None,
            });
        }
        messages.extend(request.history.iter().map(|m| wire_message(m, names)));

        let tools: Vec<WireTool<'a>> = request
            .functions
            .iter()
            .map(|f| WireTool {
                kind: "function",
                function: WireFunction {
                    name: names.to_wire(&f.name),
                    description: &f.description,
                    parameters: &f.parameters,
                },
            })
            .collect();

        // Calls run one at a time, so ask for them that way.
        let (tool_choice, parallel_tool_calls) = match (tools.is_empty(), request.allow_tool_calls) {
            (true, _) => (None, None),
            (false, true) => (Some("auto"), Some(false)),
            (false, false) => (Some("none"), None),
        };

        Self {
            model,
            messages,
            temperature: request.temperature,
            tools,
            tool_choice,
            parallel_tool_calls,
        }
    }
}

fn wire_message<'a>(message: &'a ChatMessage, names: &ToolNames) -> WireMessage<'a> {
    WireMessage {
        role: message.role.as_str(),
        content: Some(message.content.as_str()).filter(|s| !s.is_empty()),
        tool_calls: message
            .tool_calls
            .iter()
            .map(|call| WireToolCall {
                id: &call.id,
                kind: "function",
                function: WireFunctionCall {
                    name: names.to_wire(&call.name),
                    arguments: &call.arguments,
                },
            })
            .collect(),
        tool_call_id: message.tool_call_id.as_deref(),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletion {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ChoiceToolCall>,
}

#[derive(Debug, Deserialize)]
struct ChoiceToolCall {
    id: String,
    function: ChoiceFunction,
}

#[derive(Debug, Deserialize)]
struct ChoiceFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl ChatCompletion {
    pub(crate) fn into_response(self, names: &ToolNames) -> Result<ChatResponse> {
        let Some(choice) = self.choices.into_iter().next() else {
            return Err(LlmError::ResponseFormat(
                "completion has no choices".to_string(),
            ));
        };
        let usage = self.usage.unwrap_or_default();

        let mut message = ChatMessage::assistant(choice.message.content.unwrap_or_default());
        message.tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|call| ToolCall {
                id: call.id,
                name: names.from_wire(call.function.name),
                arguments: call.function.arguments,
            })
            .collect();

        Ok(ChatResponse {
            message,
            usage: Usage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
            },
            finish_reason: choice
                .finish_reason
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }
}
