//! Turn orchestrator: LLM rounds, batch validation, the tool-call gate and
//! sequential execution against the function registry.

use crate::config::{AgentConfig, GateConfig, TaskmateConfig};
use crate::gate::{GateDecision, ToolCallGate, ToolCallOutcome, ToolCallRequest};
use crate::plan::{PlannedCall, validate_plan};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tm_llm::{ChatMessage, ChatResponse, CompletionRequest, LlmError, LlmProvider, ToolDefinition, Usage};
use tm_tools::{FunctionRegistry, InvocationContext, ToolError};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("user message must not be empty")]
    EmptyMessage,

    #[error("llm call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("turn cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The LLM answered without requesting more calls.
    Completed,
    /// The same call kept repeating; the turn stopped early.
    LoopDetected,
    /// The per-turn budget ran out and the LLM was asked to wrap up.
    CallLimit,
    /// Rounds ran out and the LLM was asked to wrap up.
    RoundLimit,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnReply {
    pub final_reply: String,
    pub actions_taken: Vec<ToolCallOutcome>,
    pub stop_reason: StopReason,
    pub rounds: usize,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

pub struct AssistantAgent {
    llm: Arc<dyn LlmProvider>,
    system_prompt: String,
    temperature: f32,
    gate: GateConfig,
    agent: AgentConfig,
}

impl AssistantAgent {
    pub fn new(cfg: &TaskmateConfig, llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            system_prompt: cfg.general.system_prompt.clone(),
            temperature: cfg.general.temperature,
            gate: cfg.gate,
            agent: cfg.agent,
        }
    }

    /// Runs one turn. `history` receives the user message, every
    /// intermediate tool exchange and the final reply.
    #[tracing::instrument(level = "info", skip_all, fields(owner = %owner))]
    pub async fn run_turn(
        &self,
        user_message: &str,
        history: &mut Vec<ChatMessage>,
        registry: &FunctionRegistry,
        owner: &str,
        timezone: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<TurnReply, AgentError> {
        if user_message.trim().is_empty() {
            return Err(AgentError::EmptyMessage);
        }
        let tool_defs = registry.tool_definitions();
        tracing::info!(
            model = %self.llm.model(),
            prior_history_messages = history.len(),
            functions_registered = tool_defs.len(),
            "assistant turn started"
        );
        history.push(ChatMessage::user(user_message));

        let ctx = InvocationContext {
            owner: owner.to_string(),
            timezone: timezone.map(str::to_string),
            now: Utc::now(),
            cancel: cancel.clone(),
        };
        let mut gate = ToolCallGate::new(self.gate);
        let mut usage = Usage::default();
        let mut rounds = 0usize;

        loop {
            if rounds >= self.agent.max_rounds {
                tracing::warn!(max_rounds = self.agent.max_rounds, "assistant round limit reached");
                return self
                    .wrap_up(history, &tool_defs, gate, usage, rounds, StopReason::RoundLimit, cancel)
                    .await;
            }
            rounds += 1;
            let allow_tool_calls = !gate.state().limit_reached;

            let response = self
                .complete(history, &tool_defs, allow_tool_calls, rounds, cancel)
                .await?;
            usage.prompt_tokens += response.usage.prompt_tokens;
            usage.completion_tokens += response.usage.completion_tokens;

            if response.message.tool_calls.is_empty() || !allow_tool_calls {
                let content = response.message.content.clone();
                history.push(ChatMessage::assistant(content.clone()));
                let stop_reason = if gate.state().limit_reached {
                    StopReason::CallLimit
                } else {
                    StopReason::Completed
                };
                tracing::info!(
                    rounds,
                    stop_reason = ?stop_reason,
                    actions = gate.outcomes().len(),
                    response_len = content.len(),
                    "assistant turn completed"
                );
                return Ok(finish(content, gate, stop_reason, rounds, usage));
            }

            let tool_calls = response.message.tool_calls.clone();
            history.push(response.message);
            tracing::info!(
                tool_calls = tool_calls.len(),
                "assistant received tool calls from llm"
            );

            let plan = validate_plan(&tool_calls, registry, history, self.agent.history_window);
            let mut approved: HashMap<String, PlannedCall> = plan
                .approved
                .into_iter()
                .map(|c| (c.tool_call_id.clone(), c))
                .collect();
            let mut blocked: HashMap<String, _> = plan
                .blocked
                .into_iter()
                .map(|c| (c.tool_call_id.clone(), c))
                .collect();

            let mut terminated: Option<String> = None;
            for tool_call in &tool_calls {
                if let Some(reason) = &terminated {
                    history.push(tool_error(&tool_call.id, format!("not run: {reason}")));
                    continue;
                }

                if let Some(rejected) = blocked.remove(&tool_call.id) {
                    let request = rejected.request.unwrap_or_else(|| {
                        ToolCallRequest::new("", rejected.wire_name.clone(), serde_json::Value::Null)
                    });
                    let outcome = ToolCallOutcome::blocked(&request, rejected.reason.clone());
                    if let GateDecision::Terminate(reason) = gate.record_blocked(outcome) {
                        history.push(tool_error(&tool_call.id, reason.clone()));
                        terminated = Some(reason);
                        continue;
                    }
                    history.push(tool_error(&tool_call.id, rejected.reason));
                    continue;
                }
                let Some(planned) = approved.remove(&tool_call.id) else {
                    // Duplicate id in one batch.
                    history.push(tool_error(&tool_call.id, "duplicate tool call id".to_string()));
                    continue;
                };

                match gate.evaluate(&planned.request) {
                    GateDecision::Approve => {
                        let (outcome, content) = self.execute(&planned, registry, &ctx).await?;
                        gate.record(outcome);
                        history.push(ChatMessage::tool_result(&tool_call.id, content));
                    }
                    GateDecision::Block(reason) => {
                        tracing::info!(
                            tool_call_id = %tool_call.id,
                            call_key = %planned.request.call_key(),
                            reason = %reason,
                            "tool call blocked by gate"
                        );
                        history.push(tool_error(&tool_call.id, reason));
                    }
                    GateDecision::Terminate(reason) => {
                        history.push(tool_error(&tool_call.id, reason.clone()));
                        terminated = Some(reason);
                    }
                }
            }

            if let Some(reason) = terminated {
                let reply = loop_stop_reply(gate.outcomes());
                history.push(ChatMessage::assistant(reply.clone()));
                tracing::warn!(
                    rounds,
                    reason = %reason,
                    actions = gate.outcomes().len(),
                    "assistant turn stopped by loop detection"
                );
                return Ok(finish(reply, gate, StopReason::LoopDetected, rounds, usage));
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn wrap_up(
        &self,
        history: &mut Vec<ChatMessage>,
        tool_defs: &[ToolDefinition],
        gate: ToolCallGate,
        mut usage: Usage,
        rounds: usize,
        stop_reason: StopReason,
        cancel: &CancellationToken,
    ) -> Result<TurnReply, AgentError> {
        let response = self
            .complete(history, tool_defs, false, rounds + 1, cancel)
            .await?;
        usage.prompt_tokens += response.usage.prompt_tokens;
        usage.completion_tokens += response.usage.completion_tokens;
        let content = response.message.content;
        history.push(ChatMessage::assistant(content.clone()));
        Ok(finish(content, gate, stop_reason, rounds + 1, usage))
    }

    async fn complete(
        &self,
        history: &[ChatMessage],
        tool_defs: &[ToolDefinition],
        allow_tool_calls: bool,
        round: usize,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, AgentError> {
        let request = CompletionRequest {
            system_prompt: &self.system_prompt,
            history,
            functions: tool_defs,
            temperature: self.temperature,
            allow_tool_calls,
        };
        let started = Instant::now();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            response = self.llm.complete(request) => response?,
        };
        tracing::info!(
            round,
            allow_tool_calls,
            latency_ms = started.elapsed().as_millis() as u64,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            tool_calls = response.message.tool_calls.len(),
            finish_reason = %response.finish_reason,
            "assistant llm call completed"
        );
        Ok(response)
    }

    async fn execute(
        &self,
        planned: &PlannedCall,
        registry: &FunctionRegistry,
        ctx: &InvocationContext,
    ) -> Result<(ToolCallOutcome, String), AgentError> {
        let request = &planned.request;
        let started = Instant::now();
        let result = registry
            .invoke(
                &request.plugin_name,
                &request.function_name,
                request.arguments.clone(),
                ctx,
            )
            .await;
        let latency_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(value) => {
                let content = value.to_string();
                tracing::info!(
                    tool_call_id = %planned.tool_call_id,
                    tool_name = %request.call_key(),
                    latency_ms,
                    output_len = content.len(),
                    output = %truncate_for_log(&content, self.agent.log_result_chars),
                    "tool call executed"
                );
                Ok((ToolCallOutcome::succeeded(request, value), content))
            }
            Err(ToolError::Cancelled) => Err(AgentError::Cancelled),
            Err(e) => {
                tracing::warn!(
                    tool_call_id = %planned.tool_call_id,
                    tool_name = %request.call_key(),
                    latency_ms,
                    error = %e,
                    "tool call failed"
                );
                let message = e.to_string();
                let content = json!({ "error": message }).to_string();
                Ok((ToolCallOutcome::failed(request, message), content))
            }
        }
    }
}

fn finish(
    final_reply: String,
    gate: ToolCallGate,
    stop_reason: StopReason,
    rounds: usize,
    usage: Usage,
) -> TurnReply {
    TurnReply {
        final_reply,
        actions_taken: gate.into_outcomes(),
        stop_reason,
        rounds,
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
    }
}

fn tool_error(tool_call_id: &str, error: String) -> ChatMessage {
    ChatMessage::tool_result(tool_call_id, json!({ "error": error }).to_string())
}

fn loop_stop_reply(outcomes: &[ToolCallOutcome]) -> String {
    let done: Vec<String> = outcomes
        .iter()
        .filter(|o| o.success)
        .map(ToolCallOutcome::call_key)
        .collect();
    if done.is_empty() {
        "I stopped because I kept repeating the same step without progress. Could you rephrase what you need?".to_string()
    } else {
        format!(
            "I stopped because I kept repeating the same step. Completed so far: {}.",
            done.join(", ")
        )
    }
}

fn truncate_for_log(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
