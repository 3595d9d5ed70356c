//! Per-turn tool-call gate.
//!
//! Every call the LLM asks for in a turn passes through [`ToolCallGate::evaluate`]
//! in order: termination, loop detection, call budget, mutation ordering.
//! A fresh gate is built for each turn and never shared.

use crate::config::GateConfig;
use serde::Serialize;

/// Successful creates that arm the mutation-ordering rule.
const CREATE_FUNCTIONS: &[&str] = &["create_todo", "create_reminder"];

/// Blocked for the rest of the turn once something was created.
const GUARDED_MUTATIONS: &[&str] = &[
    "complete_todo",
    "delete_todo",
    "delete_reminder",
    "unlink_reminder",
];

pub const CALL_LIMIT_REASON: &str = "call limit reached";

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub plugin_name: String,
    pub function_name: String,
    pub arguments: serde_json::Value,
}

impl ToolCallRequest {
    pub fn new(
        plugin_name: impl Into<String>,
        function_name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            function_name: function_name.into(),
            arguments,
        }
    }

    pub fn call_key(&self) -> String {
        format!("{}.{}", self.plugin_name, self.function_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallOutcome {
    pub plugin_name: String,
    pub function_name: String,
    pub success: bool,
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCallOutcome {
    pub fn succeeded(request: &ToolCallRequest, result: serde_json::Value) -> Self {
        Self {
            plugin_name: request.plugin_name.clone(),
            function_name: request.function_name.clone(),
            success: true,
            blocked: false,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(request: &ToolCallRequest, error: impl Into<String>) -> Self {
        Self {
            plugin_name: request.plugin_name.clone(),
            function_name: request.function_name.clone(),
            success: false,
            blocked: false,
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn blocked(request: &ToolCallRequest, reason: impl Into<String>) -> Self {
        Self {
            plugin_name: request.plugin_name.clone(),
            function_name: request.function_name.clone(),
            success: false,
            blocked: true,
            result: None,
            error: Some(reason.into()),
        }
    }

    pub fn call_key(&self) -> String {
        format!("{}.{}", self.plugin_name, self.function_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Approve,
    Block(String),
    /// Stop the turn; whatever was recorded so far is the result.
    Terminate(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateState {
    /// Approved calls that ran, successful or not.
    pub call_count: usize,
    pub limit_reached: bool,
    pub last_call_key: Option<String>,
    /// Repeats of `last_call_key` after its first occurrence.
    pub consecutive_repeats: usize,
    pub created_mutable_entity: bool,
    pub terminated: bool,
}

#[derive(Debug)]
pub struct ToolCallGate {
    config: GateConfig,
    state: GateState,
    outcomes: Vec<ToolCallOutcome>,
}

impl ToolCallGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            state: GateState::default(),
            outcomes: Vec::new(),
        }
    }

    pub fn evaluate(&mut self, request: &ToolCallRequest) -> GateDecision {
        let call_key = request.call_key();

        if self.state.terminated {
            return GateDecision::Terminate("turn already terminated".to_string());
        }

        if let Some(reason) = self.note_repeat(&call_key) {
            return GateDecision::Terminate(reason);
        }

        if self.state.call_count >= self.config.max_calls_per_turn {
            if !self.state.limit_reached {
                self.state.limit_reached = true;
                self.outcomes
                    .push(ToolCallOutcome::blocked(request, CALL_LIMIT_REASON));
                tracing::warn!(
                    call_key = %call_key,
                    max_calls_per_turn = self.config.max_calls_per_turn,
                    "tool call budget exhausted"
                );
            }
            return GateDecision::Block(format!(
                "{CALL_LIMIT_REASON}: at most {} calls per turn",
                self.config.max_calls_per_turn
            ));
        }

        if self.state.created_mutable_entity
            && GUARDED_MUTATIONS.contains(&request.function_name.as_str())
        {
            let reason = format!(
                "{call_key} is not allowed after creating something in the same turn; confirm with the user first"
            );
            self.outcomes.push(ToolCallOutcome::blocked(request, reason.clone()));
            tracing::info!(call_key = %call_key, "mutation blocked after create");
            return GateDecision::Block(reason);
        }

        GateDecision::Approve
    }

    /// Called after an approved call ran.
    pub fn record(&mut self, outcome: ToolCallOutcome) {
        self.state.call_count += 1;
        if outcome.success && CREATE_FUNCTIONS.contains(&outcome.function_name.as_str()) {
            self.state.created_mutable_entity = true;
        }
        self.outcomes.push(outcome);
    }

    /// Records a call refused before it reached the gate. It does not count
    /// against the budget but does count as a repeat, so the same invalid
    /// call asked for again and again still ends the turn.
    pub fn record_blocked(&mut self, outcome: ToolCallOutcome) -> GateDecision {
        debug_assert!(outcome.blocked);
        if self.state.terminated {
            return GateDecision::Terminate("turn already terminated".to_string());
        }
        if let Some(reason) = self.note_repeat(&outcome.call_key()) {
            return GateDecision::Terminate(reason);
        }
        let reason = outcome.error.clone().unwrap_or_default();
        self.outcomes.push(outcome);
        GateDecision::Block(reason)
    }

    /// Tracks consecutive requests for the same call key; returns the
    /// termination reason once the limit is hit.
    fn note_repeat(&mut self, call_key: &str) -> Option<String> {
        if self.state.last_call_key.as_deref() == Some(call_key) {
            self.state.consecutive_repeats += 1;
        } else {
            self.state.last_call_key = Some(call_key.to_string());
            self.state.consecutive_repeats = 0;
        }
        if self.state.consecutive_repeats + 1 < self.config.max_identical_calls {
            return None;
        }
        self.state.terminated = true;
        let reason = format!(
            "{call_key} requested {} times in a row",
            self.state.consecutive_repeats + 1
        );
        tracing::warn!(call_key = %call_key, reason = %reason, "tool call loop detected");
        Some(reason)
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    pub fn outcomes(&self) -> &[ToolCallOutcome] {
        &self.outcomes
    }

    pub fn into_outcomes(self) -> Vec<ToolCallOutcome> {
        self.outcomes
    }
}
