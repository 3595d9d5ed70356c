//! Batch validation of the calls the LLM requested in one round.
//!
//! Runs before any call in the batch reaches the gate and partitions the
//! batch into approved and blocked calls.

use crate::gate::ToolCallRequest;
use regex::Regex;
use std::sync::LazyLock;
use tm_llm::{ChatMessage, Role, ToolCall};
use tm_tools::{FunctionRegistry, split_wire_name};

const SET_TIMEZONE: &str = "set_timezone";

static IANA_ZONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:Africa|America|Antarctica|Asia|Atlantic|Australia|Europe|Indian|Pacific|Etc)/[A-Za-z0-9_+\-]+(?:/[A-Za-z0-9_+\-]+)?\b")
        .expect("iana zone regex")
});

static UTC_OFFSET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:utc|gmt)\s*(?:[+-]\s*\d{1,2}(?::?\d{2})?)?\b").expect("utc offset regex")
});

static ZONE_ABBREVIATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:EST|EDT|CST|CDT|MST|MDT|PST|PDT|AKST|HST|BST|CET|CEST|EET|EEST|WET|IST|JST|KST|AEST|AEDT|NZST|NZDT)\b")
        .expect("zone abbreviation regex")
});

static ZONE_WORDS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:time\s*zone|timezone|eastern|central|mountain|pacific)\b")
        .expect("zone words regex")
});

#[derive(Debug, Clone)]
pub struct PlannedCall {
    pub tool_call_id: String,
    pub request: ToolCallRequest,
}

#[derive(Debug, Clone)]
pub struct BlockedCall {
    pub tool_call_id: String,
    /// `None` when the wire name could not even be split.
    pub request: Option<ToolCallRequest>,
    pub wire_name: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct PlanValidation {
    pub approved: Vec<PlannedCall>,
    pub blocked: Vec<BlockedCall>,
}

/// `history` must already include the current user message.
pub fn validate_plan(
    calls: &[ToolCall],
    registry: &FunctionRegistry,
    history: &[ChatMessage],
    history_window: usize,
) -> PlanValidation {
    let mut plan = PlanValidation::default();
    for call in calls {
        match check_call(call, registry, history, history_window) {
            Ok(request) => plan.approved.push(PlannedCall {
                tool_call_id: call.id.clone(),
                request,
            }),
            Err((request, reason)) => {
                tracing::info!(
                    tool_call_id = %call.id,
                    tool_name = %call.name,
                    reason = %reason,
                    "tool call blocked by plan validation"
                );
                plan.blocked.push(BlockedCall {
                    tool_call_id: call.id.clone(),
                    request,
                    wire_name: call.name.clone(),
                    reason,
                });
            }
        }
    }
    plan
}

type Rejection = (Option<ToolCallRequest>, String);

fn check_call(
    call: &ToolCall,
    registry: &FunctionRegistry,
    history: &[ChatMessage],
    history_window: usize,
) -> Result<ToolCallRequest, Rejection> {
    let Some((plugin, function)) = split_wire_name(&call.name) else {
        return Err((None, format!("unknown function {}", call.name)));
    };
    let arguments = parse_arguments(&call.arguments);
    let request = ToolCallRequest::new(plugin, function, arguments.clone().unwrap_or_default());
    let reject = |reason: String| Err((Some(request.clone()), reason));

    let Some(spec) = registry.lookup(plugin, function) else {
        return reject(format!("unknown function {}", call.name));
    };
    let arguments = match arguments {
        Ok(arguments) => arguments,
        Err(reason) => return reject(reason),
    };

    let missing: Vec<&str> = spec
        .required_arguments()
        .into_iter()
        .filter(|name| arguments.get(*name).is_none_or(serde_json::Value::is_null))
        .collect();
    if !missing.is_empty() {
        return reject(format!(
            "missing required argument(s) for {}: {}",
            call.name,
            missing.join(", ")
        ));
    }

    if function == SET_TIMEZONE && !timezone_context_present(history, history_window) {
        return reject(
            "set_timezone needs the user to state their time zone first; ask them".to_string(),
        );
    }

    Ok(request)
}

fn parse_arguments(raw: &str) -> Result<serde_json::Value, String> {
    if raw.trim().is_empty() {
        return Ok(serde_json::Value::Object(Default::default()));
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value @ serde_json::Value::Object(_)) => Ok(value),
        Ok(other) => Err(format!("arguments must be a JSON object, got {other}")),
        Err(e) => Err(format!("arguments are not valid JSON: {e}")),
    }
}

/// Whether the assistant asked for a zone or the user volunteered one in
/// the last `window` messages.
pub fn timezone_context_present(history: &[ChatMessage], window: usize) -> bool {
    let start = history.len().saturating_sub(window);
    history[start..].iter().any(|message| match message.role {
        Role::Assistant => {
            ZONE_WORDS_RE.is_match(&message.content) && message.content.contains('?')
        }
        Role::User => mentions_zone(&message.content),
        Role::System | Role::Tool => false,
    })
}

fn mentions_zone(text: &str) -> bool {
    IANA_ZONE_RE.is_match(text)
        || UTC_OFFSET_RE.is_match(text)
        || ZONE_ABBREVIATION_RE.is_match(text)
        || ZONE_WORDS_RE.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tm_jobs::InMemoryJobBackend;
    use tm_tools::Toolbox;

    fn registry() -> FunctionRegistry {
        Toolbox::in_memory(Arc::new(InMemoryJobBackend::new()), "reminders")
            .registry()
            .expect("registry")
    }

    fn call(id: &str, name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    #[test]
    fn partitions_unknown_and_incomplete_calls() {
        let history = vec![ChatMessage::user("add milk to my list")];
        let calls = vec![
            call("1", "todo.create_todo", r#"{"title":"milk"}"#),
            call("2", "todo.archive_todo", r#"{"todo_id":"x"}"#),
            call("3", "todo.create_todo", r#"{"title":null}"#),
            call("4", "reminder.create_reminder", r#"{"message":"milk"}"#),
            call("5", "nodots", "{}"),
            call("6", "clock.get_date", ""),
        ];
        let plan = validate_plan(&calls, &registry(), &history, 6);

        let approved: Vec<_> = plan.approved.iter().map(|c| c.tool_call_id.as_str()).collect();
        assert_eq!(approved, vec!["1", "6"]);
        let blocked: Vec<_> = plan.blocked.iter().map(|c| c.tool_call_id.as_str()).collect();
        assert_eq!(blocked, vec!["2", "3", "4", "5"]);
        assert!(plan.blocked[0].reason.contains("unknown function"));
        assert!(plan.blocked[1].reason.contains("title"));
        assert!(plan.blocked[2].reason.contains("when"));
        assert!(plan.blocked[3].request.is_none());
    }

    #[test]
    fn set_timezone_requires_context() {
        let registry = registry();
        let set = vec![call("1", "person.set_timezone", r#"{"timezone":"Europe/Paris"}"#)];

        let cold = vec![ChatMessage::user("remind me to call mom at 5")];
        let plan = validate_plan(&set, &registry, &cold, 6);
        assert!(plan.approved.is_empty());
        assert!(plan.blocked[0].reason.contains("time zone"));

        let volunteered = vec![ChatMessage::user("I'm in Europe/Paris by the way")];
        assert_eq!(validate_plan(&set, &registry, &volunteered, 6).approved.len(), 1);

        let asked = vec![
            ChatMessage::user("remind me at 5"),
            ChatMessage::assistant("Sure. Which time zone are you in?"),
            ChatMessage::user("paris"),
        ];
        assert_eq!(validate_plan(&set, &registry, &asked, 6).approved.len(), 1);
    }

    #[test]
    fn context_outside_window_does_not_count() {
        let mut history = vec![ChatMessage::user("I live in America/Chicago")];
        for i in 0..6 {
            history.push(ChatMessage::assistant(format!("noted {i}")));
        }
        assert!(!timezone_context_present(&history, 6));
        assert!(timezone_context_present(&history, 7));
    }

    #[test]
    fn recognizes_offsets_and_abbreviations() {
        assert!(mentions_zone("I'm on UTC+2 this week"));
        assert!(mentions_zone("we use gmt-5"));
        assert!(mentions_zone("PST please"));
        assert!(!mentions_zone("best of luck"));
    }

    #[test]
    fn zone_names_with_digits_and_signs() {
        for (text, zone) in [
            ("I'm in America/Port-au-Prince", "America/Port-au-Prince"),
            ("set me to Etc/GMT+5 please", "Etc/GMT+5"),
            ("use Etc/GMT-14", "Etc/GMT-14"),
            ("America/Argentina/Buenos_Aires", "America/Argentina/Buenos_Aires"),
        ] {
            let found = IANA_ZONE_RE.find(text).map(|m| m.as_str());
            assert_eq!(found, Some(zone), "{text}");
        }
        let volunteered = vec![ChatMessage::user("I'm in America/Port-au-Prince")];
        assert!(timezone_context_present(&volunteered, 6));
    }
}
