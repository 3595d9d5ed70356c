use crate::error::{Result, ToolError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema for the arguments object. Its `required` array is what the
    /// batch validator checks before dispatch.
    pub parameters_schema: serde_json::Value,
}

impl FunctionSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters_schema,
        }
    }

    pub fn required_arguments(&self) -> Vec<&str> {
        self.parameters_schema
            .get("required")
            .and_then(serde_json::Value::as_array)
            .map(|names| names.iter().filter_map(serde_json::Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// Per-call context supplied by the turn orchestrator.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    /// Person on whose behalf the turn runs.
    pub owner: String,
    /// Caller-provided zone; a zone stored on the person takes precedence.
    pub timezone: Option<String>,
    pub now: DateTime<Utc>,
    pub cancel: CancellationToken,
}

impl InvocationContext {
    pub fn new(owner: impl Into<String>, timezone: Option<String>) -> Self {
        Self {
            owner: owner.into(),
            timezone,
            now: Utc::now(),
            cancel: CancellationToken::new(),
        }
    }
}

/// A named group of functions the assistant may call as `plugin.function`.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;
    fn functions(&self) -> Vec<FunctionSpec>;
    async fn invoke(
        &self,
        function: &str,
        arguments: serde_json::Value,
        ctx: &InvocationContext,
    ) -> Result<serde_json::Value>;
}

pub(crate) fn require_string(args: &serde_json::Value, key: &str) -> Result<String> {
    let Some(v) = args.get(key) else {
        return Err(ToolError::InvalidArguments(format!("missing key: {key}")));
    };
    match v {
        serde_json::Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        serde_json::Value::String(_) => Err(ToolError::InvalidArguments(format!(
            "key {key} must not be empty"
        ))),
        other => Err(ToolError::InvalidArguments(format!(
            "key {key} must be string, got {other:?}"
        ))),
    }
}

pub(crate) fn optional_string(args: &serde_json::Value, key: &str) -> Result<Option<String>> {
    let Some(v) = args.get(key) else {
        return Ok(None);
    };
    match v {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) if s.trim().is_empty() => Ok(None),
        serde_json::Value::String(s) => Ok(Some(s.trim().to_string())),
        other => Err(ToolError::InvalidArguments(format!(
            "key {key} must be string, got {other:?}"
        ))),
    }
}

pub(crate) fn optional_bool(args: &serde_json::Value, key: &str) -> Result<Option<bool>> {
    match args.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(ToolError::InvalidArguments(format!(
            "key {key} must be boolean, got {other:?}"
        ))),
    }
}

pub(crate) fn require_id(args: &serde_json::Value, key: &str) -> Result<Uuid> {
    let raw = require_string(args, key)?;
    Uuid::parse_str(&raw)
        .map_err(|_| ToolError::InvalidArguments(format!("key {key} is not a valid id: {raw}")))
}

pub(crate) fn optional_id(args: &serde_json::Value, key: &str) -> Result<Option<Uuid>> {
    optional_string(args, key)?
        .map(|raw| {
            Uuid::parse_str(&raw).map_err(|_| {
                ToolError::InvalidArguments(format!("key {key} is not a valid id: {raw}"))
            })
        })
        .transpose()
}
