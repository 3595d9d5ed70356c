use crate::error::{Result, ToolError};
use crate::plugin::{FunctionSpec, InvocationContext, Plugin, require_string};
use crate::store::{Person, PersonStore};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

pub struct PersonPlugin {
    people: Arc<dyn PersonStore>,
}

impl PersonPlugin {
    pub fn new(people: Arc<dyn PersonStore>) -> Self {
        Self { people }
    }
}

#[async_trait]
impl Plugin for PersonPlugin {
    fn name(&self) -> &'static str {
        "person"
    }

    fn functions(&self) -> Vec<FunctionSpec> {
        vec![
            FunctionSpec::new(
                "set_timezone",
                "Store the user's time zone. Only call this after the user stated it.",
                json!({
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {
                        "timezone": {
                            "type": "string",
                            "description": "IANA zone name, e.g. America/New_York."
                        }
                    },
                    "required": ["timezone"]
                }),
            ),
            FunctionSpec::new(
                "get_timezone",
                "Read the user's stored time zone.",
                json!({ "type": "object", "additionalProperties": false, "properties": {} }),
            ),
        ]
    }

    #[tracing::instrument(level = "info", skip_all, fields(function = %function))]
    async fn invoke(
        &self,
        function: &str,
        arguments: serde_json::Value,
        ctx: &InvocationContext,
    ) -> Result<serde_json::Value> {
        match function {
            "set_timezone" => {
                let raw = require_string(&arguments, "timezone")?;
                let zone = tm_time::parse_zone(Some(&raw))
                    .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
                let person = self
                    .people
                    .upsert(Person {
                        id: ctx.owner.clone(),
                        timezone: Some(zone.name().to_string()),
                    })
                    .await?;
                Ok(json!({ "person": person }))
            }
            "get_timezone" => {
                let stored = self.people.get(&ctx.owner).await?.and_then(|p| p.timezone);
                Ok(json!({ "timezone": stored, "session_default": ctx.timezone }))
            }
            other => Err(ToolError::UnknownFunction(format!("person.{other}"))),
        }
    }
}
