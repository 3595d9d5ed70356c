use crate::error::{Result, ToolError};
use crate::plugin::{FunctionSpec, InvocationContext, Plugin};
use crate::time_args::TimeArguments;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::json;

pub struct ClockPlugin {
    time: TimeArguments,
}

impl ClockPlugin {
    pub fn new(time: TimeArguments) -> Self {
        Self { time }
    }

    async fn local_now(&self, ctx: &InvocationContext) -> Result<DateTime<Tz>> {
        let zone = self.time.zone_for(ctx).await?;
        let tz = tm_time::parse_zone(zone.as_deref())
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        Ok(ctx.now.with_timezone(&tz))
    }
}

#[async_trait]
impl Plugin for ClockPlugin {
    fn name(&self) -> &'static str {
        "clock"
    }

    fn functions(&self) -> Vec<FunctionSpec> {
        let empty = json!({ "type": "object", "additionalProperties": false, "properties": {} });
        vec![
            FunctionSpec::new("get_date", "Today's date in the user's time zone.", empty.clone()),
            FunctionSpec::new("get_time", "The current time in the user's time zone.", empty),
        ]
    }

    async fn invoke(
        &self,
        function: &str,
        _arguments: serde_json::Value,
        ctx: &InvocationContext,
    ) -> Result<serde_json::Value> {
        let now = self.local_now(ctx).await?;
        match function {
            "get_date" => Ok(json!({
                "date": now.format("%Y-%m-%d").to_string(),
                "weekday": now.format("%A").to_string(),
                "timezone": now.timezone().name(),
            })),
            "get_time" => Ok(json!({
                "time": now.format("%H:%M").to_string(),
                "iso": now.to_rfc3339(),
                "utc": ctx.now.with_timezone(&Utc).to_rfc3339(),
                "timezone": now.timezone().name(),
            })),
            other => Err(ToolError::UnknownFunction(format!("clock.{other}"))),
        }
    }
}
