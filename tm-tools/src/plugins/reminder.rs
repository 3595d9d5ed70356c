use crate::error::{Result, ToolError};
use crate::plugin::{FunctionSpec, InvocationContext, Plugin, optional_id, require_id, require_string};
use crate::reminders::{NewReminder, ReminderService};
use crate::store::{Reminder, TodoStore};
use crate::time_args::TimeArguments;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

pub struct ReminderPlugin {
    reminders: ReminderService,
    todos: Arc<dyn TodoStore>,
    time: TimeArguments,
}

impl ReminderPlugin {
    pub fn new(reminders: ReminderService, todos: Arc<dyn TodoStore>, time: TimeArguments) -> Self {
        Self {
            reminders,
            todos,
            time,
        }
    }

    async fn create(&self, args: &serde_json::Value, ctx: &InvocationContext) -> Result<serde_json::Value> {
        let message = require_string(args, "message")?;
        let when = require_string(args, "when")?;
        let todo_id = optional_id(args, "todo_id")?;
        let fire_at = self.time.resolve(&when, ctx).await?;

        let todo = match todo_id {
            Some(id) => match self.todos.get(id).await? {
                Some(todo) if todo.owner == ctx.owner => Some(todo),
                _ => return Err(ToolError::NotFound(format!("to-do {id}"))),
            },
            None => None,
        };

        let reminder = self
            .reminders
            .create(
                NewReminder {
                    owner: ctx.owner.clone(),
                    message,
                    fire_at,
                    todo_id,
                },
                ctx.now,
                &ctx.cancel,
            )
            .await?;
        if let Some(mut todo) = todo {
            todo.reminder_ids.push(reminder.id);
            todo.updated_at = ctx.now;
            self.todos.update(todo).await?;
        }
        Ok(json!({ "reminder": reminder }))
    }

    async fn detach_from_todo(&self, ctx: &InvocationContext, reminder: &Reminder) -> Result<()> {
        let Some(todo_id) = reminder.todo_id else {
            return Ok(());
        };
        if let Some(mut todo) = self.todos.get(todo_id).await? {
            todo.reminder_ids.retain(|id| *id != reminder.id);
            todo.updated_at = ctx.now;
            self.todos.update(todo).await?;
        }
        Ok(())
    }

    async fn delete(&self, args: &serde_json::Value, ctx: &InvocationContext) -> Result<serde_json::Value> {
        let id = require_id(args, "reminder_id")?;
        let removal = self.reminders.remove(&ctx.owner, id, &ctx.cancel).await?;
        self.detach_from_todo(ctx, &removal.reminder).await?;
        Ok(json!({
            "deleted": id,
            "job_cleaned_up": removal.job.is_some(),
        }))
    }

    async fn unlink(&self, args: &serde_json::Value, ctx: &InvocationContext) -> Result<serde_json::Value> {
        let id = require_id(args, "reminder_id")?;
        let existing = self.reminders.get_owned(&ctx.owner, id).await?;
        if existing.todo_id.is_none() {
            return Ok(json!({ "reminder": existing, "already_unlinked": true }));
        }
        self.detach_from_todo(ctx, &existing).await?;
        let reminder = self.reminders.unlink(&ctx.owner, id).await?;
        Ok(json!({ "reminder": reminder }))
    }

    async fn list(&self, ctx: &InvocationContext) -> Result<serde_json::Value> {
        let reminders: Vec<Reminder> = self
            .reminders
            .list(&ctx.owner)
            .await?
            .into_iter()
            .filter(|r| r.fire_at >= ctx.now)
            .collect();
        Ok(json!({ "count": reminders.len(), "reminders": reminders }))
    }
}

fn reminder_id_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": { "reminder_id": { "type": "string" } },
        "required": ["reminder_id"]
    })
}

#[async_trait]
impl Plugin for ReminderPlugin {
    fn name(&self) -> &'static str {
        "reminder"
    }

    fn functions(&self) -> Vec<FunctionSpec> {
        vec![
            FunctionSpec::new(
                "create_reminder",
                "Remind the user of something at a given time, optionally tied to a to-do.",
                json!({
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {
                        "message": { "type": "string" },
                        "when": {
                            "type": "string",
                            "description": "Natural time such as \"in 10 minutes\" or \"next monday at 9am\"."
                        },
                        "todo_id": { "type": "string" }
                    },
                    "required": ["message", "when"]
                }),
            ),
            FunctionSpec::new("delete_reminder", "Delete a reminder.", reminder_id_schema()),
            FunctionSpec::new(
                "unlink_reminder",
                "Detach a reminder from its to-do without deleting it.",
                reminder_id_schema(),
            ),
            FunctionSpec::new(
                "list_reminders",
                "List upcoming reminders.",
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
            "create_reminder" => self.create(&arguments, ctx).await,
            "delete_reminder" => self.delete(&arguments, ctx).await,
            "unlink_reminder" => self.unlink(&arguments, ctx).await,
            "list_reminders" => self.list(ctx).await,
            other => Err(ToolError::UnknownFunction(format!("reminder.{other}"))),
        }
    }
}
