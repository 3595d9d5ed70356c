use crate::error::{Result, ToolError};
use crate::plugin::{
    FunctionSpec, InvocationContext, Plugin, optional_bool, optional_string, require_id,
    require_string,
};
use crate::reminders::{NewReminder, ReminderService};
use crate::store::{Todo, TodoStore};
use crate::time_args::TimeArguments;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

pub const REMINDER_NOT_SCHEDULED: &str = "to-do created, but reminder could not be scheduled";

pub struct TodoPlugin {
    todos: Arc<dyn TodoStore>,
    reminders: ReminderService,
    time: TimeArguments,
}

impl TodoPlugin {
    pub fn new(todos: Arc<dyn TodoStore>, reminders: ReminderService, time: TimeArguments) -> Self {
        Self {
            todos,
            reminders,
            time,
        }
    }

    async fn owned(&self, ctx: &InvocationContext, id: Uuid) -> Result<Todo> {
        match self.todos.get(id).await? {
            Some(todo) if todo.owner == ctx.owner => Ok(todo),
            _ => Err(ToolError::NotFound(format!("to-do {id}"))),
        }
    }

    async fn create(&self, args: &serde_json::Value, ctx: &InvocationContext) -> Result<serde_json::Value> {
        let title = require_string(args, "title")?;
        let notes = optional_string(args, "notes")?;
        let due = optional_string(args, "due")?;
        let remind_at = optional_string(args, "remind_at")?;

        // Resolve every time before writing anything.
        let due_at = match &due {
            Some(expr) => Some(self.time.resolve(expr, ctx).await?),
            None => None,
        };
        let remind_at = match &remind_at {
            Some(expr) => Some(self.time.resolve(expr, ctx).await?),
            None => None,
        };

        let mut todo = Todo::new(&ctx.owner, title, ctx.now);
        todo.notes = notes;
        todo.due_at = due_at;
        let mut todo = self.todos.create(todo).await?;
        tracing::info!(todo_id = %todo.id, "to-do created");

        let Some(fire_at) = remind_at else {
            return Ok(json!({ "todo": todo }));
        };
        let scheduled = self
            .reminders
            .create(
                NewReminder {
                    owner: ctx.owner.clone(),
                    message: todo.title.clone(),
                    fire_at,
                    todo_id: Some(todo.id),
                },
                ctx.now,
                &ctx.cancel,
            )
            .await;
        match scheduled {
            Ok(reminder) => {
                todo.reminder_ids.push(reminder.id);
                todo.updated_at = ctx.now;
                let todo = self.todos.update(todo).await?;
                Ok(json!({ "todo": todo, "reminder": reminder }))
            }
            Err(e) => {
                tracing::warn!(todo_id = %todo.id, error = %e, "{REMINDER_NOT_SCHEDULED}");
                Ok(json!({
                    "todo": todo,
                    "reminder": null,
                    "warning": REMINDER_NOT_SCHEDULED,
                    "reminder_error": e.to_string(),
                }))
            }
        }
    }

    async fn update(&self, args: &serde_json::Value, ctx: &InvocationContext) -> Result<serde_json::Value> {
        let id = require_id(args, "todo_id")?;
        let mut todo = self.owned(ctx, id).await?;
        let title = optional_string(args, "title")?;
        let notes = optional_string(args, "notes")?;
        let due = optional_string(args, "due")?;
        if title.is_none() && notes.is_none() && due.is_none() {
            return Err(ToolError::InvalidArguments(
                "nothing to update: pass title, notes or due".to_string(),
            ));
        }
        if let Some(expr) = due {
            todo.due_at = Some(self.time.resolve(&expr, ctx).await?);
        }
        if let Some(title) = title {
            todo.title = title;
        }
        if notes.is_some() {
            todo.notes = notes;
        }
        todo.updated_at = ctx.now;
        let todo = self.todos.update(todo).await?;
        Ok(json!({ "todo": todo }))
    }

    async fn drop_reminders(&self, ctx: &InvocationContext, todo: &Todo) -> Result<usize> {
        let mut removed = 0;
        for reminder_id in &todo.reminder_ids {
            match self.reminders.remove(&ctx.owner, *reminder_id, &ctx.cancel).await {
                Ok(_) => removed += 1,
                // Already removed or unlinked elsewhere.
                Err(ToolError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(removed)
    }

    async fn complete(&self, args: &serde_json::Value, ctx: &InvocationContext) -> Result<serde_json::Value> {
        let id = require_id(args, "todo_id")?;
        let mut todo = self.owned(ctx, id).await?;
        if todo.completed {
            return Ok(json!({ "todo": todo, "already_completed": true }));
        }
        let reminders_removed = self.drop_reminders(ctx, &todo).await?;
        todo.completed = true;
        todo.reminder_ids.clear();
        todo.updated_at = ctx.now;
        let todo = self.todos.update(todo).await?;
        Ok(json!({ "todo": todo, "reminders_removed": reminders_removed }))
    }

    async fn delete(&self, args: &serde_json::Value, ctx: &InvocationContext) -> Result<serde_json::Value> {
        let id = require_id(args, "todo_id")?;
        let todo = self.owned(ctx, id).await?;
        let reminders_removed = self.drop_reminders(ctx, &todo).await?;
        self.todos.delete(id).await?;
        Ok(json!({ "deleted": id, "reminders_removed": reminders_removed }))
    }

    async fn list(&self, args: &serde_json::Value, ctx: &InvocationContext) -> Result<serde_json::Value> {
        let include_completed = optional_bool(args, "include_completed")?.unwrap_or(false);
        let todos: Vec<Todo> = self
            .todos
            .list(&ctx.owner)
            .await?
            .into_iter()
            .filter(|t| include_completed || !t.completed)
            .collect();
        Ok(json!({ "count": todos.len(), "todos": todos }))
    }
}

#[async_trait]
impl Plugin for TodoPlugin {
    fn name(&self) -> &'static str {
        "todo"
    }

    fn functions(&self) -> Vec<FunctionSpec> {
        let id = json!({ "type": "string", "description": "Id of an existing to-do." });
        let time = json!({
            "type": "string",
            "description": "Natural time such as \"in 2 hours\", \"tomorrow at 9am\", \"friday\" or an ISO timestamp."
        });
        vec![
            FunctionSpec::new(
                "create_todo",
                "Create a to-do, optionally with a due time and a reminder.",
                json!({
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {
                        "title": { "type": "string" },
                        "notes": { "type": "string" },
                        "due": time,
                        "remind_at": time
                    },
                    "required": ["title"]
                }),
            ),
            FunctionSpec::new(
                "update_todo",
                "Change the title, notes or due time of a to-do.",
                json!({
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {
                        "todo_id": id,
                        "title": { "type": "string" },
                        "notes": { "type": "string" },
                        "due": time
                    },
                    "required": ["todo_id"]
                }),
            ),
            FunctionSpec::new(
                "complete_todo",
                "Mark a to-do as done and drop its reminders.",
                json!({
                    "type": "object",
                    "additionalProperties": false,
                    "properties": { "todo_id": id },
                    "required": ["todo_id"]
                }),
            ),
            FunctionSpec::new(
                "delete_todo",
                "Delete a to-do and its reminders.",
                json!({
                    "type": "object",
                    "additionalProperties": false,
                    "properties": { "todo_id": id },
                    "required": ["todo_id"]
                }),
            ),
            FunctionSpec::new(
                "list_todos",
                "List the user's to-dos.",
                json!({
                    "type": "object",
                    "additionalProperties": false,
                    "properties": { "include_completed": { "type": "boolean" } }
                }),
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
            "create_todo" => self.create(&arguments, ctx).await,
            "update_todo" => self.update(&arguments, ctx).await,
            "complete_todo" => self.complete(&arguments, ctx).await,
            "delete_todo" => self.delete(&arguments, ctx).await,
            "list_todos" => self.list(&arguments, ctx).await,
            other => Err(ToolError::UnknownFunction(format!("todo.{other}"))),
        }
    }
}
