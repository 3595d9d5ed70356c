//! Domain records and the storage seams behind the plugins.
//!
//! The stores are external collaborators; the in-memory implementations
//! back the CLI and the tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tm_jobs::{JobId, JobReferences};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: Uuid,
    pub owner: String,
    pub title: String,
    pub notes: Option<String>,
    pub due_at: Option<DateTime<Utc>>,
    pub completed: bool,
    pub reminder_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Todo {
    pub fn new(owner: impl Into<String>, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: owner.into(),
            title: title.into(),
            notes: None,
            due_at: None,
            completed: false,
            reminder_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: Uuid,
    pub owner: String,
    pub message: String,
    pub fire_at: DateTime<Utc>,
    pub job_id: JobId,
    pub todo_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: String,
    pub timezone: Option<String>,
}

#[async_trait]
pub trait TodoStore: Send + Sync {
    async fn create(&self, todo: Todo) -> Result<Todo>;
    async fn get(&self, id: Uuid) -> Result<Option<Todo>>;
    async fn update(&self, todo: Todo) -> Result<Todo>;
    async fn delete(&self, id: Uuid) -> Result<bool>;
    async fn list(&self, owner: &str) -> Result<Vec<Todo>>;
}

#[async_trait]
pub trait ReminderStore: Send + Sync {
    async fn create(&self, reminder: Reminder) -> Result<Reminder>;
    async fn get(&self, id: Uuid) -> Result<Option<Reminder>>;
    async fn update(&self, reminder: Reminder) -> Result<Reminder>;
    async fn delete(&self, id: Uuid) -> Result<bool>;
    async fn list(&self, owner: &str) -> Result<Vec<Reminder>>;
    /// Every reminder, of any owner, sharing the bucket job.
    async fn get_by_job_id(&self, job_id: &JobId) -> Result<Vec<Reminder>>;
}

#[async_trait]
pub trait PersonStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Person>>;
    async fn upsert(&self, person: Person) -> Result<Person>;
}

/// Counts bucket-job references straight from the reminder store.
#[derive(Clone)]
pub struct ReminderReferences {
    store: Arc<dyn ReminderStore>,
}

impl ReminderReferences {
    pub fn new(store: Arc<dyn ReminderStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl JobReferences for ReminderReferences {
    async fn reference_count(&self, job_id: &JobId) -> Result<usize> {
        Ok(self.store.get_by_job_id(job_id).await?.len())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTodoStore {
    todos: DashMap<Uuid, Todo>,
}

impl InMemoryTodoStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TodoStore for InMemoryTodoStore {
    async fn create(&self, todo: Todo) -> Result<Todo> {
        self.todos.insert(todo.id, todo.clone());
        Ok(todo)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Todo>> {
        Ok(self.todos.get(&id).map(|t| t.value().clone()))
    }

    async fn update(&self, todo: Todo) -> Result<Todo> {
        let Some(mut slot) = self.todos.get_mut(&todo.id) else {
            anyhow::bail!("to-do {} does not exist", todo.id);
        };
        *slot = todo.clone();
        Ok(todo)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.todos.remove(&id).is_some())
    }

    async fn list(&self, owner: &str) -> Result<Vec<Todo>> {
        let mut todos: Vec<Todo> = self
            .todos
            .iter()
            .filter(|t| t.owner == owner)
            .map(|t| t.value().clone())
            .collect();
        todos.sort_by_key(|t| t.created_at);
        Ok(todos)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryReminderStore {
    reminders: DashMap<Uuid, Reminder>,
}

impl InMemoryReminderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReminderStore for InMemoryReminderStore {
    async fn create(&self, reminder: Reminder) -> Result<Reminder> {
        self.reminders.insert(reminder.id, reminder.clone());
        Ok(reminder)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Reminder>> {
        Ok(self.reminders.get(&id).map(|r| r.value().clone()))
    }

    async fn update(&self, reminder: Reminder) -> Result<Reminder> {
        let Some(mut slot) = self.reminders.get_mut(&reminder.id) else {
            anyhow::bail!("reminder {} does not exist", reminder.id);
        };
        *slot = reminder.clone();
        Ok(reminder)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.reminders.remove(&id).is_some())
    }

    async fn list(&self, owner: &str) -> Result<Vec<Reminder>> {
        let mut reminders: Vec<Reminder> = self
            .reminders
            .iter()
            .filter(|r| r.owner == owner)
            .map(|r| r.value().clone())
            .collect();
        reminders.sort_by_key(|r| r.fire_at);
        Ok(reminders)
    }

    async fn get_by_job_id(&self, job_id: &JobId) -> Result<Vec<Reminder>> {
        Ok(self
            .reminders
            .iter()
            .filter(|r| &r.job_id == job_id)
            .map(|r| r.value().clone())
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryPersonStore {
    people: DashMap<String, Person>,
}

impl InMemoryPersonStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersonStore for InMemoryPersonStore {
    async fn get(&self, id: &str) -> Result<Option<Person>> {
        Ok(self.people.get(id).map(|p| p.value().clone()))
    }

    async fn upsert(&self, person: Person) -> Result<Person> {
        self.people.insert(person.id.clone(), person.clone());
        Ok(person)
    }
}
