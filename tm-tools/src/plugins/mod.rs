mod clock;
mod person;
mod reminder;
mod todo;

pub use clock::ClockPlugin;
pub use person::PersonPlugin;
pub use reminder::ReminderPlugin;
pub use todo::{REMINDER_NOT_SCHEDULED, TodoPlugin};

use crate::error::Result;
use crate::registry::FunctionRegistry;
use crate::reminders::ReminderService;
use crate::store::{
    InMemoryPersonStore, InMemoryReminderStore, InMemoryTodoStore, PersonStore, ReminderStore,
    TodoStore,
};
use crate::time_args::TimeArguments;
use std::sync::Arc;
use tm_jobs::{JobBucketScheduler, SchedulingBackend};
use tm_time::FallbackInterpreter;

/// The stores and services behind the standard plugin set.
#[derive(Clone)]
pub struct Toolbox {
    pub todos: Arc<dyn TodoStore>,
    pub reminders: Arc<dyn ReminderStore>,
    pub people: Arc<dyn PersonStore>,
    pub scheduler: JobBucketScheduler,
    pub fallback: Option<Arc<dyn FallbackInterpreter>>,
}

impl Toolbox {
    pub fn in_memory(backend: Arc<dyn SchedulingBackend>, job_namespace: &str) -> Self {
        Self {
            todos: Arc::new(InMemoryTodoStore::new()),
            reminders: Arc::new(InMemoryReminderStore::new()),
            people: Arc::new(InMemoryPersonStore::new()),
            scheduler: JobBucketScheduler::with_namespace(backend, job_namespace),
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackInterpreter>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn time_arguments(&self) -> TimeArguments {
        let time = TimeArguments::new(self.people.clone());
        match &self.fallback {
            Some(fallback) => time.with_fallback(fallback.clone()),
            None => time,
        }
    }

    pub fn reminder_service(&self) -> ReminderService {
        ReminderService::new(self.reminders.clone(), self.scheduler.clone())
    }

    /// `todo`, `reminder`, `person` and `clock`.
    pub fn registry(&self) -> Result<FunctionRegistry> {
        let time = self.time_arguments();
        let reminders = self.reminder_service();
        FunctionRegistry::new()
            .with(Arc::new(TodoPlugin::new(
                self.todos.clone(),
                reminders.clone(),
                time.clone(),
            )))?
            .with(Arc::new(ReminderPlugin::new(
                reminders,
                self.todos.clone(),
                time.clone(),
            )))?
            .with(Arc::new(PersonPlugin::new(self.people.clone())))?
            .with(Arc::new(ClockPlugin::new(time)))
    }
}
