//! Functions the assistant can call, and the domain services behind them.
//!
//! Every call arrives as `plugin.function` with a JSON arguments object and
//! has already passed the turn's tool-call gate.

mod error;
mod plugin;
mod plugins;
mod registry;
mod reminders;
mod store;
mod time_args;

pub use error::{Result, ToolError};
pub use plugin::{FunctionSpec, InvocationContext, Plugin};
pub use plugins::{
    ClockPlugin, PersonPlugin, REMINDER_NOT_SCHEDULED, ReminderPlugin, TodoPlugin, Toolbox,
};
pub use registry::{FunctionRegistry, split_wire_name, wire_name};
pub use reminders::{NewReminder, ReminderRemoval, ReminderService};
pub use store::{
    InMemoryPersonStore, InMemoryReminderStore, InMemoryTodoStore, Person, PersonStore, Reminder,
    ReminderReferences, ReminderStore, Todo, TodoStore,
};
pub use time_args::TimeArguments;
