//! Callback kinds
//!
//! The closed set of callback shapes that can sit behind a handle.

use std::fmt;

/// Kind of native callback stored under a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    /// Command condition: `(sender, command) -> bool`
    Condition,
    /// Command executor: `(sender, context)`
    Executor,
    /// Argument suggestion provider: `(sender, context, sink)`
    Suggestion,
    /// Player predicate: `(player) -> bool`
    Predicate,
    /// Event consumer: `(event)`
    EventConsumer,
    /// Entity lifecycle delegate
    Lifecycle,
    /// Scheduled task body
    Task,
}

impl CallbackKind {
    /// Lowercase name used in logs and error messages
    pub fn name(self) -> &'static str {
        match self {
            CallbackKind::Condition => "condition",
            CallbackKind::Executor => "executor",
            CallbackKind::Suggestion => "suggestion",
            CallbackKind::Predicate => "predicate",
            CallbackKind::EventConsumer => "event-consumer",
            CallbackKind::Lifecycle => "lifecycle",
            CallbackKind::Task => "task",
        }
    }
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
