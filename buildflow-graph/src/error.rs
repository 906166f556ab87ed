//! Error types for the task graph engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("duplicate task name '{0}'")]
    DuplicateTask(String),

    #[error("unknown task '{0}'")]
    UnknownTask(String),

    #[error("task '{task}' uses unknown builtin action '{builtin}'")]
    UnknownBuiltin { task: String, builtin: String },

    #[error("dependency cycle: {}", .tasks.join(" -> "))]
    Cycle { tasks: Vec<String> },

    #[error("{0:#}")]
    Io(#[from] anyhow::Error),
}
