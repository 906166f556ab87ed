//! Incremental task DAG engine.
//!
//! Nodes are [`TaskSpec`]s; edges are derived by matching one task's
//! declared outputs (marker included) against another's declared inputs.
//! Freshness is judged by content hash against a recorded state file, never
//! by modification time. Completion is a zero-byte marker file: deleted
//! before a task's actions run, written after all of them succeed, so
//! "done" is an idempotent, filesystem-visible fact.

mod error;
mod exec;
mod graph;
pub mod serve;
mod state;

pub use error::GraphError;
pub use exec::{
    ActionRunner, BuiltinRegistry, ExecOptions, Executor, ShellActionRunner,
};
pub use graph::TaskGraph;
pub use state::{fingerprint, sha256_hex, StateStore, TaskState};

pub use buildflow_types::task::{Action, TaskSpec};
