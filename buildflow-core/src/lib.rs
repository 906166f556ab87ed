//! Embeddable core library for buildflow.
//!
//! Provides a clap-free entry point suitable for linking into another host
//! process. Git access goes through the [`ports::GitPort`] trait; the
//! [`adapters`] module provides the default shell-backed implementation.
//!
//! # Entry points
//!
//! - [`run_build`](pipeline::run_build) — run tasks and their dependencies
//! - [`run_lab`](pipeline::run_lab) — build, then serve JupyterLab
//! - [`run_watch`](pipeline::run_watch) — build, then serve with watchers

pub mod adapters;
pub mod patches;
pub mod pipeline;
pub mod ports;
pub mod project;
pub mod registry;
pub mod render;
pub mod settings;

pub use pipeline::{run_build, run_lab, run_watch, write_run_artifacts, RunOutcome, ToolError};
pub use project::Project;
pub use settings::{BuildSettings, DEFAULT_TASK};

// Re-export report types so embedders don't need buildflow-types directly.
pub use buildflow_types::run::{RunReport, ToolInfo};
