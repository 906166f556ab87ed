//! Shared DTOs (schemas-as-code) for the buildflow workspace.
//!
//! # Design constraints
//! - These types are intended to be serialized to disk.
//! - Be conservative with breaking changes.
//! - Prefer adding optional fields over changing semantics.

pub mod manifest;
pub mod patch;
pub mod run;
pub mod task;

/// Schema identifiers.
pub mod schema {
    pub const BUILDFLOW_RUN_V1: &str = "buildflow.run.v1";
    pub const BUILDFLOW_PATCH_V1: &str = "buildflow.patch.v1";
    pub const BUILDFLOW_MANIFEST_V1: &str = "buildflow.manifest.v1";
}
