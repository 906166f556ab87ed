//! Error types for buildflow-patch.
//!
//! The taxonomy mirrors the run-level one: a failed reset is always fatal
//! (patches cannot be layered on unknown prior state), while a missing
//! anchor is fatal only under strict mode.

use camino::Utf8PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatchError {
    /// The target file could not be restored to its committed state.
    #[error("reset failed for {file}: {message}")]
    ResetFailed { file: Utf8PathBuf, message: String },

    /// Strict mode: a patch's `before` anchor was not found.
    #[error("patch '{name}' not applicable: anchor not found in {file}")]
    AnchorNotFound { name: String, file: Utf8PathBuf },

    /// Strict mode: a patch's `before` anchor matched more than once, so a
    /// first-occurrence replace would be an unintended secondary edit.
    #[error("patch '{name}' ambiguous: anchor occurs {count} times in {file}")]
    AmbiguousAnchor {
        name: String,
        file: Utf8PathBuf,
        count: usize,
    },

    #[error("{0:#}")]
    Io(#[from] anyhow::Error),
}

pub type PatchResult<T> = Result<T, PatchError>;
