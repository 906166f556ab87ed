//! Types describing in-place edits to vendored source files.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// A single named, idempotent find-and-replace edit against a vendored file.
///
/// `before` and `after` are literal substrings, not patterns. Patches are
/// written assuming `before` anchors exactly one location in the pristine
/// file; only the first occurrence is ever replaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchSpec {
    /// Target file, relative to the vendor root.
    pub file: Utf8PathBuf,
    pub name: String,
    pub before: String,
    pub after: String,
}

/// Outcome of one patch, as a structured result rather than printed text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchOutcome {
    /// The replacement was performed.
    Applied,
    /// `after` was already present; nothing to do.
    AlreadyApplied,
    /// `before` was not found; the file was left untouched by this edit.
    NotFound,
}

/// How to treat patches whose anchors no longer hold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    /// Warn on a missing anchor and continue (the historical behavior).
    #[default]
    Lenient,
    /// Fail on a missing anchor, or on an anchor matching more than once.
    Strict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchResult {
    pub name: String,
    pub outcome: PatchOutcome,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// All results for one target file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilePatchReport {
    pub file: Utf8PathBuf,

    #[serde(default)]
    pub results: Vec<PatchResult>,

    /// Whether the written-back text differs from the pristine checkout.
    pub changed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatchSummary {
    pub applied: u64,
    pub already_applied: u64,
    pub not_found: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchReport {
    pub schema: String,

    #[serde(default)]
    pub files: Vec<FilePatchReport>,

    pub summary: PatchSummary,
}

impl PatchReport {
    pub fn new() -> Self {
        Self {
            schema: crate::schema::BUILDFLOW_PATCH_V1.to_string(),
            files: vec![],
            summary: PatchSummary::default(),
        }
    }

    /// True when any patch failed to find its anchor. A silently-unappliable
    /// patch means the downstream vendored behavior is no longer what the
    /// rest of the build expects.
    pub fn has_unapplied(&self) -> bool {
        self.summary.not_found > 0
    }

    pub fn record(&mut self, outcome: PatchOutcome) {
        match outcome {
            PatchOutcome::Applied => self.summary.applied += 1,
            PatchOutcome::AlreadyApplied => self.summary.already_applied += 1,
            PatchOutcome::NotFound => self.summary.not_found += 1,
        }
    }
}

impl Default for PatchReport {
    fn default() -> Self {
        Self::new()
    }
}
