//! Pipeline settings, resolved by the caller (CLI flags + config file).

use buildflow_types::patch::Strictness;
use camino::Utf8PathBuf;

/// The default target when no tasks are named.
pub const DEFAULT_TASK: &str = "lab:build";

#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub repo_root: Utf8PathBuf,

    /// Worker threads for independent stale tasks.
    pub jobs: usize,

    /// How the patcher treats missing or ambiguous anchors.
    pub strictness: Strictness,

    /// Target tasks; their transitive dependencies are implied.
    pub tasks: Vec<String>,
}

impl BuildSettings {
    pub fn new(repo_root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            jobs: 1,
            strictness: Strictness::default(),
            tasks: vec![DEFAULT_TASK.to_string()],
        }
    }
}
