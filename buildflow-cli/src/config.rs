//! Configuration file loading for buildflow.
//!
//! Discovers and loads `buildflow.toml` from the repository root. CLI
//! arguments take precedence over config file settings.

use anyhow::Context;
use buildflow_types::patch::Strictness;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use serde::Deserialize;
use tracing::debug;

/// The config file name to search for.
pub const CONFIG_FILE_NAME: &str = "buildflow.toml";

/// Top-level configuration from buildflow.toml.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BuildflowConfig {
    pub build: BuildConfig,
    pub patch: PatchConfig,
}

/// Build section of the config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Worker threads for independent stale tasks.
    pub jobs: Option<usize>,

    /// Targets to run when none are named on the command line.
    pub default_tasks: Vec<String>,
}

/// Patch section of the config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PatchConfig {
    /// Fail on missing or ambiguous patch anchors instead of warning.
    pub strict: bool,
}

/// Discover the buildflow.toml config file in the repository root.
pub fn discover_config(repo_root: &Utf8Path) -> Option<Utf8PathBuf> {
    let config_path = repo_root.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        debug!("found config file at {}", config_path);
        Some(config_path)
    } else {
        debug!("no config file found at {}", config_path);
        None
    }
}

pub fn load_config(path: &Utf8Path) -> anyhow::Result<BuildflowConfig> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read config file {}", path))?;
    parse_config(&contents).with_context(|| format!("parse config file {}", path))
}

pub fn parse_config(contents: &str) -> anyhow::Result<BuildflowConfig> {
    let config: BuildflowConfig = toml::from_str(contents).context("invalid TOML")?;
    Ok(config)
}

/// Load config from repo root, or return default if not found.
pub fn load_or_default(repo_root: &Utf8Path) -> anyhow::Result<BuildflowConfig> {
    match discover_config(repo_root) {
        Some(path) => load_config(&path),
        None => Ok(BuildflowConfig::default()),
    }
}

/// Merged configuration combining config file and CLI arguments.
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub jobs: usize,
    pub strictness: Strictness,
    pub tasks: Vec<String>,
}

/// Builder for merging config file with CLI arguments.
pub struct ConfigMerger {
    config: BuildflowConfig,
}

impl ConfigMerger {
    pub fn new(config: BuildflowConfig) -> Self {
        Self { config }
    }

    /// Merge run settings. Named tasks on the command line win over the
    /// config file's default tasks, which win over the built-in default.
    pub fn merge_run_args(
        self,
        cli_jobs: Option<usize>,
        cli_strict: bool,
        cli_tasks: &[String],
    ) -> MergedConfig {
        let jobs = cli_jobs.or(self.config.build.jobs).unwrap_or(1).max(1);

        let strictness = if cli_strict || self.config.patch.strict {
            Strictness::Strict
        } else {
            Strictness::Lenient
        };

        let tasks = if !cli_tasks.is_empty() {
            cli_tasks.to_vec()
        } else if !self.config.build.default_tasks.is_empty() {
            self.config.build.default_tasks.clone()
        } else {
            vec![buildflow_core::DEFAULT_TASK.to_string()]
        };

        MergedConfig {
            jobs,
            strictness,
            tasks,
        }
    }
}
