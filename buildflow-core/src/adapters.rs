//! Default filesystem and git adapters for the port traits.

use crate::ports::{GitPort, WritePort};
use anyhow::{bail, Context};
use camino::Utf8Path;
use fs_err as fs;
use std::process::Command;

/// Shells out to the real `git`.
#[derive(Debug, Default)]
pub struct ShellGitPort;

impl GitPort for ShellGitPort {
    fn submodule_status(&self, repo_root: &Utf8Path) -> anyhow::Result<Vec<String>> {
        let output = Command::new("git")
            .args(["submodule", "status"])
            .current_dir(repo_root.as_std_path())
            .output()
            .context("run git submodule status")?;
        if !output.status.success() {
            bail!(
                "git submodule status failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(String::from)
            .collect())
    }
}

/// Writes through to the real filesystem.
#[derive(Debug, Default)]
pub struct FsWritePort;

impl WritePort for FsWritePort {
    fn write_file(&self, path: &Utf8Path, contents: &[u8]) -> anyhow::Result<()> {
        fs::write(path.as_std_path(), contents).with_context(|| format!("write {path}"))
    }

    fn create_dir_all(&self, path: &Utf8Path) -> anyhow::Result<()> {
        fs::create_dir_all(path.as_std_path()).with_context(|| format!("create {path}"))
    }
}
