//! Port traits for I/O performed by the pipeline.
//!
//! The pipeline itself stays deterministic and testable; real git and
//! filesystem access live behind these traits, with default adapters in
//! [`crate::adapters`].

use camino::Utf8Path;

/// Queries git state used for freshness fingerprints.
pub trait GitPort {
    /// One line per submodule, as printed by `git submodule status`. The
    /// leading status character is significant: `-` means uninitialized.
    fn submodule_status(&self, repo_root: &Utf8Path) -> anyhow::Result<Vec<String>>;
}

/// Writes files and creates directories.
pub trait WritePort {
    fn write_file(&self, path: &Utf8Path, contents: &[u8]) -> anyhow::Result<()>;
    fn create_dir_all(&self, path: &Utf8Path) -> anyhow::Result<()>;
}
