//! Error types for buildflow-manifest.

use camino::Utf8PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    /// Every file was ignored, or the vendor tree was empty. Either way the
    /// manifest would be useless, so the build stops.
    #[error("no files left to include under {vendor_root}; check the ignore list")]
    EmptyManifest { vendor_root: Utf8PathBuf },

    #[error("invalid ignore pattern '{pattern}': {message}")]
    BadPattern { pattern: String, message: String },

    #[error("{0:#}")]
    Io(#[from] anyhow::Error),
}

pub type ManifestResult<T> = Result<T, ManifestError>;
