//! Types describing generated static-asset manifests.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// One file kept by the walk, relative to the vendor root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: Utf8PathBuf,
}

/// How often each ignore pattern matched, for operator visibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternCount {
    pub pattern: String,
    pub matched: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestReport {
    pub schema: String,

    /// Number of statements emitted into the manifest module.
    pub entries: u64,

    #[serde(default)]
    pub patterns: Vec<PatternCount>,

    /// Where the manifest module was written.
    pub out: Utf8PathBuf,
}

impl ManifestReport {
    pub fn new(entries: u64, patterns: Vec<PatternCount>, out: Utf8PathBuf) -> Self {
        Self {
            schema: crate::schema::BUILDFLOW_MANIFEST_V1.to_string(),
            entries,
            patterns,
            out,
        }
    }

    /// Patterns that never matched anything (informational only).
    pub fn unused_patterns(&self) -> impl Iterator<Item = &PatternCount> {
        self.patterns.iter().filter(|p| p.matched == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unused_patterns_filters_zero_counts() {
        let report = ManifestReport::new(
            3,
            vec![
                PatternCount {
                    pattern: "vendor/src/test/*".to_string(),
                    matched: 2,
                },
                PatternCount {
                    pattern: "vendor/*.bak".to_string(),
                    matched: 0,
                },
            ],
            Utf8PathBuf::from("lib/_static.js"),
        );

        let unused: Vec<_> = report.unused_patterns().collect();
        assert_eq!(unused.len(), 1);
        assert_eq!(unused[0].pattern, "vendor/*.bak");
    }
}
