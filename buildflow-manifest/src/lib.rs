//! Static-asset manifest generation.
//!
//! Walks a vendored source tree, drops files matched by an ignore list of
//! glob patterns, and emits one import statement per kept file into a
//! generated module, deterministically sorted so repeated runs against the
//! same tree are byte-identical.

mod error;

pub use error::{ManifestError, ManifestResult};

use anyhow::Context;
use buildflow_types::manifest::{ManifestEntry, ManifestReport, PatternCount};
use camino::Utf8Path;
use fs_err as fs;
use glob::Pattern;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Header comment and per-file statement for the generated module.
///
/// `line` must contain a `{path}` placeholder, replaced with each kept
/// file's path relative to the vendor root.
#[derive(Debug, Clone)]
pub struct ManifestTemplate {
    pub header: String,
    pub line: String,
}

impl ManifestTemplate {
    pub fn render_line(&self, rel: &Utf8Path) -> String {
        self.line.replace("{path}", rel.as_str())
    }
}

/// Read ignore rules from a newline-delimited glob file.
///
/// `#`-comments and blank lines are dropped; only patterns starting with
/// `prefix` are kept (the ignore file also carries entries for other tools).
pub fn load_ignore_rules(path: &Utf8Path, prefix: &str) -> anyhow::Result<Vec<String>> {
    let contents = fs::read_to_string(path).with_context(|| format!("read ignore file {path}"))?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| line.starts_with(prefix))
        .map(str::to_string)
        .collect())
}

/// Generate the manifest module for `vendor_root` into `out_path`.
///
/// Ignore patterns are matched against paths relative to `rule_root` (the
/// ignore file's own directory); emitted paths are relative to
/// `vendor_root`. First matching pattern wins and its counter increments.
/// An empty kept set is fatal: it means a broken ignore configuration or an
/// empty vendor tree, and the build should stop rather than silently emit a
/// useless artifact.
pub fn generate(
    vendor_root: &Utf8Path,
    rule_root: &Utf8Path,
    rules: &[String],
    template: &ManifestTemplate,
    out_path: &Utf8Path,
) -> ManifestResult<ManifestReport> {
    let patterns = compile_patterns(rules)?;
    let mut counts: Vec<u64> = vec![0; patterns.len()];
    let mut kept: Vec<ManifestEntry> = Vec::new();

    for entry in WalkDir::new(vendor_root).follow_links(false) {
        let entry = entry
            .with_context(|| format!("walk {vendor_root}"))
            .map_err(ManifestError::Io)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = Utf8Path::from_path(entry.path())
            .ok_or_else(|| anyhow::anyhow!("non-utf8 path under {vendor_root}"))
            .map_err(ManifestError::Io)?;
        let for_rules = path.strip_prefix(rule_root).unwrap_or(path);

        if let Some(idx) = first_match(&patterns, for_rules) {
            counts[idx] += 1;
            continue;
        }

        let rel = path
            .strip_prefix(vendor_root)
            .with_context(|| format!("relativize {path}"))
            .map_err(ManifestError::Io)?;
        kept.push(ManifestEntry {
            path: rel.to_path_buf(),
        });
    }

    kept.sort();

    if kept.is_empty() {
        return Err(ManifestError::EmptyManifest {
            vendor_root: vendor_root.to_path_buf(),
        });
    }

    let mut out = String::new();
    out.push_str(&template.header);
    for entry in &kept {
        out.push_str(&template.render_line(&entry.path));
        out.push('\n');
    }

    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create {parent}"))
            .map_err(ManifestError::Io)?;
    }
    fs::write(out_path, &out)
        .with_context(|| format!("write {out_path}"))
        .map_err(ManifestError::Io)?;

    let pattern_counts: Vec<PatternCount> = rules
        .iter()
        .zip(counts)
        .map(|(pattern, matched)| PatternCount {
            pattern: pattern.clone(),
            matched,
        })
        .collect();

    info!(entries = kept.len(), out = out_path.as_str(), "wrote manifest");
    for pc in &pattern_counts {
        debug!(pattern = pc.pattern.as_str(), matched = pc.matched, "ignore pattern");
    }

    Ok(ManifestReport::new(
        kept.len() as u64,
        pattern_counts,
        out_path.to_path_buf(),
    ))
}

fn compile_patterns(rules: &[String]) -> ManifestResult<Vec<Pattern>> {
    rules
        .iter()
        .map(|rule| {
            Pattern::new(rule).map_err(|e| ManifestError::BadPattern {
                pattern: rule.clone(),
                message: e.to_string(),
            })
        })
        .collect()
}

fn first_match(patterns: &[Pattern], rel: &Utf8Path) -> Option<usize> {
    patterns.iter().position(|p| p.matches(rel.as_str()))
}
