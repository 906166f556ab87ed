//! Patch engine for vendored source files.
//!
//! Responsibilities:
//! - Restore each target file to its last-committed content before patching,
//!   so repeated runs are idempotent and upstream updates are tolerated.
//! - Apply named literal find-and-replace edits, first occurrence only.
//! - Return a structured three-state outcome per edit
//!   (`applied | already_applied | not_found`) instead of printed text.

mod error;

pub use error::{PatchError, PatchResult};

use anyhow::Context;
use buildflow_types::patch::{
    FilePatchReport, PatchOutcome, PatchReport, PatchSpec, Strictness,
};
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use std::process::Command;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct PatchOptions {
    pub strictness: Strictness,
}

/// Restores a target file to its pristine state before patches are applied.
pub trait ResetPort {
    fn reset(&self, vendor_root: &Utf8Path, rel: &Utf8Path) -> anyhow::Result<()>;
}

/// Resets via `git checkout -- <path>` inside the vendor checkout.
#[derive(Debug, Clone, Default)]
pub struct GitResetPort;

impl ResetPort for GitResetPort {
    fn reset(&self, vendor_root: &Utf8Path, rel: &Utf8Path) -> anyhow::Result<()> {
        let output = Command::new("git")
            .args(["checkout", "--", rel.as_str()])
            .current_dir(vendor_root)
            .output()
            .with_context(|| format!("run git checkout -- {rel}"))?;

        if !output.status.success() {
            anyhow::bail!(
                "git checkout -- {} exited with {}: {}",
                rel,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

/// Apply `specs` to files under `vendor_root`, resetting each target first.
pub fn apply_patches(
    vendor_root: &Utf8Path,
    specs: &[PatchSpec],
    opts: &PatchOptions,
) -> PatchResult<PatchReport> {
    apply_patches_with(vendor_root, specs, opts, &GitResetPort)
}

/// Like [`apply_patches`], with an explicit reset strategy.
///
/// No rollback across files: if file B fails after file A was written, A
/// stays patched. The reset-before-patch policy makes the next run
/// self-correcting.
pub fn apply_patches_with(
    vendor_root: &Utf8Path,
    specs: &[PatchSpec],
    opts: &PatchOptions,
    reset: &dyn ResetPort,
) -> PatchResult<PatchReport> {
    let mut report = PatchReport::new();

    for (file, group) in group_by_file(specs) {
        info!(file = file.as_str(), "resetting to committed state");
        reset
            .reset(vendor_root, &file)
            .map_err(|e| PatchError::ResetFailed {
                file: file.clone(),
                message: format!("{e:#}"),
            })?;

        let abs = vendor_root.join(&file);
        let pristine = fs::read_to_string(&abs)
            .with_context(|| format!("read {abs}"))
            .map_err(PatchError::Io)?;
        let mut text = pristine.clone();
        let mut file_report = FilePatchReport {
            file: file.clone(),
            results: vec![],
            changed: false,
        };

        for spec in group {
            let (next, outcome) = apply_to_text(&text, spec, opts.strictness)?;
            match outcome {
                PatchOutcome::Applied => {
                    debug!(patch = spec.name.as_str(), "patched");
                }
                PatchOutcome::AlreadyApplied => {
                    debug!(patch = spec.name.as_str(), "nothing to do");
                }
                PatchOutcome::NotFound => {
                    warn!(
                        patch = spec.name.as_str(),
                        file = file.as_str(),
                        "pattern not found; vendored source may have diverged"
                    );
                }
            }
            report.record(outcome);
            file_report.results.push(buildflow_types::patch::PatchResult {
                name: spec.name.clone(),
                outcome,
                message: match outcome {
                    PatchOutcome::NotFound => Some("pattern not found".to_string()),
                    _ => None,
                },
            });
            text = next;
        }

        file_report.changed = text != pristine;
        fs::write(&abs, &text)
            .with_context(|| format!("write {abs}"))
            .map_err(PatchError::Io)?;

        report.files.push(file_report);
    }

    Ok(report)
}

/// Apply a single spec to in-memory text. Pure; the seam all the invariants
/// hang off.
pub fn apply_to_text(
    text: &str,
    spec: &PatchSpec,
    strictness: Strictness,
) -> PatchResult<(String, PatchOutcome)> {
    // A missing anchor is a missing anchor, even when `after`-like text is
    // present: the vendored source has diverged and that must surface.
    let occurrences = text.matches(&spec.before).count();
    if occurrences == 0 {
        if strictness == Strictness::Strict {
            return Err(PatchError::AnchorNotFound {
                name: spec.name.clone(),
                file: spec.file.clone(),
            });
        }
        return Ok((text.to_string(), PatchOutcome::NotFound));
    }

    if text.contains(&spec.after) {
        return Ok((text.to_string(), PatchOutcome::AlreadyApplied));
    }

    match occurrences {
        1 => Ok((
            text.replacen(&spec.before, &spec.after, 1),
            PatchOutcome::Applied,
        )),
        n => {
            if strictness == Strictness::Strict {
                return Err(PatchError::AmbiguousAnchor {
                    name: spec.name.clone(),
                    file: spec.file.clone(),
                    count: n,
                });
            }
            // Historical behavior: single substring replace, first occurrence.
            Ok((
                text.replacen(&spec.before, &spec.after, 1),
                PatchOutcome::Applied,
            ))
        }
    }
}

fn group_by_file(specs: &[PatchSpec]) -> Vec<(Utf8PathBuf, Vec<&PatchSpec>)> {
    // Declaration order matters for both files and patches within a file.
    let mut out: Vec<(Utf8PathBuf, Vec<&PatchSpec>)> = Vec::new();
    for spec in specs {
        match out.iter_mut().find(|(file, _)| file == &spec.file) {
            Some((_, group)) => group.push(spec),
            None => out.push((spec.file.clone(), vec![spec])),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn spec(before: &str, after: &str) -> PatchSpec {
        PatchSpec {
            file: Utf8PathBuf::from("app.min.js"),
            name: "test patch".to_string(),
            before: before.to_string(),
            after: after.to_string(),
        }
    }

    #[test]
    fn replaces_first_occurrence_only() {
        let (out, outcome) =
            apply_to_text("foo baz foo", &spec("foo", "bar"), Strictness::Lenient).unwrap();
        assert_eq!(out, "bar baz foo");
        assert_eq!(outcome, PatchOutcome::Applied);
    }

    #[test]
    fn missing_anchor_is_a_warning_in_lenient() {
        let (out, outcome) =
            apply_to_text("nothing here", &spec("foo", "bar"), Strictness::Lenient).unwrap();
        assert_eq!(out, "nothing here");
        assert_eq!(outcome, PatchOutcome::NotFound);
    }

    #[test]
    fn missing_anchor_fails_in_strict() {
        let err =
            apply_to_text("nothing here", &spec("foo", "bar"), Strictness::Strict).unwrap_err();
        assert!(matches!(err, PatchError::AnchorNotFound { .. }));
    }

    #[test]
    fn ambiguous_anchor_fails_in_strict() {
        let err =
            apply_to_text("foo baz foo", &spec("foo", "bar"), Strictness::Strict).unwrap_err();
        match err {
            PatchError::AmbiguousAnchor { count, .. } => assert_eq!(count, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn already_applied_when_anchor_and_replacement_both_present() {
        let (out, outcome) =
            apply_to_text("bar and foo", &spec("foo", "bar"), Strictness::Strict).unwrap();
        assert_eq!(out, "bar and foo");
        assert_eq!(outcome, PatchOutcome::AlreadyApplied);
    }

    #[test]
    fn missing_anchor_wins_over_applied_looking_text() {
        // `after`-like text without the anchor means divergence, not success.
        let (out, outcome) =
            apply_to_text("bar only", &spec("foo", "bar"), Strictness::Lenient).unwrap();
        assert_eq!(out, "bar only");
        assert_eq!(outcome, PatchOutcome::NotFound);

        let err =
            apply_to_text("bar only", &spec("foo", "bar"), Strictness::Strict).unwrap_err();
        assert!(matches!(err, PatchError::AnchorNotFound { .. }));
    }

    #[test]
    fn group_by_file_preserves_declaration_order() {
        let mut a = spec("x", "y");
        a.file = Utf8PathBuf::from("b.js");
        let mut b = spec("p", "q");
        b.file = Utf8PathBuf::from("a.js");
        let mut c = spec("m", "n");
        c.file = Utf8PathBuf::from("b.js");

        let specs = vec![a, b, c];
        let groups = group_by_file(&specs);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0.as_str(), "b.js");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0.as_str(), "a.js");
    }
}
