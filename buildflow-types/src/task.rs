//! Task declarations consumed by the graph engine.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// One action of a task. Actions run in declaration order; the first failure
/// fails the task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// External toolchain invocation. Correct exit code means success; output
    /// passes through to the console uninterpreted.
    Process {
        argv: Vec<String>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<Utf8PathBuf>,
    },
    /// Process-local callable, resolved by name through the builtin registry
    /// at execution time (patcher, manifest generator, cleaners).
    Builtin { name: String },
}

impl Action {
    pub fn process<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Action::Process {
            argv: argv.into_iter().map(Into::into).collect(),
            cwd: None,
        }
    }

    pub fn process_in<I, S>(argv: I, cwd: Utf8PathBuf) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Action::Process {
            argv: argv.into_iter().map(Into::into).collect(),
            cwd: Some(cwd),
        }
    }

    pub fn builtin(name: impl Into<String>) -> Self {
        Action::Builtin { name: name.into() }
    }
}

/// A declared unit of work.
///
/// Edges are never declared directly: the graph derives them by matching one
/// task's `outputs` (and `marker`) against another task's `inputs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,

    /// Files whose content change invalidates the task.
    #[serde(default)]
    pub inputs: Vec<Utf8PathBuf>,

    /// Artifacts the task must produce. A missing output makes the task stale.
    #[serde(default)]
    pub outputs: Vec<Utf8PathBuf>,

    /// Zero-byte completion marker under the build dir. Deleted before the
    /// actions run, written after all of them succeed, so "done" is a
    /// filesystem-visible fact downstream tasks can depend on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<Utf8PathBuf>,

    /// Content hash of configuration for tasks without meaningful file
    /// inputs; a changed fingerprint makes the task stale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,

    /// Foreground tasks (serve/watch) that never become fresh.
    #[serde(default)]
    pub always_stale: bool,

    #[serde(default)]
    pub actions: Vec<Action>,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            doc: None,
            inputs: vec![],
            outputs: vec![],
            marker: None,
            fingerprint: None,
            always_stale: false,
            actions: vec![],
        }
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn input(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.inputs.push(path.into());
        self
    }

    pub fn inputs<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        self.inputs.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn output(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.outputs.push(path.into());
        self
    }

    pub fn marker(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.marker = Some(path.into());
        self
    }

    pub fn fingerprint(mut self, fp: impl Into<String>) -> Self {
        self.fingerprint = Some(fp.into());
        self
    }

    pub fn always_stale(mut self) -> Self {
        self.always_stale = true;
        self
    }

    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// All paths this task promises to produce, marker included.
    pub fn produced_paths(&self) -> impl Iterator<Item = &Utf8PathBuf> {
        self.outputs.iter().chain(self.marker.iter())
    }
}
