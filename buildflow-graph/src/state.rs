//! Recorded per-task state and the content-hash freshness judgement.

use anyhow::Context;
use buildflow_types::run::StaleReason;
use buildflow_types::task::TaskSpec;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Hex sha256 of arbitrary bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Stable fingerprint of configuration values for tasks without meaningful
/// file inputs. Each part is length-prefixed so concatenations cannot
/// collide.
pub fn fingerprint<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        let part = part.as_ref();
        hasher.update(part.len().to_le_bytes());
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// What the engine remembers about a task's last successful run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskState {
    /// Input path -> content hash at completion time. BTreeMap keeps the
    /// state file diffable.
    #[serde(default)]
    pub input_hashes: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl TaskState {
    /// Hash the task's inputs as they exist right now.
    pub fn capture(root: &Utf8Path, task: &TaskSpec) -> anyhow::Result<Self> {
        let mut input_hashes = BTreeMap::new();
        for input in &task.inputs {
            let abs = root.join(input);
            let bytes = fs::read(abs.as_std_path()).with_context(|| format!("read {abs}"))?;
            input_hashes.insert(input.to_string(), sha256_hex(&bytes));
        }
        Ok(Self {
            input_hashes,
            fingerprint: task.fingerprint.clone(),
        })
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    tasks: BTreeMap<String, TaskState>,
}

/// JSON state file under the build dir. A corrupt or missing file is an
/// empty store, never an error; the worst case is a full rebuild.
#[derive(Debug)]
pub struct StateStore {
    path: Utf8PathBuf,
    tasks: HashMap<String, TaskState>,
}

impl StateStore {
    pub fn load(path: &Utf8Path) -> Self {
        let tasks = match fs::read_to_string(path.as_std_path()) {
            Ok(text) => match serde_json::from_str::<StateFile>(&text) {
                Ok(file) => file.tasks.into_iter().collect(),
                Err(err) => {
                    warn!(%path, %err, "state file is corrupt, starting fresh");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            path: path.to_owned(),
            tasks,
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .with_context(|| format!("create {parent}"))?;
        }
        let file = StateFile {
            tasks: self.tasks.clone().into_iter().collect(),
        };
        let mut text = serde_json::to_string_pretty(&file).context("serialize state")?;
        text.push('\n');
        fs::write(self.path.as_std_path(), text).with_context(|| format!("write {}", self.path))
    }

    pub fn get(&self, name: &str) -> Option<&TaskState> {
        self.tasks.get(name)
    }

    pub fn record(&mut self, name: &str, state: TaskState) {
        self.tasks.insert(name.to_string(), state);
    }

    pub fn forget(&mut self, name: &str) {
        self.tasks.remove(name);
    }

    /// Judge a task against the filesystem and this store. `None` means
    /// fresh. Evaluated at dispatch time, after the task's dependencies
    /// have settled, so upstream rewrites of an input are seen.
    pub fn staleness(
        &self,
        root: &Utf8Path,
        task: &TaskSpec,
    ) -> anyhow::Result<Option<StaleReason>> {
        if task.always_stale {
            return Ok(Some(StaleReason::AlwaysStale));
        }

        let Some(prev) = self.tasks.get(&task.name) else {
            return Ok(Some(StaleReason::NeverRun));
        };

        for output in &task.outputs {
            if !root.join(output).as_std_path().exists() {
                debug!(task = %task.name, %output, "output missing");
                return Ok(Some(StaleReason::MissingOutput));
            }
        }
        if let Some(marker) = &task.marker {
            if !root.join(marker).as_std_path().exists() {
                return Ok(Some(StaleReason::MissingMarker));
            }
        }

        if prev.fingerprint != task.fingerprint {
            return Ok(Some(StaleReason::FingerprintChanged));
        }

        if prev.input_hashes.len() != task.inputs.len() {
            return Ok(Some(StaleReason::InputChanged));
        }
        for input in &task.inputs {
            let abs = root.join(input);
            let Ok(bytes) = fs::read(abs.as_std_path()) else {
                debug!(task = %task.name, %input, "input unreadable");
                return Ok(Some(StaleReason::InputChanged));
            };
            match prev.input_hashes.get(input.as_str()) {
                Some(recorded) if *recorded == sha256_hex(&bytes) => {}
                _ => return Ok(Some(StaleReason::InputChanged)),
            }
        }

        Ok(None)
    }
}
