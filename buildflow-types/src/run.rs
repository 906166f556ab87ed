//! Run-report types: what happened to each task during one invocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Up to date; actions were skipped.
    Fresh,
    /// Stale; all actions ran to completion and the marker was written.
    Ran,
    /// An action failed; the marker is absent and the task remains stale.
    Failed,
    /// An upstream dependency failed, so this task never started.
    Blocked,
}

/// Why a stale task was judged stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleReason {
    NeverRun,
    MissingOutput,
    MissingMarker,
    InputChanged,
    FingerprintChanged,
    AlwaysStale,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub name: String,
    pub status: TaskStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<StaleReason>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: u64,
    pub ran: u64,
    pub fresh: u64,
    pub failed: u64,
    pub blocked: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub schema: String,
    pub tool: ToolInfo,
    pub started_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub results: Vec<TaskResult>,

    pub summary: RunSummary,
}

impl RunReport {
    pub fn new(tool: ToolInfo) -> Self {
        Self {
            schema: crate::schema::BUILDFLOW_RUN_V1.to_string(),
            tool,
            started_at: Utc::now(),
            ended_at: None,
            results: vec![],
            summary: RunSummary::default(),
        }
    }

    /// Append a result and fold it into the summary.
    pub fn push(&mut self, result: TaskResult) {
        self.summary.total += 1;
        match result.status {
            TaskStatus::Fresh => self.summary.fresh += 1,
            TaskStatus::Ran => self.summary.ran += 1,
            TaskStatus::Failed => self.summary.failed += 1,
            TaskStatus::Blocked => self.summary.blocked += 1,
        }
        self.results.push(result);
    }

    pub fn succeeded(&self) -> bool {
        self.summary.failed == 0 && self.summary.blocked == 0
    }
}
