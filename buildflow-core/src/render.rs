//! Markdown rendering for human-readable run reports.

use buildflow_types::run::{RunReport, TaskStatus};

pub fn render_run_md(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str("# buildflow run\n\n");
    out.push_str(&format!(
        "- Tool: {} {}\n",
        report.tool.name,
        report.tool.version.as_deref().unwrap_or("unknown")
    ));
    out.push_str(&format!("- Started: {}\n", report.started_at.to_rfc3339()));
    if let Some(ended) = report.ended_at {
        out.push_str(&format!("- Ended: {}\n", ended.to_rfc3339()));
    }
    out.push_str(&format!(
        "- Tasks: {} (ran {}, fresh {}, failed {}, blocked {})\n\n",
        report.summary.total,
        report.summary.ran,
        report.summary.fresh,
        report.summary.failed,
        report.summary.blocked
    ));

    out.push_str("## Tasks\n\n");
    if report.results.is_empty() {
        out.push_str("_Nothing selected._\n");
        return out;
    }

    for result in &report.results {
        out.push_str(&format!(
            "- `{}` {}",
            result.name,
            status_label(result.status)
        ));
        if let Some(reason) = result.reason {
            out.push_str(&format!(" ({reason:?})"));
        }
        if let Some(ms) = result.duration_ms {
            out.push_str(&format!(" in {ms}ms"));
        }
        if let Some(message) = &result.message {
            out.push_str(&format!(": {message}"));
        }
        out.push('\n');
    }

    out
}

fn status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Fresh => "fresh",
        TaskStatus::Ran => "ran",
        TaskStatus::Failed => "**failed**",
        TaskStatus::Blocked => "blocked",
    }
}
