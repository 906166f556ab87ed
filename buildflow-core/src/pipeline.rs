//! The build, lab, and watch pipelines, extracted from the CLI.

use crate::adapters::FsWritePort;
use crate::ports::{GitPort, WritePort};
use crate::project::Project;
use crate::registry;
use crate::render::render_run_md;
use crate::settings::BuildSettings;
use anyhow::Context;
use buildflow_graph::{serve, ExecOptions, Executor, StateStore, TaskGraph};
use buildflow_types::run::{RunReport, ToolInfo};
use camino::Utf8Path;
use chrono::Utc;
use tracing::{debug, info};

/// Error type for pipeline results. Exit code 2 = task failure, 1 = tool
/// error.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("one or more tasks failed")]
    TaskFailed,
    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

impl From<buildflow_graph::GraphError> for ToolError {
    fn from(err: buildflow_graph::GraphError) -> Self {
        ToolError::Internal(err.into())
    }
}

/// Outcome of `run_build`.
pub struct RunOutcome {
    pub report: RunReport,
}

/// Run the requested tasks and their transitive dependencies.
///
/// The caller decides what to do with a failed run; artifacts can be
/// written either way via [`write_run_artifacts`].
pub fn run_build(
    settings: &BuildSettings,
    git: &dyn GitPort,
    tool: ToolInfo,
) -> Result<RunOutcome, ToolError> {
    let project = Project::new(settings.repo_root.clone());
    let catalog = registry::assemble(&project, git, settings.strictness)
        .context("assemble task catalog")?;
    let graph = TaskGraph::new(catalog.specs)?;

    let state_path = settings.repo_root.join(project.state_file());
    let mut store = StateStore::load(&state_path);

    let executor = Executor::new(settings.repo_root.clone())
        .with_builtins(catalog.builtins)
        .with_options(ExecOptions { jobs: settings.jobs });

    debug!(targets = ?settings.tasks, jobs = settings.jobs, "starting run");
    let results = executor.run(&graph, &settings.tasks, &mut store)?;
    store.save().context("save state")?;

    let mut report = RunReport::new(tool);
    for result in results {
        report.push(result);
    }
    report.ended_at = Some(Utc::now());
    info!(
        ran = report.summary.ran,
        fresh = report.summary.fresh,
        failed = report.summary.failed,
        blocked = report.summary.blocked,
        "run finished"
    );

    Ok(RunOutcome { report })
}

/// Write the run report to the build dir as JSON and markdown.
pub fn write_run_artifacts(
    outcome: &RunOutcome,
    out_dir: &Utf8Path,
    writer: &dyn WritePort,
) -> anyhow::Result<()> {
    writer.create_dir_all(out_dir)?;

    let json = serde_json::to_string_pretty(&outcome.report).context("serialize report")?;
    writer.write_file(&out_dir.join("run.json"), json.as_bytes())?;

    let md = render_run_md(&outcome.report);
    writer.write_file(&out_dir.join("run.md"), md.as_bytes())?;

    Ok(())
}

/// Ensure the lab is built, then run it in the foreground until interrupted.
///
/// The lab server prompts "shut down? y/N" during an interactive shutdown,
/// so the confirmation is fed to its stdin after the signal.
pub fn run_lab(
    settings: &BuildSettings,
    git: &dyn GitPort,
    tool: ToolInfo,
) -> Result<(), ToolError> {
    ensure_built(settings, git, tool)?;
    let argv: Vec<String> = ["jupyter", "lab", "--no-browser", "--debug"]
        .map(String::from)
        .to_vec();
    serve::run_foreground(&settings.repo_root, &argv, None, Some(b"y\n"))?;
    Ok(())
}

/// Like [`run_lab`], but with the editor package compiling in watch mode
/// alongside a watching lab server.
pub fn run_watch(
    settings: &BuildSettings,
    git: &dyn GitPort,
    tool: ToolInfo,
) -> Result<(), ToolError> {
    ensure_built(settings, git, tool)?;
    let project = Project::new(settings.repo_root.clone());

    let mut compiler = std::process::Command::new("jlpm")
        .arg("watch")
        .current_dir(
            settings
                .repo_root
                .join(project.editor_pkg())
                .as_std_path(),
        )
        .spawn()
        .context("spawn jlpm watch")?;

    let argv: Vec<String> = ["jupyter", "lab", "--no-browser", "--debug", "--watch"]
        .map(String::from)
        .to_vec();
    let lab = serve::run_foreground(&settings.repo_root, &argv, None, Some(b"y\n"));

    // The compiler dies with the lab either way; it may already be gone.
    let _ = serve::terminate(&mut compiler);
    compiler.wait().context("wait for jlpm watch")?;
    lab?;
    Ok(())
}

fn ensure_built(
    settings: &BuildSettings,
    git: &dyn GitPort,
    tool: ToolInfo,
) -> Result<(), ToolError> {
    let mut build = settings.clone();
    build.tasks = vec!["lab:build".to_string()];
    let outcome = run_build(&build, git, tool)?;
    write_run_artifacts(
        &outcome,
        &settings.repo_root.join("build"),
        &FsWritePort,
    )?;
    if !outcome.report.succeeded() {
        return Err(ToolError::TaskFailed);
    }
    Ok(())
}
