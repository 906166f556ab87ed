mod config;

use anyhow::Context;
use buildflow_core::adapters::{FsWritePort, ShellGitPort};
use buildflow_core::patches::drawio_patches;
use buildflow_core::registry;
use buildflow_core::render::render_run_md;
use buildflow_core::{
    run_build, run_lab, run_watch, write_run_artifacts, BuildSettings, Project, ToolError,
    ToolInfo,
};
use buildflow_graph::TaskGraph;
use buildflow_manifest::{generate, load_ignore_rules, ManifestTemplate};
use buildflow_patch::{apply_patches, PatchError, PatchOptions};
use buildflow_types::patch::{PatchOutcome, Strictness};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use config::ConfigMerger;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "buildflow",
    version,
    about = "Incremental build orchestrator for the jupyterlab-drawio packages."
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run tasks and their transitive dependencies (default: lab:build).
    Run(RunArgs),
    /// List all declared tasks.
    List(RepoArgs),
    /// Print the derived dependency edges.
    Graph(RepoArgs),
    /// Reset and re-apply the drawio source patches.
    Patch(PatchArgs),
    /// Regenerate the static asset manifest from .npmignore.
    Manifest(RepoArgs),
    /// Build if needed, then serve JupyterLab until interrupted.
    Lab(RunArgs),
    /// Build if needed, then serve with source watchers.
    Watch(RunArgs),
}

#[derive(Debug, Parser)]
struct RepoArgs {
    /// Repository root (default: current directory).
    #[arg(long, default_value = ".")]
    repo_root: Utf8PathBuf,
}

#[derive(Debug, Parser)]
struct RunArgs {
    /// Repository root (default: current directory).
    #[arg(long, default_value = ".")]
    repo_root: Utf8PathBuf,

    /// Worker threads for independent stale tasks.
    #[arg(long, short = 'j')]
    jobs: Option<usize>,

    /// Fail on missing or ambiguous patch anchors instead of warning.
    #[arg(long, default_value_t = false)]
    strict: bool,

    /// Target tasks.
    tasks: Vec<String>,
}

#[derive(Debug, Parser)]
struct PatchArgs {
    /// Repository root (default: current directory).
    #[arg(long, default_value = ".")]
    repo_root: Utf8PathBuf,

    /// Fail on missing or ambiguous patch anchors instead of warning.
    #[arg(long, default_value_t = false)]
    strict: bool,
}

fn main() -> ExitCode {
    match real_main() {
        Ok(()) => ExitCode::from(0),
        Err(ToolError::TaskFailed) => {
            error!("one or more tasks failed");
            ExitCode::from(2)
        }
        Err(err) => {
            error!("{:?}", anyhow::Error::from(err));
            ExitCode::from(1)
        }
    }
}

fn real_main() -> Result<(), ToolError> {
    // Diagnostics must reach the console even without RUST_LOG set, and go
    // to stderr so stdout stays clean for reports and listings.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Run(args) => cmd_run(args),
        Command::List(args) => cmd_list(args),
        Command::Graph(args) => cmd_graph(args),
        Command::Patch(args) => cmd_patch(args),
        Command::Manifest(args) => cmd_manifest(args),
        Command::Lab(args) => cmd_serve(args, run_lab),
        Command::Watch(args) => cmd_serve(args, run_watch),
    }
}

fn tool() -> ToolInfo {
    ToolInfo {
        name: "buildflow".to_string(),
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
    }
}

fn build_settings(args: &RunArgs) -> Result<BuildSettings, ToolError> {
    let file_config =
        config::load_or_default(&args.repo_root).context("load buildflow.toml config")?;
    let merged =
        ConfigMerger::new(file_config).merge_run_args(args.jobs, args.strict, &args.tasks);

    let mut settings = BuildSettings::new(args.repo_root.clone());
    settings.jobs = merged.jobs;
    settings.strictness = merged.strictness;
    settings.tasks = merged.tasks;
    Ok(settings)
}

fn cmd_run(args: RunArgs) -> Result<(), ToolError> {
    let settings = build_settings(&args)?;
    let outcome = run_build(&settings, &ShellGitPort, tool())?;

    let build_dir = settings.repo_root.join("build");
    write_run_artifacts(&outcome, &build_dir, &FsWritePort)?;

    print!("{}", render_run_md(&outcome.report));
    if !outcome.report.succeeded() {
        return Err(ToolError::TaskFailed);
    }
    Ok(())
}

fn cmd_list(args: RepoArgs) -> Result<(), ToolError> {
    let project = Project::new(args.repo_root);
    let catalog = registry::assemble(&project, &ShellGitPort, Strictness::default())
        .context("assemble task catalog")?;
    let graph = TaskGraph::new(catalog.specs)?;

    for task in graph.topo_order()? {
        match &task.doc {
            Some(doc) => println!("{:<32} {doc}", task.name),
            None => println!("{}", task.name),
        }
    }
    Ok(())
}

fn cmd_graph(args: RepoArgs) -> Result<(), ToolError> {
    let project = Project::new(args.repo_root);
    let catalog = registry::assemble(&project, &ShellGitPort, Strictness::default())
        .context("assemble task catalog")?;
    let graph = TaskGraph::new(catalog.specs)?;

    for (dep, task) in graph.edges() {
        println!("{dep} -> {task}");
    }
    Ok(())
}

fn cmd_patch(args: PatchArgs) -> Result<(), ToolError> {
    let strictness = if args.strict {
        Strictness::Strict
    } else {
        Strictness::Lenient
    };
    let project = Project::new(args.repo_root);
    let vendor = project.root().join(project.vendor_root());

    let report = match apply_patches(&vendor, &drawio_patches(), &PatchOptions { strictness }) {
        Ok(report) => report,
        Err(err @ (PatchError::AnchorNotFound { .. } | PatchError::AmbiguousAnchor { .. })) => {
            error!("{err}");
            return Err(ToolError::TaskFailed);
        }
        Err(err) => return Err(ToolError::Internal(err.into())),
    };

    for file in &report.files {
        for result in &file.results {
            let verdict = match result.outcome {
                PatchOutcome::Applied => "applied",
                PatchOutcome::AlreadyApplied => "already applied",
                PatchOutcome::NotFound => "anchor not found",
            };
            println!("{}: {} ({verdict})", file.file, result.name);
        }
    }
    Ok(())
}

fn cmd_manifest(args: RepoArgs) -> Result<(), ToolError> {
    let project = Project::new(args.repo_root);
    let root = project.root();

    let rules =
        load_ignore_rules(&root.join(project.npmignore()), "drawio/").context("load ignores")?;
    let template = ManifestTemplate {
        header: registry::MANIFEST_HEADER.to_string(),
        line: registry::MANIFEST_LINE.to_string(),
    };
    let report = generate(
        &root.join(project.vendor_root()),
        &root.join(project.webpack_pkg()),
        &rules,
        &template,
        &root.join(project.static_manifest()),
    )
    .context("generate manifest")?;

    info!(entries = report.entries, "static manifest written");
    for pattern in report.unused_patterns() {
        info!(pattern = pattern.pattern.as_str(), "ignore pattern matched nothing");
    }
    Ok(())
}

fn cmd_serve(
    args: RunArgs,
    serve: fn(&BuildSettings, &dyn buildflow_core::ports::GitPort, ToolInfo) -> Result<(), ToolError>,
) -> Result<(), ToolError> {
    let settings = build_settings(&args)?;
    serve(&settings, &ShellGitPort, tool())
}
