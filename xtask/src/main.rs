use anyhow::Context;
use clap::{Parser, Subcommand};
use fs_err as fs;

#[derive(Debug, Parser)]
#[command(name = "xtask", about = "Workspace helper tasks")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print schema identifiers used by buildflow.
    PrintSchemas,
    /// Delete completion markers and recorded state, forcing a full rerun.
    CleanMarkers {
        #[arg(long, default_value = "build")]
        dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::PrintSchemas => {
            println!("{}", buildflow_types::schema::BUILDFLOW_RUN_V1);
            println!("{}", buildflow_types::schema::BUILDFLOW_PATCH_V1);
            println!("{}", buildflow_types::schema::BUILDFLOW_MANIFEST_V1);
        }
        Command::CleanMarkers { dir } => {
            let removed = clean_markers(&dir)?;
            println!("removed {removed} files from {dir}");
        }
    }
    Ok(())
}

fn clean_markers(dir: &str) -> anyhow::Result<usize> {
    let mut removed = 0usize;
    if std::path::Path::new(dir).exists() {
        for entry in fs::read_dir(dir).with_context(|| format!("read {dir}"))? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".ok") || name == ".buildflow-state.json" {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
    }
    Ok(removed)
}
