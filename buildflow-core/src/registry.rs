//! The task catalog: every declared task plus the builtins they invoke.

use crate::patches::drawio_patches;
use crate::ports::GitPort;
use crate::project::Project;
use buildflow_graph::{fingerprint, BuiltinRegistry};
use buildflow_manifest::{generate, load_ignore_rules, ManifestTemplate};
use buildflow_patch::{apply_patches, PatchOptions};
use buildflow_types::patch::Strictness;
use buildflow_types::task::{Action, TaskSpec};
use fs_err as fs;
use tracing::info;

const EXTENSION_MANAGER: &str = "@jupyterlab/extension-manager-extension";

pub const MANIFEST_HEADER: &str = "\
/**
    All files that should be copied to the jupyterlab static folder, available as:

    {:base_url}static/lab/node_modules/@deathbeds/jupyterlab-drawio-webpack/src/{:path}

    This file generated from https://github.com/jgraph/drawio
*/
";

pub const MANIFEST_LINE: &str =
    "import '!!file-loader?name=[path][name].[ext]&context=.!../drawio/{path}';";

/// Everything the executor needs for one run: the task specs and the
/// builtin callables they reference.
pub struct TaskRegistry {
    pub specs: Vec<TaskSpec>,
    pub builtins: BuiltinRegistry,
}

/// Assemble the full catalog. Submodule status is queried once and feeds
/// both the `submodules` fingerprint and its cleaner.
pub fn assemble(
    project: &Project,
    git: &dyn GitPort,
    strictness: Strictness,
) -> anyhow::Result<TaskRegistry> {
    let submodule_status = git.submodule_status(project.root())?;
    Ok(TaskRegistry {
        specs: task_specs(project, &submodule_status)?,
        builtins: builtins(project, &submodule_status, strictness),
    })
}

fn task_specs(project: &Project, submodule_status: &[String]) -> anyhow::Result<Vec<TaskSpec>> {
    let editor = project.editor_pkg();
    let webpack = project.webpack_pkg();
    let editor_tarball = project.pack_tarball(&editor)?;
    let webpack_tarball = project.pack_tarball(&webpack)?;
    let extensions = project.extensions()?;
    let ts_sources = project.ts_sources()?;
    let css_sources = project.css_sources()?;
    let prettier_sources = project.prettier_sources()?;

    // Everything consuming the vendored checkout shares the submodule
    // fingerprint: a marker's bytes never change, so a submodule moving to a
    // new commit must invalidate these tasks through the fingerprint.
    let vendor_fingerprint = fingerprint(submodule_status);

    let mut lab_build = TaskSpec::new("lab:build")
        .doc("do a production build of JupyterLab with the local extensions")
        .input(editor_tarball.clone())
        .input(webpack_tarball.clone())
        .marker(project.marker("lab:build"))
        .fingerprint(fingerprint(&extensions))
        .action(Action::process(["jupyter", "lab", "clean", "--all"]))
        .action(Action::process([
            "jupyter",
            "labextension",
            "disable",
            EXTENSION_MANAGER,
        ]))
        .action(Action::process([
            "jupyter".to_string(),
            "labextension".to_string(),
            "link".to_string(),
            "--debug".to_string(),
            "--no-build".to_string(),
            editor.to_string(),
            webpack.to_string(),
        ]));
    let mut install = vec![
        "jupyter".to_string(),
        "labextension".to_string(),
        "install".to_string(),
        "--debug".to_string(),
        "--no-build".to_string(),
    ];
    install.extend(extensions);
    lab_build = lab_build
        .action(Action::Process {
            argv: install,
            cwd: None,
        })
        .action(Action::process(["jupyter", "labextension", "list"]))
        .action(Action::process([
            "jupyter",
            "lab",
            "build",
            "--debug",
            "--dev-build=False",
            "--minimize=True",
        ]))
        .action(Action::process(["jupyter", "labextension", "list"]));

    Ok(vec![
        TaskSpec::new("submodules")
            .doc("ensure submodules are available")
            .marker(project.marker("submodules"))
            .fingerprint(vendor_fingerprint.clone())
            .action(Action::builtin("clean:vendor"))
            .action(Action::process([
                "git",
                "submodule",
                "update",
                "--init",
                "--recursive",
            ])),
        TaskSpec::new("setup:js")
            .doc("install JS dependencies")
            .input(project.yarn_lock())
            .input(project.package_json())
            .input(project.marker("submodules"))
            .output(project.yarn_integrity())
            .marker(project.marker("setup:js"))
            .action(Action::process(["jlpm", "--ignore-optional", "--prefer-offline"]))
            .action(Action::process(["jlpm", "lerna", "bootstrap"])),
        TaskSpec::new("patch:drawio")
            .doc("patch the vendored drawio sources for embedding")
            .input(project.marker("submodules"))
            .output(project.app_min_js())
            .marker(project.marker("patch:drawio"))
            .fingerprint(vendor_fingerprint.clone())
            .action(Action::builtin("patch:drawio")),
        TaskSpec::new("manifest:static")
            .doc("regenerate the static asset manifest from .npmignore")
            .input(project.npmignore())
            .input(project.marker("submodules"))
            .output(project.static_manifest())
            .marker(project.marker("manifest:static"))
            .fingerprint(vendor_fingerprint)
            .action(Action::builtin("manifest:static")),
        TaskSpec::new("lint:prettier")
            .doc("format source files with prettier")
            .input(project.yarn_integrity())
            .inputs(prettier_sources)
            .marker(project.marker("lint:prettier"))
            .action(Action::process(["jlpm", "prettier", "--write", "."])),
        TaskSpec::new("lint:eslint")
            .doc("lint TypeScript sources")
            .input(project.yarn_integrity())
            .input(project.marker("lint:prettier"))
            .inputs(ts_sources.clone())
            .marker(project.marker("lint:eslint"))
            .action(Action::process(["jlpm", "eslint"])),
        TaskSpec::new("lint:all")
            .input(project.marker("lint:prettier"))
            .input(project.marker("lint:eslint"))
            .marker(project.marker("lint:all"))
            .action(Action::builtin("echo:ok")),
        TaskSpec::new("build:js")
            .doc("compile the extension packages")
            .input(project.yarn_integrity())
            .input(project.marker("patch:drawio"))
            .input(project.static_manifest())
            .inputs(ts_sources)
            .inputs(css_sources)
            .output(project.editor_tsbuildinfo())
            .marker(project.marker("build:js"))
            .action(Action::process(["jlpm", "lerna", "run", "build"])),
        TaskSpec::new("pack:jupyterlab-drawio")
            .input(editor.join("package.json"))
            .input(project.editor_tsbuildinfo())
            .output(editor_tarball)
            .action(Action::process_in(["npm", "pack", "."], editor)),
        TaskSpec::new("pack:jupyterlab-drawio-webpack")
            .input(webpack.join("package.json"))
            .input(project.npmignore())
            .input(project.app_min_js())
            .input(project.static_manifest())
            .output(webpack_tarball)
            .action(Action::process_in(["npm", "pack", "."], webpack)),
        lab_build,
        TaskSpec::new("all")
            .doc("build and lint everything")
            .input(project.marker("lab:build"))
            .input(project.marker("lint:all"))
            .marker(project.marker("all"))
            .action(Action::builtin("echo:ok")),
    ])
}

fn builtins(
    project: &Project,
    submodule_status: &[String],
    strictness: Strictness,
) -> BuiltinRegistry {
    let mut registry = BuiltinRegistry::new();

    // The vendor tree is patched in place; an uninitialized submodule with
    // a stale checkout left behind must be removed before init.
    let vendor = project.root().join(project.vendor_root());
    let uninitialized = submodule_status.iter().any(|l| l.starts_with('-'));
    registry.register("clean:vendor", move || {
        if uninitialized && vendor.as_std_path().exists() {
            info!(%vendor, "removing stale vendor checkout");
            fs::remove_dir_all(vendor.as_std_path())?;
        }
        Ok(())
    });

    let vendor = project.root().join(project.vendor_root());
    registry.register("patch:drawio", move || {
        let report = apply_patches(&vendor, &drawio_patches(), &PatchOptions { strictness })?;
        info!(
            applied = report.summary.applied,
            already = report.summary.already_applied,
            missing = report.summary.not_found,
            "drawio patches done"
        );
        Ok(())
    });

    let root = project.root().to_owned();
    let npmignore = root.join(project.npmignore());
    let rule_root = root.join(project.webpack_pkg());
    let vendor = root.join(project.vendor_root());
    let out = root.join(project.static_manifest());
    registry.register("manifest:static", move || {
        let rules = load_ignore_rules(&npmignore, "drawio/")?;
        let template = ManifestTemplate {
            header: MANIFEST_HEADER.to_string(),
            line: MANIFEST_LINE.to_string(),
        };
        let report = generate(&vendor, &rule_root, &rules, &template, &out)?;
        info!(entries = report.entries, "static manifest written");
        Ok(())
    });

    registry.register("echo:ok", || {
        info!("all ok");
        Ok(())
    });

    registry
}
