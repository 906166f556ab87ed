//! The repository path model: where everything lives, relative to the root.
//!
//! Task inputs and outputs are declared as root-relative paths so the state
//! file stays portable across checkouts.

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use serde::Deserialize;

/// JupyterLab extension namespace for the locally built packages.
pub const JS_NS: &str = "@deathbeds";

/// Where the drawio patches and the static manifest apply, relative to the
/// webpack package.
pub const VENDOR_DIR: &str = "drawio";

/// The webpacked application bundle, relative to the vendor root.
pub const APP_MIN_JS_REL: &str = "src/main/webapp/js/app.min.js";

#[derive(Debug, Deserialize)]
struct PackageJson {
    name: String,
    version: String,
}

/// Root-relative layout of the extension repository.
#[derive(Debug, Clone)]
pub struct Project {
    root: Utf8PathBuf,
}

impl Project {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn build_dir(&self) -> Utf8PathBuf {
        Utf8PathBuf::from("build")
    }

    /// Completion marker path for a task, flattened into the build dir.
    pub fn marker(&self, name: &str) -> Utf8PathBuf {
        self.build_dir().join(format!("{}.ok", name.replace(':', ".")))
    }

    pub fn state_file(&self) -> Utf8PathBuf {
        self.build_dir().join(".buildflow-state.json")
    }

    pub fn package_json(&self) -> Utf8PathBuf {
        Utf8PathBuf::from("package.json")
    }

    pub fn yarn_lock(&self) -> Utf8PathBuf {
        Utf8PathBuf::from("yarn.lock")
    }

    pub fn yarn_integrity(&self) -> Utf8PathBuf {
        Utf8PathBuf::from("node_modules/.yarn-integrity")
    }

    pub fn extensions_file(&self) -> Utf8PathBuf {
        Utf8PathBuf::from("binder/labextensions.txt")
    }

    pub fn editor_pkg(&self) -> Utf8PathBuf {
        Utf8PathBuf::from("packages/jupyterlab-drawio")
    }

    pub fn editor_tsbuildinfo(&self) -> Utf8PathBuf {
        self.editor_pkg().join("lib/.tsbuildinfo")
    }

    pub fn webpack_pkg(&self) -> Utf8PathBuf {
        Utf8PathBuf::from("packages/jupyterlab-drawio-webpack")
    }

    /// Vendored drawio checkout (a git submodule), patched in place.
    pub fn vendor_root(&self) -> Utf8PathBuf {
        self.webpack_pkg().join(VENDOR_DIR)
    }

    pub fn app_min_js(&self) -> Utf8PathBuf {
        self.vendor_root().join(APP_MIN_JS_REL)
    }

    pub fn npmignore(&self) -> Utf8PathBuf {
        self.webpack_pkg().join(".npmignore")
    }

    pub fn static_manifest(&self) -> Utf8PathBuf {
        self.webpack_pkg().join("lib/_static.js")
    }

    /// Extension specs to install into JupyterLab, from the binder list.
    /// Blank lines and `#` comments are dropped; the result is sorted so
    /// the fingerprint is order-independent.
    pub fn extensions(&self) -> anyhow::Result<Vec<String>> {
        let path = self.root.join(self.extensions_file());
        let text = fs::read_to_string(path.as_std_path())
            .with_context(|| format!("read {path}"))?;
        let mut exts: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(String::from)
            .collect();
        exts.sort();
        Ok(exts)
    }

    /// TypeScript sources of the editor package.
    pub fn ts_sources(&self) -> anyhow::Result<Vec<Utf8PathBuf>> {
        self.glob_relative(&["packages/jupyterlab-drawio/src/**/*.ts"])
    }

    /// Stylesheets of the editor package.
    pub fn css_sources(&self) -> anyhow::Result<Vec<Utf8PathBuf>> {
        self.glob_relative(&["packages/jupyterlab-drawio/style/**/*.css"])
    }

    /// Everything prettier formats: config/docs at the conventional spots
    /// plus the TS and CSS sources.
    pub fn prettier_sources(&self) -> anyhow::Result<Vec<Utf8PathBuf>> {
        let mut files = self.glob_relative(&[
            "*.yml",
            ".github/**/*.yml",
            "*.json",
            "packages/*/*.json",
            "packages/*/schema/*.json",
            "*.md",
            "packages/*/*.md",
        ])?;
        files.extend(self.ts_sources()?);
        files.extend(self.css_sources()?);
        files.sort();
        files.dedup();
        Ok(files)
    }

    /// Expand root-relative glob patterns to the files that exist right now,
    /// sorted and deduplicated.
    fn glob_relative(&self, patterns: &[&str]) -> anyhow::Result<Vec<Utf8PathBuf>> {
        let mut out = Vec::new();
        for pattern in patterns {
            let full = self.root.join(pattern);
            let matches = glob::glob(full.as_str())
                .with_context(|| format!("bad glob pattern {pattern}"))?;
            for path in matches {
                let path = path.with_context(|| format!("expand {pattern}"))?;
                let utf8 = Utf8PathBuf::from_path_buf(path)
                    .map_err(|p| anyhow::anyhow!("non-utf8 path {}", p.display()))?;
                if utf8.is_file() {
                    let rel = utf8
                        .strip_prefix(&self.root)
                        .map(Utf8Path::to_path_buf)
                        .unwrap_or(utf8);
                    out.push(rel);
                }
            }
        }
        out.sort();
        out.dedup();
        Ok(out)
    }

    /// The tarball `npm pack` will produce for a package directory, named
    /// from its package.json.
    pub fn pack_tarball(&self, pkg_dir: &Utf8Path) -> anyhow::Result<Utf8PathBuf> {
        let manifest = self.root.join(pkg_dir).join("package.json");
        let text = fs::read_to_string(manifest.as_std_path())
            .with_context(|| format!("read {manifest}"))?;
        let pkg: PackageJson = serde_json::from_str(&text)
            .with_context(|| format!("parse {manifest}"))?;
        Ok(pkg_dir.join(npm_pack_filename(&pkg.name, &pkg.version)))
    }
}

/// npm's tarball naming: scope `@` dropped, `/` becomes `-`.
pub fn npm_pack_filename(name: &str, version: &str) -> String {
    let flat = name.trim_start_matches('@').replace('/', "-");
    format!("{flat}-{version}.tgz")
}
