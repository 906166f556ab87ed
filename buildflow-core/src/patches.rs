//! The drawio source patches applied before webpacking.

use crate::project::APP_MIN_JS_REL;
use buildflow_types::patch::PatchSpec;

/// Anchored edits to the vendored `app.min.js`, applied against a pristine
/// checkout every run. Paths are relative to the vendor root.
pub fn drawio_patches() -> Vec<PatchSpec> {
    vec![
        PatchSpec {
            file: APP_MIN_JS_REL.into(),
            name: "global ref so the App is reachable at runtime".to_string(),
            before: "b=null!=e?e():new App(new Editor".to_string(),
            after: "\nwindow.JUPYTERLAB_DRAWIO_APP = b=null!=e?e():new App(new Editor"
                .to_string(),
        },
        PatchSpec {
            file: APP_MIN_JS_REL.into(),
            name: "plugin path so this can be hosted on non-root".to_string(),
            before: r#";window.PLUGINS_BASE_PATH=window.PLUGINS_BASE_PATH||"";"#.to_string(),
            after: r#";window.PLUGINS_BASE_PATH=window.PLUGINS_BASE_PATH||".";"#.to_string(),
        },
    ]
}
