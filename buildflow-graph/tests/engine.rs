//! End-to-end engine tests: real temp trees, builtin actions, stub process
//! runner.

use buildflow_graph::{
    ActionRunner, BuiltinRegistry, ExecOptions, Executor, GraphError, StateStore, TaskGraph,
};
use buildflow_types::run::{StaleReason, TaskStatus};
use buildflow_types::task::{Action, TaskSpec};
use camino::{Utf8Path, Utf8PathBuf};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn temp_root() -> (TempDir, Utf8PathBuf) {
    let temp = TempDir::new().expect("temp dir");
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8");
    (temp, root)
}

fn status_of(results: &[buildflow_types::run::TaskResult], name: &str) -> TaskStatus {
    results
        .iter()
        .find(|r| r.name == name)
        .unwrap_or_else(|| panic!("no result for '{name}'"))
        .status
}

/// Records argv instead of spawning anything. Fails any command whose
/// program name matches `fail_on`.
struct RecordingRunner {
    calls: Arc<Mutex<Vec<Vec<String>>>>,
    fail_on: Option<String>,
}

impl ActionRunner for RecordingRunner {
    fn run_process(
        &self,
        _root: &Utf8Path,
        argv: &[String],
        _cwd: Option<&Utf8Path>,
    ) -> anyhow::Result<()> {
        self.calls.lock().expect("lock").push(argv.to_vec());
        if self.fail_on.as_deref() == Some(argv[0].as_str()) {
            anyhow::bail!("simulated failure");
        }
        Ok(())
    }
}

/// A builtin that copies `src` to `dst` under the root and bumps a counter.
fn copy_builtin(
    root: &Utf8Path,
    src: &str,
    dst: &str,
    counter: Arc<AtomicUsize>,
) -> impl Fn() -> anyhow::Result<()> + Send + Sync + 'static {
    let src = root.join(src);
    let dst = root.join(dst);
    move || {
        counter.fetch_add(1, Ordering::SeqCst);
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent.as_std_path())?;
        }
        let bytes = std::fs::read(src.as_std_path())?;
        std::fs::write(dst.as_std_path(), bytes)?;
        Ok(())
    }
}

#[test]
fn second_run_is_all_fresh() {
    let (_temp, root) = temp_root();
    std::fs::write(root.join("in.txt").as_std_path(), "v1").expect("write input");

    let count = Arc::new(AtomicUsize::new(0));
    let mut builtins = BuiltinRegistry::new();
    builtins.register(
        "copy",
        copy_builtin(&root, "in.txt", "out.txt", count.clone()),
    );

    let graph = TaskGraph::new(vec![TaskSpec::new("copy")
        .input("in.txt")
        .output("out.txt")
        .marker("build/copy.ok")
        .action(Action::builtin("copy"))])
    .expect("graph");

    let executor = Executor::new(root.clone()).with_builtins(builtins);
    let mut store = StateStore::load(&root.join("build/.state.json"));

    let first = executor
        .run(&graph, &["copy".to_string()], &mut store)
        .expect("first run");
    assert_eq!(status_of(&first, "copy"), TaskStatus::Ran);
    assert_eq!(first[0].reason, Some(StaleReason::NeverRun));
    assert!(root.join("build/copy.ok").as_std_path().exists());

    let second = executor
        .run(&graph, &["copy".to_string()], &mut store)
        .expect("second run");
    assert_eq!(status_of(&second, "copy"), TaskStatus::Fresh);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn changed_input_reruns_the_chain() {
    let (_temp, root) = temp_root();
    std::fs::write(root.join("in.txt").as_std_path(), "v1").expect("write input");

    let first_count = Arc::new(AtomicUsize::new(0));
    let second_count = Arc::new(AtomicUsize::new(0));
    let mut builtins = BuiltinRegistry::new();
    builtins.register(
        "stage",
        copy_builtin(&root, "in.txt", "mid.txt", first_count.clone()),
    );
    builtins.register(
        "finish",
        copy_builtin(&root, "mid.txt", "out.txt", second_count.clone()),
    );

    let graph = TaskGraph::new(vec![
        TaskSpec::new("stage")
            .input("in.txt")
            .output("mid.txt")
            .action(Action::builtin("stage")),
        TaskSpec::new("finish")
            .input("mid.txt")
            .output("out.txt")
            .action(Action::builtin("finish")),
    ])
    .expect("graph");

    let executor = Executor::new(root.clone()).with_builtins(builtins);
    let mut store = StateStore::load(&root.join("build/.state.json"));

    executor
        .run(&graph, &["finish".to_string()], &mut store)
        .expect("first run");
    assert_eq!(first_count.load(Ordering::SeqCst), 1);
    assert_eq!(second_count.load(Ordering::SeqCst), 1);

    std::fs::write(root.join("in.txt").as_std_path(), "v2").expect("change input");
    let results = executor
        .run(&graph, &["finish".to_string()], &mut store)
        .expect("second run");
    assert_eq!(status_of(&results, "stage"), TaskStatus::Ran);
    // "finish" sees the rewritten mid.txt only because staleness is judged
    // after "stage" completes, not at the start of the run.
    assert_eq!(status_of(&results, "finish"), TaskStatus::Ran);
    assert_eq!(
        std::fs::read_to_string(root.join("out.txt").as_std_path()).expect("read"),
        "v2"
    );
}

#[test]
fn upstream_rewrite_with_same_content_keeps_downstream_fresh() {
    let (_temp, root) = temp_root();
    std::fs::write(root.join("in.txt").as_std_path(), "v1").expect("write input");

    let mut builtins = BuiltinRegistry::new();
    builtins.register(
        "stage",
        copy_builtin(&root, "in.txt", "mid.txt", Arc::new(AtomicUsize::new(0))),
    );
    let finish_count = Arc::new(AtomicUsize::new(0));
    builtins.register(
        "finish",
        copy_builtin(&root, "mid.txt", "out.txt", finish_count.clone()),
    );

    let graph = TaskGraph::new(vec![
        TaskSpec::new("stage")
            .input("in.txt")
            .output("mid.txt")
            .always_stale()
            .action(Action::builtin("stage")),
        TaskSpec::new("finish")
            .input("mid.txt")
            .output("out.txt")
            .action(Action::builtin("finish")),
    ])
    .expect("graph");

    let executor = Executor::new(root.clone()).with_builtins(builtins);
    let mut store = StateStore::load(&root.join("build/.state.json"));

    executor
        .run(&graph, &["finish".to_string()], &mut store)
        .expect("first run");
    let results = executor
        .run(&graph, &["finish".to_string()], &mut store)
        .expect("second run");

    // "stage" always reruns but rewrote identical bytes, so "finish" stays
    // fresh under content hashing.
    assert_eq!(status_of(&results, "stage"), TaskStatus::Ran);
    assert_eq!(status_of(&results, "finish"), TaskStatus::Fresh);
    assert_eq!(finish_count.load(Ordering::SeqCst), 1);
}

#[test]
fn failure_leaves_no_marker_and_blocks_downstream() {
    let (_temp, root) = temp_root();

    let mut builtins = BuiltinRegistry::new();
    builtins.register("boom", || anyhow::bail!("deliberate"));
    builtins.register("after", || Ok(()));

    let graph = TaskGraph::new(vec![
        TaskSpec::new("bad")
            .marker("build/bad.ok")
            .action(Action::builtin("boom")),
        TaskSpec::new("after")
            .input("build/bad.ok")
            .marker("build/after.ok")
            .action(Action::builtin("after")),
    ])
    .expect("graph");

    let executor = Executor::new(root.clone()).with_builtins(builtins);
    let mut store = StateStore::load(&root.join("build/.state.json"));

    let results = executor
        .run(&graph, &["after".to_string()], &mut store)
        .expect("run");
    assert_eq!(status_of(&results, "bad"), TaskStatus::Failed);
    assert_eq!(status_of(&results, "after"), TaskStatus::Blocked);
    assert!(!root.join("build/bad.ok").as_std_path().exists());
    assert!(!root.join("build/after.ok").as_std_path().exists());
    assert!(store.get("bad").is_none());
}

#[test]
fn fingerprint_change_forces_a_rerun() {
    let (_temp, root) = temp_root();

    let count = Arc::new(AtomicUsize::new(0));
    let spec = |fp: &str| {
        TaskGraph::new(vec![TaskSpec::new("lab")
            .marker("build/lab.ok")
            .fingerprint(fp)
            .action(Action::builtin("noop"))])
        .expect("graph")
    };

    let mut store = StateStore::load(&root.join("build/.state.json"));
    let make_executor = || {
        let mut builtins = BuiltinRegistry::new();
        let c = count.clone();
        builtins.register("noop", move || {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        Executor::new(root.clone()).with_builtins(builtins)
    };

    make_executor()
        .run(&spec("ext-a"), &["lab".to_string()], &mut store)
        .expect("first");
    let fresh = make_executor()
        .run(&spec("ext-a"), &["lab".to_string()], &mut store)
        .expect("unchanged");
    assert_eq!(status_of(&fresh, "lab"), TaskStatus::Fresh);

    let results = make_executor()
        .run(&spec("ext-a,ext-b"), &["lab".to_string()], &mut store)
        .expect("changed");
    assert_eq!(status_of(&results, "lab"), TaskStatus::Ran);
    assert_eq!(results[0].reason, Some(StaleReason::FingerprintChanged));
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[test]
fn vendor_refresh_reruns_its_consumers_through_the_fingerprint() {
    let (_temp, root) = temp_root();

    // "patch" consumes the vendor tree but only depends on the checkout
    // marker, whose bytes never change; the shared fingerprint is what
    // carries "the checkout moved" downstream.
    let graph_for = |fp: &str| {
        TaskGraph::new(vec![
            TaskSpec::new("checkout")
                .marker("build/checkout.ok")
                .fingerprint(fp)
                .action(Action::builtin("checkout")),
            TaskSpec::new("patch")
                .input("build/checkout.ok")
                .output("vendor/app.patched.js")
                .marker("build/patch.ok")
                .fingerprint(fp)
                .action(Action::builtin("patch")),
        ])
        .expect("graph")
    };

    let executor_for = |upstream: &str| {
        let mut builtins = BuiltinRegistry::new();
        let src = root.join("vendor/app.js");
        let upstream = upstream.to_string();
        {
            let src = src.clone();
            builtins.register("checkout", move || {
                std::fs::create_dir_all(src.parent().expect("parent").as_std_path())?;
                std::fs::write(src.as_std_path(), &upstream)?;
                Ok(())
            });
        }
        let dst = root.join("vendor/app.patched.js");
        builtins.register("patch", move || {
            let text = std::fs::read_to_string(src.as_std_path())?;
            std::fs::write(dst.as_std_path(), text.replace("upstream", "patched"))?;
            Ok(())
        });
        Executor::new(root.clone()).with_builtins(builtins)
    };

    let mut store = StateStore::load(&root.join("build/.state.json"));
    executor_for("upstream v1")
        .run(&graph_for("rev-1"), &["patch".to_string()], &mut store)
        .expect("first run");
    assert_eq!(
        std::fs::read_to_string(root.join("vendor/app.patched.js").as_std_path())
            .expect("read"),
        "patched v1"
    );

    let results = executor_for("upstream v2")
        .run(&graph_for("rev-2"), &["patch".to_string()], &mut store)
        .expect("second run");
    assert_eq!(status_of(&results, "checkout"), TaskStatus::Ran);
    assert_eq!(status_of(&results, "patch"), TaskStatus::Ran);
    assert_eq!(
        std::fs::read_to_string(root.join("vendor/app.patched.js").as_std_path())
            .expect("read"),
        "patched v2"
    );
}

#[test]
fn targets_limit_the_run_to_their_closure() {
    let (_temp, root) = temp_root();

    let touched = Arc::new(Mutex::new(Vec::<String>::new()));
    let mut builtins = BuiltinRegistry::new();
    for name in ["a", "b", "unrelated"] {
        let touched = touched.clone();
        builtins.register(name, move || {
            touched.lock().expect("lock").push(name.to_string());
            Ok(())
        });
    }

    let graph = TaskGraph::new(vec![
        TaskSpec::new("a").marker("build/a.ok").action(Action::builtin("a")),
        TaskSpec::new("b")
            .input("build/a.ok")
            .marker("build/b.ok")
            .action(Action::builtin("b")),
        TaskSpec::new("unrelated")
            .marker("build/unrelated.ok")
            .action(Action::builtin("unrelated")),
    ])
    .expect("graph");

    let executor = Executor::new(root.clone()).with_builtins(builtins);
    let mut store = StateStore::load(&root.join("build/.state.json"));
    let results = executor
        .run(&graph, &["b".to_string()], &mut store)
        .expect("run");

    assert_eq!(results.len(), 2);
    assert_eq!(*touched.lock().expect("lock"), vec!["a", "b"]);
}

#[test]
fn unknown_builtin_is_rejected_before_anything_runs() {
    let (_temp, root) = temp_root();

    let graph = TaskGraph::new(vec![
        TaskSpec::new("first").marker("build/first.ok").action(Action::builtin("missing")),
        TaskSpec::new("second")
            .input("build/first.ok")
            .action(Action::builtin("also-missing")),
    ])
    .expect("graph");

    let executor = Executor::new(root.clone());
    let mut store = StateStore::load(&root.join("build/.state.json"));
    let err = executor
        .run(&graph, &["second".to_string()], &mut store)
        .expect_err("unknown builtin");
    assert!(matches!(err, GraphError::UnknownBuiltin { .. }));
    assert!(!root.join("build/first.ok").as_std_path().exists());
}

#[test]
fn process_actions_go_through_the_runner() {
    let (_temp, root) = temp_root();

    let calls = Arc::new(Mutex::new(Vec::new()));
    let runner = RecordingRunner {
        calls: calls.clone(),
        fail_on: None,
    };

    let graph = TaskGraph::new(vec![TaskSpec::new("setup:js")
        .marker("build/setup.ok")
        .action(Action::process(["jlpm", "--prefer-offline"]))
        .action(Action::process(["jlpm", "build"]))])
    .expect("graph");

    let executor = Executor::new(root.clone()).with_runner(Box::new(runner));
    let mut store = StateStore::load(&root.join("build/.state.json"));
    executor
        .run(&graph, &["setup:js".to_string()], &mut store)
        .expect("run");

    let calls = calls.lock().expect("lock");
    assert_eq!(
        *calls,
        vec![
            vec!["jlpm".to_string(), "--prefer-offline".to_string()],
            vec!["jlpm".to_string(), "build".to_string()],
        ]
    );
}

#[test]
fn failing_process_fails_the_task() {
    let (_temp, root) = temp_root();

    let runner = RecordingRunner {
        calls: Arc::new(Mutex::new(Vec::new())),
        fail_on: Some("eslint".to_string()),
    };

    let graph = TaskGraph::new(vec![TaskSpec::new("lint")
        .marker("build/lint.ok")
        .action(Action::process(["eslint", "--ext", ".js", "src"]))])
    .expect("graph");

    let executor = Executor::new(root.clone()).with_runner(Box::new(runner));
    let mut store = StateStore::load(&root.join("build/.state.json"));
    let results = executor
        .run(&graph, &["lint".to_string()], &mut store)
        .expect("run completes");

    assert_eq!(status_of(&results, "lint"), TaskStatus::Failed);
    assert!(results[0].message.as_deref().expect("message").contains("simulated"));
}

#[test]
fn independent_tasks_complete_with_parallel_workers() {
    let (_temp, root) = temp_root();

    let count = Arc::new(AtomicUsize::new(0));
    let mut builtins = BuiltinRegistry::new();
    for name in ["p", "q", "r", "s"] {
        let c = count.clone();
        builtins.register(name, move || {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }

    let graph = TaskGraph::new(
        ["p", "q", "r", "s"]
            .into_iter()
            .map(|n| {
                TaskSpec::new(n)
                    .marker(format!("build/{n}.ok"))
                    .action(Action::builtin(n))
            })
            .collect(),
    )
    .expect("graph");

    let executor = Executor::new(root.clone())
        .with_builtins(builtins)
        .with_options(ExecOptions { jobs: 4 });
    let mut store = StateStore::load(&root.join("build/.state.json"));
    let targets: Vec<String> = ["p", "q", "r", "s"].iter().map(|s| s.to_string()).collect();
    let results = executor.run(&graph, &targets, &mut store).expect("run");

    assert_eq!(results.len(), 4);
    assert_eq!(count.load(Ordering::SeqCst), 4);
    for name in ["p", "q", "r", "s"] {
        assert_eq!(status_of(&results, name), TaskStatus::Ran);
        assert!(root.join(format!("build/{name}.ok")).as_std_path().exists());
    }
}
