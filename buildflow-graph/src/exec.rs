//! Parallel executor: dispatches stale tasks to a bounded worker pool.

use crate::error::GraphError;
use crate::graph::TaskGraph;
use crate::state::{StateStore, TaskState};
use anyhow::{bail, Context};
use buildflow_types::run::{StaleReason, TaskResult, TaskStatus};
use buildflow_types::task::{Action, TaskSpec};
use camino::{Utf8Path, Utf8PathBuf};
use crossbeam_channel::unbounded;
use fs_err as fs;
use std::collections::{BTreeSet, HashMap};
use std::io::ErrorKind;
use std::process::Command;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Runs a task's process actions. Swapped out for a stub in tests.
pub trait ActionRunner: Send + Sync {
    fn run_process(
        &self,
        root: &Utf8Path,
        argv: &[String],
        cwd: Option<&Utf8Path>,
    ) -> anyhow::Result<()>;
}

/// Spawns the real process with inherited stdio. Relative `cwd` is resolved
/// under the repo root.
pub struct ShellActionRunner;

impl ActionRunner for ShellActionRunner {
    fn run_process(
        &self,
        root: &Utf8Path,
        argv: &[String],
        cwd: Option<&Utf8Path>,
    ) -> anyhow::Result<()> {
        let Some((program, args)) = argv.split_first() else {
            bail!("empty command line");
        };
        let dir = match cwd {
            Some(rel) => root.join(rel),
            None => root.to_owned(),
        };
        let status = Command::new(program)
            .args(args)
            .current_dir(dir.as_std_path())
            .status()
            .with_context(|| format!("spawn `{program}`"))?;
        if !status.success() {
            bail!("`{}` exited with {status}", argv.join(" "));
        }
        Ok(())
    }
}

type BuiltinFn = Box<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Named process-local callables a task can invoke as an action.
#[derive(Default)]
pub struct BuiltinRegistry {
    fns: HashMap<String, BuiltinFn>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.fns.insert(name.into(), Box::new(f));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fns.contains_key(name)
    }

    pub fn run(&self, name: &str) -> anyhow::Result<()> {
        match self.fns.get(name) {
            Some(f) => f(),
            None => bail!("unknown builtin '{name}'"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExecOptions {
    /// Worker threads. Stale tasks whose dependencies have settled run
    /// concurrently up to this bound.
    pub jobs: usize,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self { jobs: 1 }
    }
}

struct Job {
    idx: usize,
    task: TaskSpec,
    reason: StaleReason,
}

struct Done {
    idx: usize,
    reason: StaleReason,
    outcome: Result<TaskState, String>,
    duration_ms: u64,
}

/// Drives one run over a target closure: freshness is judged per task at
/// dispatch time, after its dependencies have settled.
pub struct Executor {
    root: Utf8PathBuf,
    runner: Box<dyn ActionRunner>,
    builtins: BuiltinRegistry,
    options: ExecOptions,
}

impl Executor {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            runner: Box::new(ShellActionRunner),
            builtins: BuiltinRegistry::new(),
            options: ExecOptions::default(),
        }
    }

    pub fn with_runner(mut self, runner: Box<dyn ActionRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_builtins(mut self, builtins: BuiltinRegistry) -> Self {
        self.builtins = builtins;
        self
    }

    pub fn with_options(mut self, options: ExecOptions) -> Self {
        self.options = options;
        self
    }

    /// Run `targets` and their transitive dependencies. Results come back
    /// in resolution order; the store is updated as tasks complete.
    pub fn run(
        &self,
        graph: &TaskGraph,
        targets: &[String],
        store: &mut StateStore,
    ) -> Result<Vec<TaskResult>, GraphError> {
        let selected = graph.closure(targets)?;
        self.validate_builtins(graph, &selected)?;

        let members: BTreeSet<usize> = selected.iter().copied().collect();
        let mut remaining: HashMap<usize, usize> = members
            .iter()
            .map(|&i| {
                let d = graph
                    .deps_of(i)
                    .iter()
                    .filter(|d| members.contains(d))
                    .count();
                (i, d)
            })
            .collect();
        let mut dependents: HashMap<usize, Vec<usize>> = HashMap::new();
        for &i in &members {
            for &d in graph.deps_of(i) {
                if members.contains(&d) {
                    dependents.entry(d).or_default().push(i);
                }
            }
        }

        // Name-ordered so single-job runs are deterministic.
        let mut ready: BTreeSet<(String, usize)> = remaining
            .iter()
            .filter(|&(_, &d)| d == 0)
            .map(|(&i, _)| (graph.tasks()[i].name.clone(), i))
            .collect();

        let jobs = self.options.jobs.max(1);
        let (job_tx, job_rx) = unbounded::<Job>();
        let (done_tx, done_rx) = unbounded::<Done>();

        std::thread::scope(|scope| -> Result<Vec<TaskResult>, GraphError> {
            for _ in 0..jobs {
                let job_rx = job_rx.clone();
                let done_tx = done_tx.clone();
                scope.spawn(move || {
                    for job in job_rx.iter() {
                        let started = Instant::now();
                        let outcome = self
                            .execute(&job.task)
                            .map_err(|err| format!("{err:#}"));
                        let _ = done_tx.send(Done {
                            idx: job.idx,
                            reason: job.reason,
                            outcome,
                            duration_ms: started.elapsed().as_millis() as u64,
                        });
                    }
                });
            }
            drop(done_tx);

            let mut results = Vec::with_capacity(members.len());
            let mut blocked: BTreeSet<usize> = BTreeSet::new();
            let mut completed = 0usize;
            let mut in_flight = 0usize;

            while completed < members.len() {
                while let Some((name, idx)) = ready.iter().next().cloned() {
                    ready.remove(&(name.clone(), idx));
                    let task = &graph.tasks()[idx];

                    if blocked.contains(&idx) {
                        results.push(TaskResult {
                            name: name.clone(),
                            status: TaskStatus::Blocked,
                            reason: None,
                            duration_ms: None,
                            message: Some("upstream task failed".to_string()),
                        });
                        completed += 1;
                        Self::release(idx, &dependents, &mut remaining, &mut ready, graph);
                        Self::block_dependents(idx, &dependents, &mut blocked);
                        continue;
                    }

                    match store.staleness(&self.root, task)? {
                        None => {
                            debug!(task = %name, "fresh, skipping");
                            results.push(TaskResult {
                                name: name.clone(),
                                status: TaskStatus::Fresh,
                                reason: None,
                                duration_ms: None,
                                message: None,
                            });
                            completed += 1;
                            Self::release(idx, &dependents, &mut remaining, &mut ready, graph);
                        }
                        Some(reason) => {
                            info!(task = %name, ?reason, "running");
                            job_tx
                                .send(Job {
                                    idx,
                                    task: task.clone(),
                                    reason,
                                })
                                .ok();
                            in_flight += 1;
                        }
                    }
                }

                if in_flight == 0 {
                    break;
                }

                let done = done_rx.recv().map_err(|_| {
                    GraphError::Io(anyhow::anyhow!("worker pool hung up"))
                })?;
                in_flight -= 1;
                completed += 1;
                let name = graph.tasks()[done.idx].name.clone();
                match done.outcome {
                    Ok(state) => {
                        store.record(&name, state);
                        results.push(TaskResult {
                            name,
                            status: TaskStatus::Ran,
                            reason: Some(done.reason),
                            duration_ms: Some(done.duration_ms),
                            message: None,
                        });
                        Self::release(
                            done.idx,
                            &dependents,
                            &mut remaining,
                            &mut ready,
                            graph,
                        );
                    }
                    Err(message) => {
                        warn!(task = %name, %message, "task failed");
                        results.push(TaskResult {
                            name,
                            status: TaskStatus::Failed,
                            reason: Some(done.reason),
                            duration_ms: Some(done.duration_ms),
                            message: Some(message),
                        });
                        Self::block_dependents(done.idx, &dependents, &mut blocked);
                        Self::release(
                            done.idx,
                            &dependents,
                            &mut remaining,
                            &mut ready,
                            graph,
                        );
                    }
                }
            }

            drop(job_tx);
            Ok(results)
        })
    }

    fn validate_builtins(
        &self,
        graph: &TaskGraph,
        selected: &[usize],
    ) -> Result<(), GraphError> {
        for &idx in selected {
            let task = &graph.tasks()[idx];
            for action in &task.actions {
                if let Action::Builtin { name } = action {
                    if !self.builtins.contains(name) {
                        return Err(GraphError::UnknownBuiltin {
                            task: task.name.clone(),
                            builtin: name.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn release(
        idx: usize,
        dependents: &HashMap<usize, Vec<usize>>,
        remaining: &mut HashMap<usize, usize>,
        ready: &mut BTreeSet<(String, usize)>,
        graph: &TaskGraph,
    ) {
        if let Some(next) = dependents.get(&idx) {
            for &j in next {
                if let Some(deg) = remaining.get_mut(&j) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.insert((graph.tasks()[j].name.clone(), j));
                    }
                }
            }
        }
    }

    fn block_dependents(
        idx: usize,
        dependents: &HashMap<usize, Vec<usize>>,
        blocked: &mut BTreeSet<usize>,
    ) {
        let mut stack = vec![idx];
        while let Some(i) = stack.pop() {
            if let Some(next) = dependents.get(&i) {
                for &j in next {
                    if blocked.insert(j) {
                        stack.push(j);
                    }
                }
            }
        }
    }

    /// Marker protocol: delete before the actions, write zero bytes after
    /// all of them succeed. A failure mid-way leaves no marker, so the task
    /// stays stale.
    fn execute(&self, task: &TaskSpec) -> anyhow::Result<TaskState> {
        if let Some(marker) = &task.marker {
            let abs = self.root.join(marker);
            match fs::remove_file(abs.as_std_path()) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err).with_context(|| format!("remove {abs}")),
            }
        }

        for action in &task.actions {
            match action {
                Action::Process { argv, cwd } => {
                    self.runner.run_process(&self.root, argv, cwd.as_deref())?;
                }
                Action::Builtin { name } => {
                    self.builtins
                        .run(name)
                        .with_context(|| format!("builtin '{name}'"))?;
                }
            }
        }

        if let Some(marker) = &task.marker {
            let abs = self.root.join(marker);
            if let Some(parent) = abs.parent() {
                fs::create_dir_all(parent.as_std_path())
                    .with_context(|| format!("create {parent}"))?;
            }
            fs::write(abs.as_std_path(), b"").with_context(|| format!("write {abs}"))?;
        }

        TaskState::capture(&self.root, task)
    }
}
