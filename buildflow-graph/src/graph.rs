//! DAG construction: derived edges, topological order, cycle detection.

use crate::error::GraphError;
use buildflow_types::task::TaskSpec;
use camino::Utf8PathBuf;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug)]
pub struct TaskGraph {
    tasks: Vec<TaskSpec>,
    index: HashMap<String, usize>,
    /// deps[i] = indices of tasks that task i depends on.
    deps: Vec<Vec<usize>>,
}

impl TaskGraph {
    /// Build a graph, deriving edges by matching declared produced paths
    /// (outputs and markers) to declared inputs. Rejects duplicate names
    /// and cycles up front.
    pub fn new(tasks: Vec<TaskSpec>) -> Result<Self, GraphError> {
        let mut index = HashMap::new();
        for (i, task) in tasks.iter().enumerate() {
            if index.insert(task.name.clone(), i).is_some() {
                return Err(GraphError::DuplicateTask(task.name.clone()));
            }
        }

        let mut producer: HashMap<&Utf8PathBuf, usize> = HashMap::new();
        for (i, task) in tasks.iter().enumerate() {
            for path in task.produced_paths() {
                producer.insert(path, i);
            }
        }

        let mut deps: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];
        for (i, task) in tasks.iter().enumerate() {
            let mut seen = BTreeSet::new();
            for input in &task.inputs {
                if let Some(&p) = producer.get(input) {
                    if p != i && seen.insert(p) {
                        deps[i].push(p);
                    }
                }
            }
            deps[i].sort_unstable();
        }

        let graph = Self { tasks, index, deps };
        graph.topo_order()?;
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&TaskSpec> {
        self.index.get(name).map(|&i| &self.tasks[i])
    }

    pub fn tasks(&self) -> &[TaskSpec] {
        &self.tasks
    }

    pub(crate) fn deps_of(&self, idx: usize) -> &[usize] {
        &self.deps[idx]
    }

    pub(crate) fn index_of(&self, name: &str) -> Result<usize, GraphError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownTask(name.to_string()))
    }

    /// Direct dependencies, by name.
    pub fn dependencies_of(&self, name: &str) -> Result<Vec<&str>, GraphError> {
        let idx = self.index_of(name)?;
        Ok(self.deps[idx]
            .iter()
            .map(|&d| self.tasks[d].name.as_str())
            .collect())
    }

    /// All derived edges as (dependency, dependent) name pairs.
    pub fn edges(&self) -> Vec<(&str, &str)> {
        let mut out = Vec::new();
        for (i, task) in self.tasks.iter().enumerate() {
            for &d in &self.deps[i] {
                out.push((self.tasks[d].name.as_str(), task.name.as_str()));
            }
        }
        out.sort_unstable();
        out
    }

    /// Deterministic topological order (name-ordered Kahn).
    pub fn topo_order(&self) -> Result<Vec<&TaskSpec>, GraphError> {
        let order = self.topo_indices(&(0..self.tasks.len()).collect::<Vec<_>>())?;
        Ok(order.into_iter().map(|i| &self.tasks[i]).collect())
    }

    /// The given tasks plus their transitive dependencies, in topological
    /// order.
    pub fn closure(&self, targets: &[String]) -> Result<Vec<usize>, GraphError> {
        let mut wanted = BTreeSet::new();
        let mut stack: Vec<usize> = targets
            .iter()
            .map(|t| self.index_of(t))
            .collect::<Result<_, _>>()?;

        while let Some(idx) = stack.pop() {
            if wanted.insert(idx) {
                stack.extend_from_slice(&self.deps[idx]);
            }
        }

        self.topo_indices(&wanted.into_iter().collect::<Vec<_>>())
    }

    /// Kahn's algorithm over a subset of nodes, ready set kept name-sorted
    /// for deterministic output.
    fn topo_indices(&self, subset: &[usize]) -> Result<Vec<usize>, GraphError> {
        let members: BTreeSet<usize> = subset.iter().copied().collect();
        let mut indegree: HashMap<usize, usize> = members
            .iter()
            .map(|&i| {
                let d = self.deps[i].iter().filter(|d| members.contains(d)).count();
                (i, d)
            })
            .collect();

        let mut ready: BTreeSet<(&str, usize)> = indegree
            .iter()
            .filter(|&(_, &d)| d == 0)
            .map(|(&i, _)| (self.tasks[i].name.as_str(), i))
            .collect();

        let mut order = Vec::with_capacity(members.len());
        while let Some(&(name, idx)) = ready.iter().next() {
            ready.remove(&(name, idx));
            order.push(idx);

            for (&j, deg) in indegree.iter_mut() {
                if *deg > 0 && self.deps[j].contains(&idx) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.insert((self.tasks[j].name.as_str(), j));
                    }
                }
            }
        }

        if order.len() != members.len() {
            let mut stuck: Vec<String> = members
                .iter()
                .filter(|i| !order.contains(i))
                .map(|&i| self.tasks[i].name.clone())
                .collect();
            stuck.sort();
            return Err(GraphError::Cycle { tasks: stuck });
        }

        Ok(order)
    }
}
