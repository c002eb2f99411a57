//! Dependency graph over task identities

use crate::error::DependencyError;
use crate::task::{TaskKey, TaskMap};
use std::collections::{BTreeMap, BTreeSet};

/// Validated, acyclic dependency graph
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// task → tasks it depends on
    dependencies: BTreeMap<TaskKey, BTreeSet<TaskKey>>,
    /// task → tasks depending on it
    dependents: BTreeMap<TaskKey, BTreeSet<TaskKey>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

impl DependencyGraph {
    /// Build the graph, rejecting missing dependencies and cycles
    pub fn build(tasks: &TaskMap) -> Result<Self, DependencyError> {
        let mut dependencies: BTreeMap<TaskKey, BTreeSet<TaskKey>> = BTreeMap::new();
        let mut dependents: BTreeMap<TaskKey, BTreeSet<TaskKey>> = BTreeMap::new();

        for (key, task) in tasks.iter() {
            let deps = dependencies.entry(key.clone()).or_default();
            dependents.entry(key.clone()).or_default();
            for dependency in task.dependencies() {
                if !tasks.contains(&dependency) {
                    return Err(DependencyError::MissingDependency {
                        task: key.clone(),
                        dependency,
                    });
                }
                deps.insert(dependency);
            }
        }
        for (key, deps) in &dependencies {
            for dependency in deps {
                dependents
                    .entry(dependency.clone())
                    .or_default()
                    .insert(key.clone());
            }
        }

        let graph = Self {
            dependencies,
            dependents,
        };
        graph.check_acyclic()?;
        Ok(graph)
    }

    fn check_acyclic(&self) -> Result<(), DependencyError> {
        let mut marks: BTreeMap<&TaskKey, Mark> = BTreeMap::new();
        let mut path: Vec<&TaskKey> = Vec::new();
        for key in self.dependencies.keys() {
            self.visit(key, &mut marks, &mut path)?;
        }
        Ok(())
    }

    fn visit<'a>(
        &'a self,
        key: &'a TaskKey,
        marks: &mut BTreeMap<&'a TaskKey, Mark>,
        path: &mut Vec<&'a TaskKey>,
    ) -> Result<(), DependencyError> {
        match marks.get(key) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                // `key` is on the current path: the cycle runs from there back to it
                let start = path.iter().position(|k| *k == key).unwrap_or(0);
                let mut cycle: Vec<TaskKey> = path[start..].iter().map(|k| (*k).clone()).collect();
                cycle.push(key.clone());
                return Err(DependencyError::Cycle(cycle));
            }
            None => {}
        }

        marks.insert(key, Mark::Visiting);
        path.push(key);
        if let Some(deps) = self.dependencies.get(key) {
            for dependency in deps {
                self.visit(dependency, marks, path)?;
            }
        }
        path.pop();
        marks.insert(key, Mark::Done);
        Ok(())
    }

    pub fn dependencies_of(&self, key: &TaskKey) -> impl Iterator<Item = &TaskKey> {
        self.dependencies.get(key).into_iter().flatten()
    }

    pub fn dependents_of(&self, key: &TaskKey) -> impl Iterator<Item = &TaskKey> {
        self.dependents.get(key).into_iter().flatten()
    }

    /// Number of unresolved dependencies per task
    pub fn pending_counts(&self) -> BTreeMap<TaskKey, usize> {
        self.dependencies
            .iter()
            .map(|(key, deps)| (key.clone(), deps.len()))
            .collect()
    }

    /// A deterministic topological order (dependencies first)
    pub fn topological_order(&self) -> Vec<TaskKey> {
        let mut pending = self.pending_counts();
        let mut ready: BTreeSet<TaskKey> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(key, _)| key.clone())
            .collect();

        let mut order = Vec::with_capacity(pending.len());
        while let Some(key) = ready.pop_first() {
            for dependent in self.dependents_of(&key) {
                if let Some(count) = pending.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(dependent.clone());
                    }
                }
            }
            order.push(key);
        }
        order
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }
}
