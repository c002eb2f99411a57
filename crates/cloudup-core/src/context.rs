//! Task executor
//!
//! Runs a task map against a target: every task exactly once, never before
//! all of its dependencies have completed, with at most `jobs` tasks in
//! flight. The first failure stops new tasks from starting; tasks already
//! running are allowed to finish and nothing is rolled back.

use crate::error::{Error, Result, TaskError};
use crate::graph::DependencyGraph;
use crate::target::{Target, TargetKind};
use crate::task::{Task, TaskContext, TaskKey, TaskMap};
use cloudup_cloud::{Change, Plan, compute_change};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info};

pub const DEFAULT_JOBS: usize = 4;

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub target: TargetKind,
    /// Tasks in completion order
    pub executed: Vec<TaskKey>,
    pub plan: Plan,
    pub output_dir: Option<PathBuf>,
}

impl RunReport {
    pub fn has_changes(&self) -> bool {
        self.plan.has_changes()
    }
}

/// Binds a target and task collaborators for one run
#[derive(Debug)]
pub struct RunContext {
    target: Arc<Target>,
    task_context: Arc<TaskContext>,
    jobs: usize,
}

impl RunContext {
    pub fn new(target: Target, task_context: TaskContext) -> Self {
        Self {
            target: Arc::new(target),
            task_context: Arc::new(task_context),
            jobs: DEFAULT_JOBS,
        }
    }

    /// Bound on concurrently running tasks (at least one)
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Run every task, then finish the target
    #[tracing::instrument(skip_all, fields(target = %self.target.kind(), tasks = tasks.len()))]
    pub async fn run(&self, tasks: Arc<TaskMap>) -> Result<RunReport> {
        let executed = self.run_tasks(&tasks).await?;
        let plan = self.target.finish(&tasks).await?;
        info!(summary = %plan.summary(), "Run complete");
        Ok(RunReport {
            target: self.target.kind(),
            executed,
            plan,
            output_dir: self.target.output_dir(),
        })
    }

    /// Execute tasks in dependency order; returns keys in completion order
    pub async fn run_tasks(&self, tasks: &Arc<TaskMap>) -> Result<Vec<TaskKey>> {
        let graph = DependencyGraph::build(tasks)?;
        debug!(tasks = graph.len(), jobs = self.jobs, "Resolved dependency graph");

        let mut pending = graph.pending_counts();
        let mut ready: BTreeSet<TaskKey> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(key, _)| key.clone())
            .collect();

        let mut running: JoinSet<(TaskKey, std::result::Result<(), TaskError>)> = JoinSet::new();
        let mut in_flight: HashMap<tokio::task::Id, TaskKey> = HashMap::new();
        let mut executed = Vec::with_capacity(tasks.len());
        let mut failure: Option<Error> = None;

        loop {
            while failure.is_none() && running.len() < self.jobs {
                let Some(key) = ready.pop_first() else {
                    break;
                };
                let Some(task) = tasks.get(&key).cloned() else {
                    continue;
                };
                let target = Arc::clone(&self.target);
                let ctx = Arc::clone(&self.task_context);
                let spawned_key = key.clone();
                let handle = running.spawn(async move {
                    let result = execute(&target, &ctx, &spawned_key, task.as_ref()).await;
                    (spawned_key, result)
                });
                in_flight.insert(handle.id(), key);
            }

            let Some(joined) = running.join_next_with_id().await else {
                break;
            };

            match joined {
                Ok((id, (key, Ok(())))) => {
                    in_flight.remove(&id);
                    for dependent in graph.dependents_of(&key) {
                        if let Some(count) = pending.get_mut(dependent) {
                            *count -= 1;
                            if *count == 0 {
                                ready.insert(dependent.clone());
                            }
                        }
                    }
                    executed.push(key);
                }
                Ok((id, (key, Err(source)))) => {
                    in_flight.remove(&id);
                    tracing::error!(task = %key, error = %source, "Task failed");
                    failure.get_or_insert(Error::Execution { task: key, source });
                }
                Err(join_error) => {
                    let key = in_flight
                        .remove(&join_error.id())
                        .unwrap_or_else(|| TaskKey::new("unknown", "unknown"));
                    failure.get_or_insert(Error::Execution {
                        task: key,
                        source: TaskError::Panicked(join_error.to_string()),
                    });
                }
            }
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(executed),
        }
    }
}

async fn execute(
    target: &Target,
    ctx: &TaskContext,
    key: &TaskKey,
    task: &dyn Task,
) -> std::result::Result<(), TaskError> {
    let desired = task.desired()?;
    let change = if target.check_existing() {
        let live = task.find(ctx).await?;
        compute_change(&key.kind, &key.name, &desired, live.as_ref())
    } else {
        Change::create(&key.kind, &key.name, desired)
    };
    debug!(task = %key, change = %change.change_type, "Rendering task");
    target.render(task, change, ctx).await
}
