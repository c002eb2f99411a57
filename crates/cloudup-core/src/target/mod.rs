//! Execution targets
//!
//! A target decides what rendering a task means: mutating the provider
//! (Direct), recording the change only (DryRun) or appending a resource
//! block to generated configuration (Terraform). All three record the same
//! [`Change`] values, so their plans can be compared directly.

pub mod direct;
pub mod dryrun;
pub mod terraform;

pub use direct::DirectTarget;
pub use dryrun::DryRunTarget;
pub use terraform::{TerraformOutput, TerraformProvider, TerraformTarget, tf_name, tf_ref};

use crate::error::{ConfigError, Result, TaskError};
use crate::task::{Task, TaskContext, TaskMap};
use cloudup_cloud::{Change, Plan};
use std::path::PathBuf;
use std::sync::Mutex;

/// Target selector, parsed from `--target`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Direct,
    DryRun,
    Terraform,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Direct => "direct",
            TargetKind::DryRun => "dryrun",
            TargetKind::Terraform => "terraform",
        }
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TargetKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "direct" => Ok(TargetKind::Direct),
            "dryrun" | "dry-run" => Ok(TargetKind::DryRun),
            "terraform" => Ok(TargetKind::Terraform),
            other => Err(ConfigError::InvalidValue {
                field: "target",
                message: format!("unsupported target type {other:?} (direct, dryrun, terraform)"),
            }),
        }
    }
}

/// Backend realizing a task map, selected once per run
#[derive(Debug)]
pub enum Target {
    Direct(DirectTarget),
    DryRun(DryRunTarget),
    Terraform(TerraformTarget),
}

impl Target {
    pub fn kind(&self) -> TargetKind {
        match self {
            Target::Direct(_) => TargetKind::Direct,
            Target::DryRun(_) => TargetKind::DryRun,
            Target::Terraform(_) => TargetKind::Terraform,
        }
    }

    /// Whether tasks reconcile against live state before rendering
    pub fn check_existing(&self) -> bool {
        match self {
            Target::Direct(_) | Target::DryRun(_) => true,
            Target::Terraform(_) => false,
        }
    }

    /// Render one task with its computed change
    pub async fn render(
        &self,
        task: &dyn Task,
        change: Change,
        ctx: &TaskContext,
    ) -> std::result::Result<(), TaskError> {
        match self {
            Target::Direct(target) => target.render(task, change, ctx).await,
            Target::DryRun(target) => {
                target.render(change);
                Ok(())
            }
            Target::Terraform(target) => target.render(task, change, ctx).await,
        }
    }

    /// Flush aggregate output once every task has succeeded
    pub async fn finish(&self, tasks: &TaskMap) -> Result<Plan> {
        match self {
            Target::Direct(target) => Ok(target.finish(tasks)),
            Target::DryRun(target) => Ok(target.finish(tasks)),
            Target::Terraform(target) => target.finish(tasks).await,
        }
    }

    /// Directory holding generated output, if the target writes any
    pub fn output_dir(&self) -> Option<PathBuf> {
        match self {
            Target::Terraform(target) => Some(target.output_dir().to_path_buf()),
            Target::Direct(_) | Target::DryRun(_) => None,
        }
    }
}

/// Changes recorded while rendering, in completion order
#[derive(Debug, Default)]
pub(crate) struct ChangeLog {
    changes: Mutex<Vec<Change>>,
}

impl ChangeLog {
    pub(crate) fn record(&self, change: Change) {
        match self.changes.lock() {
            Ok(mut changes) => changes.push(change),
            Err(poisoned) => poisoned.into_inner().push(change),
        }
    }

    pub(crate) fn plan(&self) -> Plan {
        let changes = match self.changes.lock() {
            Ok(changes) => changes.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        Plan::new(changes)
    }
}
