//! Direct target: converge the provider through its control plane

use super::ChangeLog;
use crate::error::TaskError;
use crate::task::{Task, TaskContext, TaskMap};
use cloudup_cloud::{Change, Plan};

/// Applies every create/update as it is rendered
///
/// A rejected change fails the task; changes applied before it stay in
/// place.
#[derive(Debug, Default)]
pub struct DirectTarget {
    applied: ChangeLog,
}

impl DirectTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn render(
        &self,
        task: &dyn Task,
        change: Change,
        ctx: &TaskContext,
    ) -> Result<(), TaskError> {
        if !change.is_noop() {
            tracing::info!(task = %change.key(), change = %change.change_type, "Applying change");
            task.apply(ctx, &change).await?;
        }
        self.applied.record(change);
        Ok(())
    }

    pub(crate) fn finish(&self, tasks: &TaskMap) -> Plan {
        let plan = self.applied.plan();
        tracing::info!(tasks = tasks.len(), summary = %plan.summary(), "Applied changes");
        plan
    }
}
