//! Dry-run target: compute the plan, touch nothing

use super::ChangeLog;
use crate::task::TaskMap;
use cloudup_cloud::{Change, Plan};

#[derive(Debug, Default)]
pub struct DryRunTarget {
    planned: ChangeLog,
}

impl DryRunTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn render(&self, change: Change) {
        tracing::debug!(task = %change.key(), change = %change.change_type, "Planned change");
        self.planned.record(change);
    }

    /// The recorded plan; `Plan::render` gives the grouped summary
    pub(crate) fn finish(&self, tasks: &TaskMap) -> Plan {
        let plan = self.planned.plan();
        tracing::info!(
            tasks = tasks.len(),
            pending = plan.has_changes(),
            summary = %plan.summary(),
            "Dry run complete"
        );
        plan
    }
}
