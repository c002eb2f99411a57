//! Change types shared by every execution target

use crate::attributes::{Attributes, display_value};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Kind of change needed to converge one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// Resource does not exist yet
    Create,
    /// Resource exists but differs from the desired state
    Update,
    /// No changes needed
    NoOp,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeType::Create => write!(f, "create"),
            ChangeType::Update => write!(f, "update"),
            ChangeType::NoOp => write!(f, "no-op"),
        }
    }
}

/// One attribute that differs between live and desired state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    /// Live value, `None` when the live resource lacks the attribute
    pub from: Option<Value>,
    pub to: Value,
}

/// Planned change for a single task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    /// Resource kind (e.g. "vpc", "subnet")
    pub kind: String,

    /// Instance name
    pub name: String,

    pub change_type: ChangeType,

    /// Full desired state
    pub desired: Attributes,

    /// Differing attributes (empty for create and no-op)
    pub fields: Vec<FieldChange>,
}

impl Change {
    /// Change for a target that does not check existing state
    pub fn create(kind: impl Into<String>, name: impl Into<String>, desired: Attributes) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            change_type: ChangeType::Create,
            desired,
            fields: Vec::new(),
        }
    }

    /// `kind/name`
    pub fn key(&self) -> String {
        format!("{}/{}", self.kind, self.name)
    }

    pub fn is_noop(&self) -> bool {
        self.change_type == ChangeType::NoOp
    }
}

/// Compute the change converging `live` towards `desired`
///
/// Attributes present only on the live resource (ids, provider-assigned
/// fields) are ignored.
pub fn compute_change(
    kind: &str,
    name: &str,
    desired: &Attributes,
    live: Option<&Attributes>,
) -> Change {
    let Some(live) = live else {
        return Change::create(kind, name, desired.clone());
    };

    let fields: Vec<FieldChange> = desired
        .iter()
        .filter(|(field, value)| live.get(*field) != Some(*value))
        .map(|(field, value)| FieldChange {
            field: field.clone(),
            from: live.get(field).cloned(),
            to: value.clone(),
        })
        .collect();

    Change {
        kind: kind.to_string(),
        name: name.to_string(),
        change_type: if fields.is_empty() {
            ChangeType::NoOp
        } else {
            ChangeType::Update
        },
        desired: desired.clone(),
        fields,
    }
}

/// Plan containing the changes recorded during a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    pub changes: Vec<Change>,
}

impl Plan {
    pub fn new(mut changes: Vec<Change>) -> Self {
        // Execution order is nondeterministic under concurrency
        changes.sort_by(|a, b| (&a.kind, &a.name).cmp(&(&b.kind, &b.name)));
        Self { changes }
    }

    pub fn has_changes(&self) -> bool {
        self.changes.iter().any(|c| !c.is_noop())
    }

    /// Get changes by type
    pub fn changes_by_type(&self, change_type: ChangeType) -> Vec<&Change> {
        self.changes
            .iter()
            .filter(|c| c.change_type == change_type)
            .collect()
    }

    /// Find the change recorded for `kind/name`
    pub fn get(&self, kind: &str, name: &str) -> Option<&Change> {
        self.changes
            .iter()
            .find(|c| c.kind == kind && c.name == name)
    }

    /// Summary of the plan
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.changes_by_type(ChangeType::Create).len(),
            update: self.changes_by_type(ChangeType::Update).len(),
            no_change: self.changes_by_type(ChangeType::NoOp).len(),
        }
    }

    /// Human-readable plan grouped by resource kind
    pub fn render(&self) -> String {
        let mut out = String::new();

        let mut creates: BTreeMap<&str, Vec<&Change>> = BTreeMap::new();
        let mut updates: BTreeMap<&str, Vec<&Change>> = BTreeMap::new();
        for change in &self.changes {
            match change.change_type {
                ChangeType::Create => creates.entry(&change.kind).or_default().push(change),
                ChangeType::Update => updates.entry(&change.kind).or_default().push(change),
                ChangeType::NoOp => {}
            }
        }

        if !creates.is_empty() {
            out.push_str("Will create resources:\n");
            for (kind, changes) in &creates {
                let _ = writeln!(out, "  {kind}");
                for change in changes {
                    let _ = writeln!(out, "    {}", change.name);
                    for (field, value) in &change.desired {
                        let _ = writeln!(out, "      {field:<24} {}", display_value(value));
                    }
                }
            }
        }

        if !updates.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str("Will modify resources:\n");
            for (kind, changes) in &updates {
                let _ = writeln!(out, "  {kind}");
                for change in changes {
                    let _ = writeln!(out, "    {}", change.name);
                    for field in &change.fields {
                        let from = field
                            .from
                            .as_ref()
                            .map(display_value)
                            .unwrap_or_else(|| "<unset>".to_string());
                        let _ = writeln!(
                            out,
                            "      {:<24} {} -> {}",
                            field.field,
                            from,
                            display_value(&field.to)
                        );
                    }
                }
            }
        }

        if out.is_empty() {
            out.push_str("No changes need to be applied\n");
        }
        out
    }
}

/// Summary of planned changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub no_change: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} unchanged",
            self.create, self.update, self.no_change
        )
    }
}
