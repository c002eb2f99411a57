//! AWS resource kinds
//!
//! Every kind references other tasks by name only (`vpc: test.k8s.local`);
//! the reference becomes both a dependency edge and, in Terraform output, an
//! interpolation of the referenced resource's attribute.

pub mod autoscaling;
pub mod compute;
pub mod dns;
pub mod elb;
pub mod iam;
pub mod network;

use cloudup_core::{TaskContext, TaskKey};
use serde_json::{Map, Value};

/// Dependency on `kind/name`
pub(crate) fn dep(kind: &str, name: &str) -> TaskKey {
    TaskKey::new(kind, name)
}

/// Dependencies for an optional reference
pub(crate) fn opt_dep(kind: &str, name: Option<&String>) -> Option<TaskKey> {
    name.map(|n| dep(kind, n))
}

/// Standard tags put on every taggable resource
pub(crate) fn cluster_tags(ctx: &TaskContext, name: &str) -> Value {
    let mut tags = Map::new();
    tags.insert(
        "KubernetesCluster".into(),
        Value::String(ctx.cluster_name().to_string()),
    );
    tags.insert("Name".into(), Value::String(name.to_string()));
    Value::Object(tags)
}

/// Drop unset (null) top-level attributes from a resource block
pub(crate) fn compact(mut body: Value) -> Value {
    if let Value::Object(map) = &mut body {
        map.retain(|_, v| !v.is_null());
    }
    body
}
