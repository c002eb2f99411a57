//! GCE resource kinds

pub mod compute;
pub mod network;

use cloudup_core::TerraformOutput;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const MAX_GCE_NAME: usize = 63;

/// GCE-side resource name: lower-case alphanumerics and hyphens, at most 63
pub fn gce_name(name: &str) -> String {
    let mut sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    sanitized.truncate(MAX_GCE_NAME);
    sanitized.trim_end_matches('-').to_string()
}

/// Metadata map; every value is written as an auxiliary file
pub(crate) fn metadata_files(
    out: &mut TerraformOutput,
    tf_type: &str,
    name: &str,
    metadata: &BTreeMap<String, String>,
) -> Value {
    let mut map = Map::new();
    for (key, value) in metadata {
        let reference = out.add_file(tf_type, name, &format!("metadata_{key}"), value.clone());
        map.insert(key.clone(), reference);
    }
    Value::Object(map)
}

/// `tcp:443` → `{protocol: tcp, ports: [443]}`; a bare protocol allows all ports
pub(crate) fn allow_block(rule: &str) -> Value {
    match rule.split_once(':') {
        Some((protocol, ports)) => serde_json::json!({
            "protocol": protocol,
            "ports": ports.split(',').map(str::trim).collect::<Vec<_>>(),
        }),
        None => serde_json::json!({ "protocol": rule }),
    }
}
