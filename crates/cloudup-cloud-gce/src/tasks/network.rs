//! Networks, firewall rules and static addresses

use super::{allow_block, gce_name};
use cloudup_core::{ResourceTask, TaskContext, TaskError, TaskKey, TerraformOutput, tf_ref};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Network {
    pub name: String,
}

impl ResourceTask for Network {
    const KIND: &'static str = "network";

    fn name(&self) -> &str {
        &self.name
    }

    fn render_terraform(
        &self,
        _ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        out.add_resource(
            "google_compute_network",
            &self.name,
            json!({
                "name": gce_name(&self.name),
                "auto_create_subnetworks": true,
            }),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FirewallRule {
    pub name: String,
    pub network: String,
    /// `protocol[:ports]` entries, e.g. `tcp:443`
    pub allowed: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_ranges: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_tags: Vec<String>,
}

impl ResourceTask for FirewallRule {
    const KIND: &'static str = "firewallRule";

    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<TaskKey> {
        vec![TaskKey::new(Network::KIND, &self.network)]
    }

    fn render_terraform(
        &self,
        _ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        if self.source_ranges.is_empty() && self.source_tags.is_empty() {
            return Err(TaskError::Invalid(format!(
                "firewallRule {}: sourceRanges or sourceTags must be set",
                self.name
            )));
        }
        let mut body = json!({
            "name": gce_name(&self.name),
            "network": tf_ref("google_compute_network", &self.network, "name"),
            "allow": self.allowed.iter().map(|a| allow_block(a)).collect::<Vec<Value>>(),
        });
        for (field, values) in [
            ("source_ranges", &self.source_ranges),
            ("source_tags", &self.source_tags),
            ("target_tags", &self.target_tags),
        ] {
            if !values.is_empty() {
                body[field] = json!(values);
            }
        }
        out.add_resource("google_compute_firewall", &self.name, body)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IpAddress {
    pub name: String,
}

impl ResourceTask for IpAddress {
    const KIND: &'static str = "ipAddress";

    fn name(&self) -> &str {
        &self.name
    }

    fn render_terraform(
        &self,
        _ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        out.add_resource(
            "google_compute_address",
            &self.name,
            json!({ "name": gce_name(&self.name) }),
        )
    }
}
