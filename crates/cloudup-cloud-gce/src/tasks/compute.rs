//! Disks, instances, instance templates and managed instance groups

use super::network::{IpAddress, Network};
use super::{gce_name, metadata_files};
use cloudup_core::{ResourceTask, TaskContext, TaskError, TaskKey, TerraformOutput, tf_ref};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;

fn default_scopes() -> Vec<String> {
    vec!["compute-rw".into(), "storage-ro".into()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PersistentDisk {
    pub name: String,
    pub zone: String,
    pub size_gb: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<String>,
}

impl ResourceTask for PersistentDisk {
    const KIND: &'static str = "persistentDisk";

    fn name(&self) -> &str {
        &self.name
    }

    fn render_terraform(
        &self,
        _ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        out.add_resource(
            "google_compute_disk",
            &self.name,
            json!({
                "name": gce_name(&self.name),
                "zone": self.zone,
                "size": self.size_gb,
                "type": self.volume_type.as_deref().unwrap_or("pd-ssd"),
            }),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Instance {
    pub name: String,
    pub zone: String,
    pub machine_type: String,
    pub image: String,
    pub network: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preemptible: Option<bool>,
}

impl ResourceTask for Instance {
    const KIND: &'static str = "instance";

    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<TaskKey> {
        let mut deps = vec![TaskKey::new(Network::KIND, &self.network)];
        deps.extend(self.disks.iter().map(|d| TaskKey::new(PersistentDisk::KIND, d)));
        deps.extend(
            self.ip_address
                .iter()
                .map(|ip| TaskKey::new(IpAddress::KIND, ip)),
        );
        deps
    }

    fn render_terraform(
        &self,
        _ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        let metadata = metadata_files(out, "google_compute_instance", &self.name, &self.metadata);
        let access_config = match &self.ip_address {
            Some(ip) => json!({ "nat_ip": tf_ref("google_compute_address", ip, "address") }),
            None => json!({}),
        };
        let attached: Vec<Value> = self
            .disks
            .iter()
            .map(|d| json!({ "source": tf_ref("google_compute_disk", d, "self_link") }))
            .collect();
        out.add_resource(
            "google_compute_instance",
            &self.name,
            json!({
                "name": gce_name(&self.name),
                "zone": self.zone,
                "machine_type": self.machine_type,
                "boot_disk": { "initialize_params": { "image": self.image } },
                "attached_disk": attached,
                "network_interface": [{
                    "network": tf_ref("google_compute_network", &self.network, "name"),
                    "access_config": [access_config],
                }],
                "tags": self.tags,
                "metadata": metadata,
                "service_account": { "scopes": self.scopes },
                "scheduling": {
                    "preemptible": self.preemptible.unwrap_or(false),
                    "automatic_restart": !self.preemptible.unwrap_or(false),
                },
                "can_ip_forward": true,
            }),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InstanceTemplate {
    pub name: String,
    pub machine_type: String,
    pub image: String,
    pub network: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preemptible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_disk_size_gb: Option<u32>,
}

impl ResourceTask for InstanceTemplate {
    const KIND: &'static str = "instanceTemplate";

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
        let metadata = metadata_files(
            out,
            "google_compute_instance_template",
            &self.name,
            &self.metadata,
        );
        let mut disk = json!({
            "source_image": self.image,
            "auto_delete": true,
            "boot": true,
        });
        if let Some(size) = self.boot_disk_size_gb {
            disk["disk_size_gb"] = json!(size);
        }
        out.add_resource(
            "google_compute_instance_template",
            &self.name,
            json!({
                "name_prefix": format!("{}-", gce_name(&self.name)),
                "machine_type": self.machine_type,
                "disk": [disk],
                "network_interface": [{
                    "network": tf_ref("google_compute_network", &self.network, "name"),
                    "access_config": [{}],
                }],
                "tags": self.tags,
                "metadata": metadata,
                "service_account": { "scopes": self.scopes },
                "scheduling": {
                    "preemptible": self.preemptible.unwrap_or(false),
                    "automatic_restart": !self.preemptible.unwrap_or(false),
                },
                "can_ip_forward": true,
                "lifecycle": { "create_before_destroy": true },
            }),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ManagedInstanceGroup {
    pub name: String,
    pub zone: String,
    pub base_instance_name: String,
    pub instance_template: String,
    pub target_size: u32,
}

impl ResourceTask for ManagedInstanceGroup {
    const KIND: &'static str = "managedInstanceGroup";

    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<TaskKey> {
        vec![TaskKey::new(InstanceTemplate::KIND, &self.instance_template)]
    }

    fn render_terraform(
        &self,
        _ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        out.add_resource(
            "google_compute_instance_group_manager",
            &self.name,
            json!({
                "name": gce_name(&self.name),
                "zone": self.zone,
                "base_instance_name": gce_name(&self.base_instance_name),
                "version": [{
                    "instance_template": tf_ref(
                        "google_compute_instance_template",
                        &self.instance_template,
                        "self_link",
                    ),
                }],
                "target_size": self.target_size,
            }),
        )
    }
}
