//! EC2: key pairs, volumes, instances and elastic IPs

use super::iam::IamInstanceProfile;
use super::network::{SecurityGroup, Subnet};
use super::{cluster_tags, compact, dep, opt_dep};
use cloudup_core::{ResourceTask, TaskContext, TaskError, TaskKey, TerraformOutput, tf_ref};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SshKey {
    pub name: String,
    pub public_key: String,
}

impl ResourceTask for SshKey {
    const KIND: &'static str = "sshKey";

    fn name(&self) -> &str {
        &self.name
    }

    fn render_terraform(
        &self,
        _ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        let public_key = out.add_file(
            "aws_key_pair",
            &self.name,
            "public_key",
            self.public_key.clone(),
        );
        out.add_resource(
            "aws_key_pair",
            &self.name,
            json!({
                "key_name": self.name,
                "public_key": public_key,
            }),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EbsVolume {
    pub name: String,
    pub availability_zone: String,
    pub size_gb: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl ResourceTask for EbsVolume {
    const KIND: &'static str = "ebsVolume";

    fn name(&self) -> &str {
        &self.name
    }

    fn render_terraform(
        &self,
        ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        out.add_resource(
            "aws_ebs_volume",
            &self.name,
            compact(json!({
                "availability_zone": self.availability_zone,
                "size": self.size_gb,
                "type": self.volume_type,
                "tags": merged_tags(ctx, &self.name, &self.tags),
            })),
        )
    }
}

/// Cluster tags plus the task's own (task tags win)
fn merged_tags(ctx: &TaskContext, name: &str, extra: &BTreeMap<String, String>) -> Value {
    let mut tags = cluster_tags(ctx, name);
    if let Value::Object(map) = &mut tags {
        for (k, v) in extra {
            map.insert(k.clone(), Value::String(v.clone()));
        }
    }
    tags
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Instance {
    pub name: String,
    pub subnet: String,
    pub image_id: String,
    pub instance_type: String,
    pub ssh_key: String,
    #[serde(default)]
    pub security_groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iam_instance_profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub associate_public_ip: Option<bool>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl ResourceTask for Instance {
    const KIND: &'static str = "instance";

    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<TaskKey> {
        let mut deps = vec![dep(Subnet::KIND, &self.subnet), dep(SshKey::KIND, &self.ssh_key)];
        deps.extend(
            self.security_groups
                .iter()
                .map(|g| dep(SecurityGroup::KIND, g)),
        );
        deps.extend(opt_dep(IamInstanceProfile::KIND, self.iam_instance_profile.as_ref()));
        deps
    }

    fn render_terraform(
        &self,
        ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        let user_data = self
            .user_data
            .as_ref()
            .map(|data| out.add_file("aws_instance", &self.name, "user_data", data.clone()));
        let groups: Vec<Value> = self
            .security_groups
            .iter()
            .map(|g| tf_ref("aws_security_group", g, "id"))
            .collect();
        out.add_resource(
            "aws_instance",
            &self.name,
            compact(json!({
                "ami": self.image_id,
                "instance_type": self.instance_type,
                "subnet_id": tf_ref("aws_subnet", &self.subnet, "id"),
                "key_name": tf_ref("aws_key_pair", &self.ssh_key, "id"),
                "vpc_security_group_ids": groups,
                "iam_instance_profile": self
                    .iam_instance_profile
                    .as_ref()
                    .map(|p| tf_ref("aws_iam_instance_profile", p, "id")),
                "user_data": user_data,
                "associate_public_ip_address": self.associate_public_ip,
                "tags": merged_tags(ctx, &self.name, &self.tags),
            })),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ElasticIp {
    pub name: String,
}

impl ResourceTask for ElasticIp {
    const KIND: &'static str = "elasticIP";

    fn name(&self) -> &str {
        &self.name
    }

    fn render_terraform(
        &self,
        ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        out.add_resource(
            "aws_eip",
            &self.name,
            json!({
                "domain": "vpc",
                "tags": cluster_tags(ctx, &self.name),
            }),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InstanceElasticIpAttachment {
    pub name: String,
    pub instance: String,
    pub elastic_ip: String,
}

impl ResourceTask for InstanceElasticIpAttachment {
    const KIND: &'static str = "instanceElasticIPAttachment";

    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<TaskKey> {
        vec![
            dep(Instance::KIND, &self.instance),
            dep(ElasticIp::KIND, &self.elastic_ip),
        ]
    }

    fn render_terraform(
        &self,
        _ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        out.add_resource(
            "aws_eip_association",
            &self.name,
            json!({
                "instance_id": tf_ref("aws_instance", &self.instance, "id"),
                "allocation_id": tf_ref("aws_eip", &self.elastic_ip, "id"),
            }),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InstanceVolumeAttachment {
    pub name: String,
    pub instance: String,
    pub volume: String,
    pub device: String,
}

impl ResourceTask for InstanceVolumeAttachment {
    const KIND: &'static str = "instanceVolumeAttachment";

    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<TaskKey> {
        vec![
            dep(Instance::KIND, &self.instance),
            dep(EbsVolume::KIND, &self.volume),
        ]
    }

    fn render_terraform(
        &self,
        _ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        out.add_resource(
            "aws_volume_attachment",
            &self.name,
            json!({
                "device_name": self.device,
                "instance_id": tf_ref("aws_instance", &self.instance, "id"),
                "volume_id": tf_ref("aws_ebs_volume", &self.volume, "id"),
            }),
        )
    }
}
