//! Launch configurations and autoscaling groups

use super::compute::SshKey;
use super::iam::IamInstanceProfile;
use super::network::{SecurityGroup, Subnet};
use super::{compact, dep, opt_dep};
use cloudup_cloud::{Attributes, to_attributes};
use cloudup_core::{ResourceTask, TaskContext, TaskError, TaskKey, TerraformOutput, tf_ref};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LaunchConfiguration {
    pub name: String,
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
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_volume_size: Option<u32>,
}

impl ResourceTask for LaunchConfiguration {
    const KIND: &'static str = "launchConfiguration";

    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<TaskKey> {
        let mut deps = vec![dep(SshKey::KIND, &self.ssh_key)];
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
        _ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        let user_data = self.user_data.as_ref().map(|data| {
            out.add_file("aws_launch_configuration", &self.name, "user_data", data.clone())
        });
        let groups: Vec<Value> = self
            .security_groups
            .iter()
            .map(|g| tf_ref("aws_security_group", g, "id"))
            .collect();
        out.add_resource(
            "aws_launch_configuration",
            &self.name,
            compact(json!({
                "name_prefix": format!("{}-", self.name),
                "image_id": self.image_id,
                "instance_type": self.instance_type,
                "key_name": tf_ref("aws_key_pair", &self.ssh_key, "id"),
                "security_groups": groups,
                "iam_instance_profile": self
                    .iam_instance_profile
                    .as_ref()
                    .map(|p| tf_ref("aws_iam_instance_profile", p, "id")),
                "user_data": user_data,
                "associate_public_ip_address": self.associate_public_ip,
                "root_block_device": self.root_volume_size.map(|size| json!({
                    "volume_type": "gp2",
                    "volume_size": size,
                    "delete_on_termination": true,
                })),
                // Launch configurations are immutable
                "lifecycle": { "create_before_destroy": true },
            })),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AutoscalingGroup {
    pub name: String,
    pub launch_configuration: String,
    pub subnets: Vec<String>,
    pub min_size: u32,
    pub max_size: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl AutoscalingGroup {
    fn check_bounds(&self) -> Result<(), TaskError> {
        if self.min_size > self.max_size {
            return Err(TaskError::Invalid(format!(
                "autoscalingGroup {}: minSize {} exceeds maxSize {}",
                self.name, self.min_size, self.max_size
            )));
        }
        Ok(())
    }
}

impl ResourceTask for AutoscalingGroup {
    const KIND: &'static str = "autoscalingGroup";

    fn name(&self) -> &str {
        &self.name
    }

    fn desired(&self) -> Result<Attributes, TaskError> {
        self.check_bounds()?;
        let mut attributes = to_attributes(Self::KIND, self)?;
        attributes.remove("name");
        Ok(attributes)
    }

    fn dependencies(&self) -> Vec<TaskKey> {
        let mut deps = vec![dep(LaunchConfiguration::KIND, &self.launch_configuration)];
        deps.extend(self.subnets.iter().map(|s| dep(Subnet::KIND, s)));
        deps
    }

    fn render_terraform(
        &self,
        ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        self.check_bounds()?;

        let mut tags = BTreeMap::from([
            ("KubernetesCluster".to_string(), ctx.cluster_name().to_string()),
            ("Name".to_string(), self.name.clone()),
        ]);
        tags.extend(self.tags.clone());
        let tag_blocks: Vec<Value> = tags
            .iter()
            .map(|(key, value)| {
                json!({
                    "key": key,
                    "value": value,
                    "propagate_at_launch": true,
                })
            })
            .collect();

        let launch_configuration =
            tf_ref("aws_launch_configuration", &self.launch_configuration, "id");
        let subnets: Vec<Value> = self
            .subnets
            .iter()
            .map(|s| tf_ref("aws_subnet", s, "id"))
            .collect();
        out.add_resource(
            "aws_autoscaling_group",
            &self.name,
            json!({
                "name": self.name,
                "launch_configuration": launch_configuration,
                "vpc_zone_identifier": subnets,
                "min_size": self.min_size,
                "max_size": self.max_size,
                "tag": tag_blocks,
            }),
        )
    }
}
