//! Classic load balancers in front of the masters

use super::autoscaling::AutoscalingGroup;
use super::compute::Instance;
use super::network::{SecurityGroup, Subnet};
use super::{cluster_tags, dep, opt_dep};
use cloudup_core::{ResourceTask, TaskContext, TaskError, TaskKey, TerraformOutput, tf_ref};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// ELB names are limited to 32 alphanumerics and hyphens
const MAX_ELB_NAME: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Listener {
    pub port: u16,
    pub instance_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoadBalancer {
    pub name: String,
    pub subnets: Vec<String>,
    #[serde(default)]
    pub security_groups: Vec<String>,
    pub listeners: Vec<Listener>,
}

/// AWS-side name derived from the task name
pub fn elb_name(name: &str) -> String {
    let mut sanitized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    sanitized.truncate(MAX_ELB_NAME);
    sanitized.trim_end_matches('-').to_string()
}

impl ResourceTask for LoadBalancer {
    const KIND: &'static str = "loadBalancer";

    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<TaskKey> {
        let mut deps: Vec<TaskKey> = self.subnets.iter().map(|s| dep(Subnet::KIND, s)).collect();
        deps.extend(
            self.security_groups
                .iter()
                .map(|g| dep(SecurityGroup::KIND, g)),
        );
        deps
    }

    fn render_terraform(
        &self,
        ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        let listeners: Vec<Value> = self
            .listeners
            .iter()
            .map(|l| {
                json!({
                    "lb_port": l.port,
                    "lb_protocol": "TCP",
                    "instance_port": l.instance_port,
                    "instance_protocol": "TCP",
                })
            })
            .collect();
        out.add_resource(
            "aws_elb",
            &self.name,
            json!({
                "name": elb_name(&self.name),
                "subnets": self
                    .subnets
                    .iter()
                    .map(|s| tf_ref("aws_subnet", s, "id"))
                    .collect::<Vec<_>>(),
                "security_groups": self
                    .security_groups
                    .iter()
                    .map(|g| tf_ref("aws_security_group", g, "id"))
                    .collect::<Vec<_>>(),
                "listener": listeners,
                "tags": cluster_tags(ctx, &self.name),
            }),
        )
    }
}

/// Registers an instance or an autoscaling group with a load balancer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoadBalancerAttachment {
    pub name: String,
    pub load_balancer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoscaling_group: Option<String>,
}

impl ResourceTask for LoadBalancerAttachment {
    const KIND: &'static str = "loadBalancerAttachment";

    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<TaskKey> {
        let mut deps = vec![dep(LoadBalancer::KIND, &self.load_balancer)];
        deps.extend(opt_dep(Instance::KIND, self.instance.as_ref()));
        deps.extend(opt_dep(AutoscalingGroup::KIND, self.autoscaling_group.as_ref()));
        deps
    }

    fn render_terraform(
        &self,
        _ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        let elb = tf_ref("aws_elb", &self.load_balancer, "id");
        match (&self.instance, &self.autoscaling_group) {
            (Some(instance), None) => out.add_resource(
                "aws_elb_attachment",
                &self.name,
                json!({
                    "elb": elb,
                    "instance": tf_ref("aws_instance", instance, "id"),
                }),
            ),
            (None, Some(group)) => out.add_resource(
                "aws_autoscaling_attachment",
                &self.name,
                json!({
                    "elb": elb,
                    "autoscaling_group_name": tf_ref("aws_autoscaling_group", group, "id"),
                }),
            ),
            _ => Err(TaskError::Invalid(format!(
                "loadBalancerAttachment {}: set exactly one of instance or autoscalingGroup",
                self.name
            ))),
        }
    }
}

/// Health check settings of a load balancer
///
/// Rendered as the `health_check` block of the balancer itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoadBalancerHealthChecks {
    pub name: String,
    pub load_balancer: String,
    /// e.g. `TCP:443`
    pub target: String,
    #[serde(default = "default_healthy")]
    pub healthy_threshold: u32,
    #[serde(default = "default_unhealthy")]
    pub unhealthy_threshold: u32,
    #[serde(default = "default_interval")]
    pub interval: u32,
    #[serde(default = "default_timeout")]
    pub timeout: u32,
}

fn default_healthy() -> u32 {
    2
}

fn default_unhealthy() -> u32 {
    2
}

fn default_interval() -> u32 {
    10
}

fn default_timeout() -> u32 {
    5
}

impl ResourceTask for LoadBalancerHealthChecks {
    const KIND: &'static str = "loadBalancerHealthChecks";

    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<TaskKey> {
        vec![dep(LoadBalancer::KIND, &self.load_balancer)]
    }

    fn render_terraform(
        &self,
        _ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        out.extend_resource(
            "aws_elb",
            &self.load_balancer,
            "health_check",
            json!({
                "target": self.target,
                "healthy_threshold": self.healthy_threshold,
                "unhealthy_threshold": self.unhealthy_threshold,
                "interval": self.interval,
                "timeout": self.timeout,
            }),
        )
    }
}
