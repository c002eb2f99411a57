//! VPC networking: VPC, DHCP options, subnets, gateways, routes and
//! security groups

use super::{cluster_tags, compact, dep, opt_dep};
use cloudup_core::{ResourceTask, TaskContext, TaskError, TaskKey, TerraformOutput, tf_ref};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Vpc {
    pub name: String,
    pub cidr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_dns_support: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_dns_hostnames: Option<bool>,
}

impl ResourceTask for Vpc {
    const KIND: &'static str = "vpc";

    fn name(&self) -> &str {
        &self.name
    }

    fn render_terraform(
        &self,
        ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        out.add_resource(
            "aws_vpc",
            &self.name,
            compact(json!({
                "cidr_block": self.cidr,
                "enable_dns_support": self.enable_dns_support,
                "enable_dns_hostnames": self.enable_dns_hostnames,
                "tags": cluster_tags(ctx, &self.name),
            })),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DhcpOptions {
    pub name: String,
    pub domain_name: String,
    /// Comma separated server list
    pub domain_name_servers: String,
}

impl ResourceTask for DhcpOptions {
    const KIND: &'static str = "dhcpOptions";

    fn name(&self) -> &str {
        &self.name
    }

    fn render_terraform(
        &self,
        ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        let servers: Vec<&str> = self
            .domain_name_servers
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        out.add_resource(
            "aws_vpc_dhcp_options",
            &self.name,
            json!({
                "domain_name": self.domain_name,
                "domain_name_servers": servers,
                "tags": cluster_tags(ctx, &self.name),
            }),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VpcDhcpOptionsAssociation {
    pub name: String,
    pub vpc: String,
    pub dhcp_options: String,
}

impl ResourceTask for VpcDhcpOptionsAssociation {
    const KIND: &'static str = "vpcDHCPOptionsAssociation";

    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<TaskKey> {
        vec![
            dep(Vpc::KIND, &self.vpc),
            dep(DhcpOptions::KIND, &self.dhcp_options),
        ]
    }

    fn render_terraform(
        &self,
        _ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        out.add_resource(
            "aws_vpc_dhcp_options_association",
            &self.name,
            json!({
                "vpc_id": tf_ref("aws_vpc", &self.vpc, "id"),
                "dhcp_options_id": tf_ref("aws_vpc_dhcp_options", &self.dhcp_options, "id"),
            }),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Subnet {
    pub name: String,
    pub vpc: String,
    pub availability_zone: String,
    pub cidr: String,
}

impl ResourceTask for Subnet {
    const KIND: &'static str = "subnet";

    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<TaskKey> {
        vec![dep(Vpc::KIND, &self.vpc)]
    }

    fn render_terraform(
        &self,
        ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        out.add_resource(
            "aws_subnet",
            &self.name,
            json!({
                "vpc_id": tf_ref("aws_vpc", &self.vpc, "id"),
                "availability_zone": self.availability_zone,
                "cidr_block": self.cidr,
                "tags": cluster_tags(ctx, &self.name),
            }),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InternetGateway {
    pub name: String,
}

impl ResourceTask for InternetGateway {
    const KIND: &'static str = "internetGateway";

    fn name(&self) -> &str {
        &self.name
    }

    fn render_terraform(
        &self,
        ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        out.add_resource(
            "aws_internet_gateway",
            &self.name,
            json!({ "tags": cluster_tags(ctx, &self.name) }),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InternetGatewayAttachment {
    pub name: String,
    pub vpc: String,
    pub internet_gateway: String,
}

impl ResourceTask for InternetGatewayAttachment {
    const KIND: &'static str = "internetGatewayAttachment";

    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<TaskKey> {
        vec![
            dep(Vpc::KIND, &self.vpc),
            dep(InternetGateway::KIND, &self.internet_gateway),
        ]
    }

    fn render_terraform(
        &self,
        _ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        out.add_resource(
            "aws_internet_gateway_attachment",
            &self.name,
            json!({
                "vpc_id": tf_ref("aws_vpc", &self.vpc, "id"),
                "internet_gateway_id": tf_ref("aws_internet_gateway", &self.internet_gateway, "id"),
            }),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RouteTable {
    pub name: String,
    pub vpc: String,
}

impl ResourceTask for RouteTable {
    const KIND: &'static str = "routeTable";

    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<TaskKey> {
        vec![dep(Vpc::KIND, &self.vpc)]
    }

    fn render_terraform(
        &self,
        ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        out.add_resource(
            "aws_route_table",
            &self.name,
            json!({
                "vpc_id": tf_ref("aws_vpc", &self.vpc, "id"),
                "tags": cluster_tags(ctx, &self.name),
            }),
        )
    }
}

/// A route through either an internet gateway or an instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Route {
    pub name: String,
    pub route_table: String,
    pub cidr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internet_gateway: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

impl ResourceTask for Route {
    const KIND: &'static str = "route";

    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<TaskKey> {
        let mut deps = vec![dep(RouteTable::KIND, &self.route_table)];
        deps.extend(opt_dep(InternetGateway::KIND, self.internet_gateway.as_ref()));
        deps.extend(opt_dep(super::compute::Instance::KIND, self.instance.as_ref()));
        deps
    }

    fn render_terraform(
        &self,
        _ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        let (field, target) = match (&self.internet_gateway, &self.instance) {
            (Some(igw), None) => ("gateway_id", tf_ref("aws_internet_gateway", igw, "id")),
            (None, Some(instance)) => ("instance_id", tf_ref("aws_instance", instance, "id")),
            _ => {
                return Err(TaskError::Invalid(format!(
                    "route {}: exactly one of internetGateway or instance must be set",
                    self.name
                )));
            }
        };
        let mut body = json!({
            "route_table_id": tf_ref("aws_route_table", &self.route_table, "id"),
            "destination_cidr_block": self.cidr,
        });
        body[field] = target;
        out.add_resource("aws_route", &self.name, body)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RouteTableAssociation {
    pub name: String,
    pub route_table: String,
    pub subnet: String,
}

impl ResourceTask for RouteTableAssociation {
    const KIND: &'static str = "routeTableAssociation";

    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<TaskKey> {
        vec![
            dep(RouteTable::KIND, &self.route_table),
            dep(Subnet::KIND, &self.subnet),
        ]
    }

    fn render_terraform(
        &self,
        _ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        out.add_resource(
            "aws_route_table_association",
            &self.name,
            json!({
                "route_table_id": tf_ref("aws_route_table", &self.route_table, "id"),
                "subnet_id": tf_ref("aws_subnet", &self.subnet, "id"),
            }),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SecurityGroup {
    pub name: String,
    pub vpc: String,
    pub description: String,
}

impl ResourceTask for SecurityGroup {
    const KIND: &'static str = "securityGroup";

    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<TaskKey> {
        vec![dep(Vpc::KIND, &self.vpc)]
    }

    fn render_terraform(
        &self,
        ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        out.add_resource(
            "aws_security_group",
            &self.name,
            json!({
                "name": self.name,
                "vpc_id": tf_ref("aws_vpc", &self.vpc, "id"),
                "description": self.description,
                "tags": cluster_tags(ctx, &self.name),
            }),
        )
    }
}

/// Ingress (or egress) rule; the peer is a source group or a CIDR
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SecurityGroupRule {
    pub name: String,
    pub security_group: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub egress: Option<bool>,
}

impl ResourceTask for SecurityGroupRule {
    const KIND: &'static str = "securityGroupRule";

    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<TaskKey> {
        let mut deps = vec![dep(SecurityGroup::KIND, &self.security_group)];
        deps.extend(opt_dep(SecurityGroup::KIND, self.source_group.as_ref()));
        deps
    }

    fn render_terraform(
        &self,
        _ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        let direction = if self.egress.unwrap_or(false) {
            "egress"
        } else {
            "ingress"
        };
        // An unspecified protocol means all traffic
        let protocol = self.protocol.as_deref().unwrap_or("-1");
        out.add_resource(
            "aws_security_group_rule",
            &self.name,
            compact(json!({
                "type": direction,
                "security_group_id": tf_ref("aws_security_group", &self.security_group, "id"),
                "source_security_group_id": self
                    .source_group
                    .as_ref()
                    .map(|g| tf_ref("aws_security_group", g, "id")),
                "cidr_blocks": self.cidr.as_ref().map(|c| vec![c]),
                "protocol": protocol,
                "from_port": self.from_port.unwrap_or(0),
                "to_port": self.to_port.unwrap_or(0),
            })),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudup_core::Task;
    use cloudup_state::{CaStore, FsVfs};
    use std::sync::Arc;

    fn context(dir: &std::path::Path) -> TaskContext {
        let ca = Arc::new(CaStore::new(Arc::new(FsVfs::new(dir))));
        TaskContext::new(None, ca, "test.k8s.local")
    }

    #[test]
    fn test_subnet_references_vpc() {
        let dir = tempfile::tempdir().unwrap();
        let subnet = Subnet {
            name: "us-east-1a.test.k8s.local".into(),
            vpc: "test.k8s.local".into(),
            availability_zone: "us-east-1a".into(),
            cidr: "172.20.32.0/19".into(),
        };
        assert_eq!(
            Task::dependencies(&subnet),
            vec![TaskKey::new("vpc", "test.k8s.local")]
        );

        let mut out = TerraformOutput::new();
        Task::render_terraform(&subnet, &context(dir.path()), &mut out).unwrap();
        let block = out.resource("aws_subnet", "us-east-1a.test.k8s.local").unwrap();
        assert_eq!(block["vpc_id"], "${aws_vpc.test-k8s-local.id}");
        assert_eq!(block["tags"]["KubernetesCluster"], "test.k8s.local");
    }

    #[test]
    fn test_route_needs_exactly_one_target() {
        let dir = tempfile::tempdir().unwrap();
        let route = Route {
            name: "default".into(),
            route_table: "main".into(),
            cidr: "0.0.0.0/0".into(),
            internet_gateway: None,
            instance: None,
        };
        let mut out = TerraformOutput::new();
        assert!(Task::render_terraform(&route, &context(dir.path()), &mut out).is_err());

        let route = Route {
            internet_gateway: Some("main".into()),
            ..route
        };
        Task::render_terraform(&route, &context(dir.path()), &mut out).unwrap();
        assert_eq!(
            out.resource("aws_route", "default").unwrap()["gateway_id"],
            "${aws_internet_gateway.main.id}"
        );
        assert_eq!(Task::dependencies(&route).len(), 2);
    }

    #[test]
    fn test_rule_with_source_group() {
        let dir = tempfile::tempdir().unwrap();
        let rule = SecurityGroupRule {
            name: "all-node-to-master".into(),
            security_group: "masters".into(),
            source_group: Some("nodes".into()),
            cidr: None,
            protocol: None,
            from_port: None,
            to_port: None,
            egress: None,
        };
        assert_eq!(
            Task::dependencies(&rule),
            vec![
                TaskKey::new("securityGroup", "masters"),
                TaskKey::new("securityGroup", "nodes"),
            ]
        );

        let mut out = TerraformOutput::new();
        Task::render_terraform(&rule, &context(dir.path()), &mut out).unwrap();
        let block = out.resource("aws_security_group_rule", "all-node-to-master").unwrap();
        assert_eq!(block["type"], "ingress");
        assert_eq!(block["protocol"], "-1");
        assert!(block.get("cidr_blocks").is_none());
    }

    #[test]
    fn test_desired_uses_model_field_names() {
        let vpc: Vpc = serde_yaml::from_str(
            "name: test.k8s.local\ncidr: 172.20.0.0/16\nenableDnsHostnames: true\n",
        )
        .unwrap();
        let desired = Task::desired(&vpc).unwrap();
        assert_eq!(desired["cidr"], "172.20.0.0/16");
        assert_eq!(desired["enableDnsHostnames"], true);
        assert!(!desired.contains_key("enableDnsSupport"));
        assert!(!desired.contains_key("name"));
    }
}
