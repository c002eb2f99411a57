//! AWS provider for cloudup
//!
//! Registers the AWS resource kinds, validates AWS topologies and supplies
//! the AWS template helpers and Terraform provider block.
//!
//! # Kinds
//!
//! - **Network**: `vpc`, `dhcpOptions`, `vpcDHCPOptionsAssociation`, `subnet`,
//!   `internetGateway`, `internetGatewayAttachment`, `routeTable`, `route`,
//!   `routeTableAssociation`, `securityGroup`, `securityGroupRule`
//! - **IAM**: `iamRole`, `iamRolePolicy`, `iamInstanceProfile`,
//!   `iamInstanceProfileRole`
//! - **Compute**: `sshKey`, `ebsVolume`, `instance`, `elasticIP`,
//!   `instanceElasticIPAttachment`, `instanceVolumeAttachment`
//! - **Autoscaling**: `launchConfiguration`, `autoscalingGroup`
//! - **Load balancing**: `loadBalancer`, `loadBalancerAttachment`,
//!   `loadBalancerHealthChecks`
//! - **DNS**: `dnsZone`, `dnsName`

pub mod machine_types;
pub mod tasks;
pub mod validate;

pub use machine_types::{MachineTypeInfo, machine_type_info};
pub use validate::{KNOWN_REGIONS, apply_defaults, validate, zone_region};

use cloudup_core::{Capabilities, ClusterConfig, LoadError, Registry, TerraformProvider};
use tasks::{autoscaling, compute, dns, elb, iam, network};

pub const PROVIDER: &str = "aws";

/// Register every AWS kind on `registry`
pub fn register_tasks(registry: &mut Registry) -> Result<(), LoadError> {
    registry.register_type::<network::Vpc>()?;
    registry.register_type::<network::DhcpOptions>()?;
    registry.register_type::<network::VpcDhcpOptionsAssociation>()?;
    registry.register_type::<network::Subnet>()?;
    registry.register_type::<network::InternetGateway>()?;
    registry.register_type::<network::InternetGatewayAttachment>()?;
    registry.register_type::<network::RouteTable>()?;
    registry.register_type::<network::Route>()?;
    registry.register_type::<network::RouteTableAssociation>()?;
    registry.register_type::<network::SecurityGroup>()?;
    registry.register_type::<network::SecurityGroupRule>()?;

    registry.register_type::<iam::IamRole>()?;
    registry.register_type::<iam::IamRolePolicy>()?;
    registry.register_type::<iam::IamInstanceProfile>()?;
    registry.register_type::<iam::IamInstanceProfileRole>()?;

    registry.register_type::<compute::SshKey>()?;
    registry.register_type::<compute::EbsVolume>()?;
    registry.register_type::<compute::Instance>()?;
    registry.register_type::<compute::ElasticIp>()?;
    registry.register_type::<compute::InstanceElasticIpAttachment>()?;
    registry.register_type::<compute::InstanceVolumeAttachment>()?;

    registry.register_type::<autoscaling::LaunchConfiguration>()?;
    registry.register_type::<autoscaling::AutoscalingGroup>()?;

    registry.register_type::<elb::LoadBalancer>()?;
    registry.register_type::<elb::LoadBalancerAttachment>()?;
    registry.register_type::<elb::LoadBalancerHealthChecks>()?;

    registry.register_type::<dns::DnsZone>()?;
    registry.register_type::<dns::DnsName>()?;
    Ok(())
}

/// Add `MachineTypeInfo` and `SubnetCIDR` to the template capabilities
pub fn with_helpers(capabilities: Capabilities, config: &ClusterConfig) -> Capabilities {
    let network = config.effective_network_cidr().to_string();
    capabilities
        .with_helper("MachineTypeInfo", machine_types::machine_type_helper())
        .with_helper("SubnetCIDR", machine_types::subnet_cidr_helper(network))
}

pub fn terraform_provider(region: &str) -> TerraformProvider {
    TerraformProvider::new(PROVIDER).with_setting("region", region)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_all_kinds() {
        let mut registry = Registry::new();
        register_tasks(&mut registry).unwrap();
        assert_eq!(registry.kinds().count(), 28);
        for kind in ["vpcDHCPOptionsAssociation", "loadBalancerHealthChecks", "elasticIP"] {
            assert!(registry.contains(kind), "{kind} not registered");
        }
        // Registering twice collides on the first kind
        assert!(register_tasks(&mut registry).is_err());
    }

    #[test]
    fn test_decode_rejects_unknown_fields() {
        let mut registry = Registry::new();
        register_tasks(&mut registry).unwrap();
        let body: serde_yaml::Value =
            serde_yaml::from_str("cidr: 10.0.0.0/16\ncolour: red\n").unwrap();
        let decoded = registry.decode("vpc", "main", body).unwrap();
        assert!(decoded.is_err());
    }
}
