//! AWS-specific configuration checks and defaults

use cloudup_core::{ClusterConfig, ConfigError};

/// Regions the provider can address
pub const KNOWN_REGIONS: &[&str] = &[
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-south-1",
    "ap-southeast-1",
    "ap-southeast-2",
    "ca-central-1",
    "cn-north-1",
    "eu-central-1",
    "eu-west-1",
    "eu-west-2",
    "sa-east-1",
    "us-east-1",
    "us-east-2",
    "us-gov-west-1",
    "us-west-1",
    "us-west-2",
];

const DEFAULT_MASTER_MACHINE_TYPE: &str = "m3.medium";
const DEFAULT_NODE_MACHINE_TYPE: &str = "t2.medium";
const DEFAULT_IMAGE: &str = "282335181503/k8s-1.3-debian-jessie-amd64-hvm-ebs-2016-06-18";
const DEFAULT_NODE_COUNT: u32 = 2;

/// Region of an availability zone (`us-east-1a` → `us-east-1`)
pub fn zone_region(zone: &str) -> Result<&str, ConfigError> {
    if zone.chars().count() <= 2 {
        return Err(ConfigError::InvalidZone(zone.to_string()));
    }
    let mut chars = zone.chars();
    chars.next_back();
    Ok(chars.as_str())
}

/// Validate the zones and return the single region they live in
pub fn validate(config: &ClusterConfig, ssh_key_present: bool) -> Result<String, ConfigError> {
    if let Some(zone) = config
        .master_zones
        .iter()
        .find(|z| !config.node_zones.contains(z))
    {
        return Err(ConfigError::MasterZoneNotNodeZone(zone.clone()));
    }

    let mut region = config.region.clone().filter(|r| !r.is_empty());
    for zone in &config.node_zones {
        let derived = zone_region(zone)?;
        match &region {
            Some(existing) if existing != derived => {
                return Err(ConfigError::MultipleRegions(
                    existing.clone(),
                    derived.to_string(),
                ));
            }
            Some(_) => {}
            None => region = Some(derived.to_string()),
        }
    }
    let region = region.ok_or(ConfigError::NoNodeZones)?;

    if !KNOWN_REGIONS.contains(&region.as_str()) {
        return Err(ConfigError::UnknownRegion(region));
    }
    if !ssh_key_present {
        return Err(ConfigError::MissingSshKey);
    }
    tracing::debug!(region = %region, "Validated AWS topology");
    Ok(region)
}

/// Machine types, images and node count used when the configuration is silent
pub fn apply_defaults(config: &mut ClusterConfig) {
    config
        .master_machine_type
        .get_or_insert_with(|| DEFAULT_MASTER_MACHINE_TYPE.to_string());
    config
        .node_machine_type
        .get_or_insert_with(|| DEFAULT_NODE_MACHINE_TYPE.to_string());
    config
        .master_image
        .get_or_insert_with(|| DEFAULT_IMAGE.to_string());
    config
        .node_image
        .get_or_insert_with(|| DEFAULT_IMAGE.to_string());
    config.node_count.get_or_insert(DEFAULT_NODE_COUNT);
    tracing::debug!(
        master_machine_type = ?config.master_machine_type,
        node_machine_type = ?config.node_machine_type,
        node_count = ?config.node_count,
        "Applied provider defaults"
    );
}
