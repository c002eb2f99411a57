//! GCE-specific configuration checks and defaults

use cloudup_core::{ClusterConfig, ConfigError};

const DEFAULT_MACHINE_TYPE: &str = "n1-standard-1";
const DEFAULT_IMAGE: &str = "debian-cloud/debian-8-jessie-v20160329";
const DEFAULT_NODE_COUNT: u32 = 2;

/// Region of a zone (`us-central1-f` → `us-central1`)
pub fn zone_region(zone: &str) -> Result<String, ConfigError> {
    let tokens: Vec<&str> = zone.split('-').collect();
    if tokens.len() <= 2 || tokens.iter().any(|t| t.is_empty()) {
        return Err(ConfigError::InvalidZone(zone.to_string()));
    }
    Ok(format!("{}-{}", tokens[0], tokens[1]))
}

/// Validate zones and project; returns `(region, project)`
pub fn validate(config: &ClusterConfig) -> Result<(String, String), ConfigError> {
    let mut region: Option<String> = config.region.clone().filter(|r| !r.is_empty());
    for zone in &config.node_zones {
        let derived = zone_region(zone)?;
        match &region {
            Some(existing) if *existing != derived => {
                return Err(ConfigError::MultipleRegions(existing.clone(), derived));
            }
            Some(_) => {}
            None => region = Some(derived),
        }
    }
    let region = region.ok_or(ConfigError::NoNodeZones)?;

    let project = config
        .project
        .clone()
        .filter(|p| !p.trim().is_empty())
        .ok_or(ConfigError::MissingProject)?;
    tracing::debug!(region = %region, project = %project, "Validated GCE topology");
    Ok((region, project))
}

pub fn apply_defaults(config: &mut ClusterConfig) {
    config
        .master_machine_type
        .get_or_insert_with(|| DEFAULT_MACHINE_TYPE.to_string());
    config
        .node_machine_type
        .get_or_insert_with(|| DEFAULT_MACHINE_TYPE.to_string());
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

#[cfg(test)]
mod tests {
    use super::*;

    fn config(zones: &[&str], project: Option<&str>) -> ClusterConfig {
        ClusterConfig {
            cluster_name: "test.k8s.local".into(),
            node_zones: zones.iter().map(|z| z.to_string()).collect(),
            master_zones: vec![zones[0].to_string()],
            project: project.map(Into::into),
            ..Default::default()
        }
    }

    #[test]
    fn test_region_and_project() {
        let c = config(&["us-central1-f", "us-central1-b"], Some("my-project"));
        assert_eq!(
            validate(&c),
            Ok(("us-central1".to_string(), "my-project".to_string()))
        );
    }

    #[test]
    fn test_project_required() {
        let c = config(&["us-central1-f"], None);
        assert_eq!(validate(&c), Err(ConfigError::MissingProject));
        let c = config(&["us-central1-f"], Some("  "));
        assert_eq!(validate(&c), Err(ConfigError::MissingProject));
    }

    #[test]
    fn test_zone_shape() {
        assert_eq!(
            validate(&config(&["us-central1"], Some("p"))),
            Err(ConfigError::InvalidZone("us-central1".into()))
        );
        assert!(matches!(
            validate(&config(&["us-central1-f", "europe-west1-b"], Some("p"))),
            Err(ConfigError::MultipleRegions(..))
        ));
    }
}
