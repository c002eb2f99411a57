//! Cluster configuration
//!
//! The configuration is loaded from YAML (PascalCase keys), overridden by
//! flags, defaulted, and validated once before any task is built. It is
//! exposed to model templates under the same PascalCase names.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value as YamlValue};
use std::collections::HashSet;

const DEFAULT_NODEUP_LOCATION: &str = "https://kubeupv2.s3.amazonaws.com/nodeup/nodeup.tar.gz";
const RELEASE_BASE_URL: &str = "https://storage.googleapis.com/kubernetes-release/release";
pub const DEFAULT_NETWORK_CIDR: &str = "172.20.0.0/16";

/// Supported cloud providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cloud {
    Aws,
    Gce,
}

impl Cloud {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cloud::Aws => "aws",
            Cloud::Gce => "gce",
        }
    }

    /// Capability tag selecting this provider's model fragments
    pub fn tag(&self) -> &'static str {
        match self {
            Cloud::Aws => "_aws",
            Cloud::Gce => "_gce",
        }
    }
}

impl std::fmt::Display for Cloud {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Cloud {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "aws" => Ok(Cloud::Aws),
            "gce" => Ok(Cloud::Gce),
            other => Err(ConfigError::UnknownCloudProvider(other.to_string())),
        }
    }
}

/// Bootstrap (nodeup) settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NodeUpConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Cluster configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ClusterConfig {
    pub cluster_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_provider: Option<Cloud>,

    /// GCE project
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    /// Derived from the zones during provider validation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    pub master_zones: Vec<String>,

    pub node_zones: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_machine_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_machine_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_count: Option<u32>,

    #[serde(rename = "DNSZone", skip_serializing_if = "Option::is_none")]
    pub dns_zone: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_public_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubernetes_version: Option<String>,

    /// Release assets downloaded by nodeup
    pub assets: Vec<String>,

    pub node_up: NodeUpConfig,

    pub node_up_tags: Vec<String>,

    #[serde(rename = "NetworkCIDR", skip_serializing_if = "Option::is_none")]
    pub network_cidr: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_image: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_image: Option<String>,

    /// Run masters in autoscaling groups (default true)
    #[serde(rename = "MasterASG", skip_serializing_if = "Option::is_none")]
    pub master_asg: Option<bool>,

    /// Front masters with a load balancer (default false)
    #[serde(rename = "MasterLB", skip_serializing_if = "Option::is_none")]
    pub master_lb: Option<bool>,
}

impl ClusterConfig {
    /// Parse a YAML configuration document
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Fill unset fields from model options; returns the keys applied
    ///
    /// A field counts as unset when it is absent, null or empty. Values the
    /// configuration file or flags already provide are kept.
    pub fn apply_options(&mut self, options: Mapping) -> Result<Vec<String>, ConfigError> {
        let invalid = |e: serde_yaml::Error| ConfigError::InvalidValue {
            field: "options",
            message: e.to_string(),
        };
        let mut merged = match serde_yaml::to_value(&*self).map_err(invalid)? {
            YamlValue::Mapping(mapping) => mapping,
            _ => Mapping::new(),
        };

        let mut applied = Vec::new();
        for (key, value) in options {
            let Some(name) = key.as_str().map(str::to_string) else {
                return Err(ConfigError::UnknownOption(format!("{key:?}")));
            };
            if merged.get(&key).is_none_or(is_unset) {
                merged.insert(key, value);
                applied.push(name);
            }
        }

        let updated: ClusterConfig =
            serde_yaml::from_value(YamlValue::Mapping(merged)).map_err(invalid)?;
        // serde drops keys it does not know; surface them instead
        if let YamlValue::Mapping(known) = serde_yaml::to_value(&updated).map_err(invalid)? {
            let unknown = applied.iter().find(|name| !known.contains_key(name.as_str()));
            if let Some(name) = unknown {
                return Err(ConfigError::UnknownOption(name.clone()));
            }
        }

        *self = updated;
        Ok(applied)
    }

    /// Network CIDR, falling back to the default range when unset
    pub fn effective_network_cidr(&self) -> &str {
        self.network_cidr.as_deref().unwrap_or(DEFAULT_NETWORK_CIDR)
    }

    pub fn use_master_asg(&self) -> bool {
        self.master_asg.unwrap_or(true)
    }

    pub fn use_master_lb(&self) -> bool {
        self.master_lb.unwrap_or(false)
    }

    /// protokube currently follows the master ASG choice
    pub fn use_protokube(&self) -> bool {
        self.use_master_asg()
    }

    /// Provider-independent validation
    pub fn validate(&self) -> Result<Cloud, ConfigError> {
        if self.cluster_name.trim().is_empty() {
            return Err(ConfigError::MissingClusterName);
        }
        if self.node_zones.is_empty() {
            return Err(ConfigError::NoNodeZones);
        }
        if self.master_zones.is_empty() {
            return Err(ConfigError::NoMasterZones);
        }
        check_duplicates("master zones", &self.master_zones)?;
        check_duplicates("node zones", &self.node_zones)?;
        validate_master_zone_count(&self.master_zones)?;

        self.cloud_provider.ok_or(ConfigError::MissingCloudProvider)
    }

    /// Fill in every default that does not need the network
    ///
    /// The kubernetes version must already be resolved.
    pub fn apply_defaults(&mut self) {
        if self.master_public_name.is_none() {
            self.master_public_name = Some(format!("api.{}", self.cluster_name));
        }

        if self.dns_zone.is_none()
            && let Some(public_name) = &self.master_public_name
        {
            let zone = default_dns_zone(public_name);
            tracing::info!(dns_zone = %zone, "Defaulting DNS zone");
            self.dns_zone = Some(zone);
        }

        if self.assets.is_empty()
            && let Some(version) = &self.kubernetes_version
        {
            for binary in ["kubelet", "kubectl"] {
                let asset = format!("{RELEASE_BASE_URL}/v{version}/bin/linux/amd64/{binary}");
                tracing::info!(asset = %asset, "Adding default {binary} release asset");
                self.assets.push(asset);
            }
        }

        if self.node_up.location.is_none() {
            tracing::info!(location = DEFAULT_NODEUP_LOCATION, "Using default nodeup location");
            self.node_up.location = Some(DEFAULT_NODEUP_LOCATION.to_string());
        }

        if self.network_cidr.is_none() {
            self.network_cidr = Some(DEFAULT_NETWORK_CIDR.to_string());
        }
    }
}

fn is_unset(value: &YamlValue) -> bool {
    match value {
        YamlValue::Null => true,
        YamlValue::String(s) => s.is_empty(),
        YamlValue::Sequence(seq) => seq.is_empty(),
        YamlValue::Mapping(map) => map.is_empty(),
        _ => false,
    }
}

fn check_duplicates(list: &'static str, zones: &[String]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for zone in zones {
        if !seen.insert(zone.as_str()) {
            return Err(ConfigError::DuplicateZone {
                list,
                zone: zone.clone(),
            });
        }
    }
    Ok(())
}

/// Master zones must have an odd count for etcd quorum
pub fn validate_master_zone_count(master_zones: &[String]) -> Result<(), ConfigError> {
    if master_zones.len() % 2 == 0 {
        return Err(ConfigError::EvenMasterZones(master_zones.len()));
    }
    Ok(())
}

/// Split a comma separated zone list: trimmed, lower-cased, empties dropped
pub fn parse_zone_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|z| !z.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Last two labels of a DNS name
pub fn default_dns_zone(name: &str) -> String {
    let labels: Vec<&str> = name.split('.').collect();
    let start = labels.len().saturating_sub(2);
    labels[start..].join(".")
}

/// Strip whitespace and a leading `v`
pub fn normalize_kubernetes_version(version: &str) -> String {
    let trimmed = version.trim();
    trimmed.strip_prefix('v').unwrap_or(trimmed).to_string()
}
