use anyhow::Context;
use clap::Parser;
use cloudup_core::config::parse_zone_list;
use cloudup_core::{Cloud, ClusterConfig, DEFAULT_JOBS, TargetKind};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "cloudup")]
#[command(
    version,
    about = "Provision a Kubernetes cluster from declarative cloud models",
    long_about = None
)]
pub struct Cli {
    /// Target type: direct, dryrun or terraform
    #[arg(long, env = "CLOUDUP_TARGET", default_value = "direct")]
    pub target: TargetKind,

    /// Only report what would change (same as --target=dryrun)
    #[arg(long)]
    pub dryrun: bool,

    /// Cluster configuration file (YAML)
    #[arg(long, env = "CLOUDUP_CONF")]
    pub conf: Option<PathBuf>,

    /// Model directories, comma separated; later directories win on options
    #[arg(
        long,
        env = "CLOUDUP_MODEL",
        value_delimiter = ',',
        default_value = "models/proto,models/cloudup"
    )]
    pub model: Vec<PathBuf>,

    /// Node configuration model offered to fragments through `NodeConfig`
    #[arg(long, env = "CLOUDUP_NODEMODEL", default_value = "models/nodeup")]
    pub nodemodel: PathBuf,

    /// State store directory
    #[arg(long, env = "CLOUDUP_STATE", default_value = "./state")]
    pub state: PathBuf,

    /// Cloud provider: aws or gce
    #[arg(long, env = "CLOUDUP_CLOUD")]
    pub cloud: Option<Cloud>,

    /// Node zones, comma separated
    #[arg(long)]
    pub zones: Option<String>,

    /// Master zones, comma separated (defaults to the node zones)
    #[arg(long)]
    pub master_zones: Option<String>,

    /// GCE project
    #[arg(long, env = "CLOUDUP_PROJECT")]
    pub project: Option<String>,

    /// Cluster name
    #[arg(long, env = "CLOUDUP_CLUSTER_NAME")]
    pub name: Option<String>,

    /// Kubernetes version; the latest stable release when unset
    #[arg(long)]
    pub kubernetes_version: Option<String>,

    /// SSH public key installed on every instance [default: ~/.ssh/id_rsa.pub]
    #[arg(long, env = "CLOUDUP_SSH_PUBLIC_KEY")]
    pub ssh_public_key: Option<PathBuf>,

    /// Machine type for nodes
    #[arg(long)]
    pub node_size: Option<String>,

    /// Machine type for masters
    #[arg(long)]
    pub master_size: Option<String>,

    /// Number of nodes
    #[arg(long)]
    pub node_count: Option<u32>,

    /// DNS hosted zone for the master name
    #[arg(long)]
    pub dns_zone: Option<String>,

    /// Maximum number of tasks running at once
    #[arg(long, default_value_t = DEFAULT_JOBS)]
    pub jobs: usize,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// `--dryrun` wins over `--target`
    pub fn target_kind(&self) -> TargetKind {
        if self.dryrun {
            TargetKind::DryRun
        } else {
            self.target
        }
    }

    pub fn ssh_public_key_path(&self) -> Option<PathBuf> {
        self.ssh_public_key
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(".ssh").join("id_rsa.pub")))
    }

    /// Configuration file merged with the flags; flags win
    pub fn cluster_config(&self) -> anyhow::Result<ClusterConfig> {
        let config = match &self.conf {
            Some(path) => read_config(path)?,
            None => ClusterConfig::default(),
        };
        Ok(self.apply_flags(config))
    }

    fn apply_flags(&self, mut config: ClusterConfig) -> ClusterConfig {
        if let Some(name) = &self.name {
            config.cluster_name = name.clone();
        }
        if let Some(cloud) = self.cloud {
            config.cloud_provider = Some(cloud);
        }
        if let Some(project) = &self.project {
            config.project = Some(project.clone());
        }

        config.node_zones = match &self.zones {
            Some(zones) => parse_zone_list(zones),
            None => normalize_zones(&config.node_zones),
        };
        config.master_zones = match &self.master_zones {
            Some(zones) => parse_zone_list(zones),
            None => normalize_zones(&config.master_zones),
        };
        // Only an absent master-zone input falls back to the node zones
        if config.master_zones.is_empty() {
            config.master_zones = config.node_zones.clone();
        }

        if let Some(version) = &self.kubernetes_version {
            config.kubernetes_version = Some(version.clone());
        }
        if let Some(size) = &self.node_size {
            config.node_machine_type = Some(size.clone());
        }
        if let Some(size) = &self.master_size {
            config.master_machine_type = Some(size.clone());
        }
        if let Some(count) = self.node_count {
            config.node_count = Some(count);
        }
        if let Some(zone) = &self.dns_zone {
            config.dns_zone = Some(zone.clone());
        }
        config
    }
}

fn read_config(path: &Path) -> anyhow::Result<ClusterConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("error reading configuration file {}", path.display()))?;
    ClusterConfig::from_yaml(&content)
        .with_context(|| format!("error parsing configuration file {}", path.display()))
}

fn normalize_zones(zones: &[String]) -> Vec<String> {
    parse_zone_list(&zones.join(","))
}
