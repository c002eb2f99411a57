//! The create-cluster flow: configuration to task map to target

use anyhow::Context;
use cloudup_cloud::{CloudApi, LocalControlPlane};
use cloudup_core::{
    Capabilities, Cloud, ClusterConfig, DirectTarget, DryRunTarget, Loader, NodeModel, Registry,
    RunContext, RunReport, TagSet, Target, TargetKind, TaskContext, TerraformProvider,
    TerraformTarget, tags,
};
use cloudup_state::StateStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Resource name under which the SSH public key is offered to templates
pub const SSH_PUBLIC_KEY_RESOURCE: &str = "ssh-public-key";

#[derive(Debug)]
pub struct CreateCluster {
    pub config: ClusterConfig,
    pub target: TargetKind,
    pub models: Vec<PathBuf>,
    /// Node configuration templates offered through `NodeConfig`
    pub node_model: Option<PathBuf>,
    pub state_dir: PathBuf,
    pub ssh_public_key: Option<PathBuf>,
    pub jobs: usize,
}

/// Provider-specific pieces settled during validation
struct ProviderSetup {
    region: String,
    terraform: TerraformProvider,
}

impl CreateCluster {
    pub fn control_plane_path(state_dir: &Path, cloud: Cloud) -> PathBuf {
        state_dir.join("cloud").join(format!("{}.json", cloud.as_str()))
    }

    pub fn terraform_dir(state_dir: &Path) -> PathBuf {
        state_dir.join("terraform")
    }

    #[tracing::instrument(
        skip_all,
        fields(cluster = %self.config.cluster_name, target = %self.target)
    )]
    pub async fn run(mut self) -> anyhow::Result<RunReport> {
        let cloud = self.config.validate()?;
        let store = StateStore::open_local(&self.state_dir)
            .with_context(|| format!("error opening state store {}", self.state_dir.display()))?;
        debug!(state = %store.location(), "Opened state store");

        let ssh_key = self.read_ssh_key().await?;

        let mut registry = Registry::new();
        cloudup_core::register_builtin_tasks(&mut registry)?;
        let setup = match cloud {
            Cloud::Aws => {
                cloudup_cloud_aws::register_tasks(&mut registry)?;
                let region = cloudup_cloud_aws::validate(&self.config, ssh_key.is_some())?;
                ProviderSetup {
                    terraform: cloudup_cloud_aws::terraform_provider(&region),
                    region,
                }
            }
            Cloud::Gce => {
                cloudup_cloud_gce::register_tasks(&mut registry)?;
                let (region, project) = cloudup_cloud_gce::validate(&self.config)?;
                ProviderSetup {
                    terraform: cloudup_cloud_gce::terraform_provider(&project, &region),
                    region,
                }
            }
        };
        self.config.region = Some(setup.region);

        // Model options fill what the configuration left unset
        let option_tags = TagSet::for_cluster(&self.config, cloud);
        let option_caps = Arc::new(Capabilities::new(option_tags, store.ca(), store.secrets()));
        let options =
            Loader::new(&registry, option_caps, &self.config)?.build_options(&self.models)?;
        let applied = self.config.apply_options(options)?;
        if !applied.is_empty() {
            info!(options = ?applied, "Applied model options");
        }

        match cloud {
            Cloud::Aws => cloudup_cloud_aws::apply_defaults(&mut self.config),
            Cloud::Gce => cloudup_cloud_gce::apply_defaults(&mut self.config),
        }
        self.config.apply_defaults();
        self.config.node_up_tags = tags::nodeup_tags(&self.config, cloud);

        let tag_set = TagSet::for_cluster(&self.config, cloud);
        info!(tags = ?tag_set.iter().collect::<Vec<_>>(), "Resolved capability tags");

        let mut capabilities = Capabilities::new(tag_set, store.ca(), store.secrets());
        if let Some(dir) = &self.node_model {
            let model = NodeModel::load(dir, &self.config)
                .with_context(|| format!("error loading node model {}", dir.display()))?;
            capabilities = capabilities.with_node_model(model);
        }
        if let Some(key) = ssh_key {
            capabilities = capabilities.with_resource(SSH_PUBLIC_KEY_RESOURCE, key.into_bytes());
        }
        if cloud == Cloud::Aws {
            capabilities = cloudup_cloud_aws::with_helpers(capabilities, &self.config);
        }

        let loader = Loader::new(&registry, Arc::new(capabilities), &self.config)?;
        let tasks = Arc::new(loader.build(&self.models)?);

        let plane = match self.target {
            TargetKind::Direct | TargetKind::DryRun => {
                let path = Self::control_plane_path(&self.state_dir, cloud);
                let plane = LocalControlPlane::load(cloud.as_str(), &path)
                    .await
                    .with_context(|| {
                        format!("error loading control plane state {}", path.display())
                    })?;
                Some(Arc::new(plane))
            }
            TargetKind::Terraform => None,
        };
        let target = match self.target {
            TargetKind::Direct => Target::Direct(DirectTarget::new()),
            TargetKind::DryRun => Target::DryRun(DryRunTarget::new()),
            TargetKind::Terraform => Target::Terraform(TerraformTarget::new(
                Self::terraform_dir(&self.state_dir),
                setup.terraform,
            )),
        };

        let cloud_api = plane.clone().map(|p| p as Arc<dyn CloudApi>);
        let task_context =
            TaskContext::new(cloud_api, store.ca(), self.config.cluster_name.clone());
        let context = RunContext::new(target, task_context).with_jobs(self.jobs);

        let result = context.run(tasks).await;

        // Applied changes stay visible even when a later task failed
        if self.target == TargetKind::Direct
            && let Some(plane) = &plane
        {
            if let Err(e) = plane.save().await {
                if result.is_ok() {
                    return Err(e).context("error saving control plane state");
                }
                warn!(error = %e, "Failed to save control plane state");
            }
        }

        Ok(result?)
    }

    /// Contents of the SSH public key; a missing file yields `None`
    async fn read_ssh_key(&self) -> anyhow::Result<Option<String>> {
        let Some(path) = &self.ssh_public_key else {
            return Ok(None);
        };
        match tokio::fs::read_to_string(path).await {
            Ok(key) => {
                debug!(path = %path.display(), "Read SSH public key");
                Ok(Some(key))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "SSH public key not found");
                Ok(None)
            }
            Err(e) => Err(e)
                .with_context(|| format!("error reading SSH public key {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use cloudup_cloud::ChangeType;
    use std::collections::{BTreeMap, BTreeSet};
    use tempfile::TempDir;

    fn models_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../models")
    }

    fn command(dir: &TempDir, config: ClusterConfig, target: TargetKind) -> CreateCluster {
        let key = dir.path().join("id_rsa.pub");
        std::fs::write(&key, "ssh-rsa AAAA test@example\n").unwrap();
        CreateCluster {
            config,
            target,
            models: vec![models_root().join("proto"), models_root().join("cloudup")],
            node_model: Some(models_root().join("nodeup")),
            state_dir: dir.path().join("state"),
            ssh_public_key: Some(key),
            jobs: 4,
        }
    }

    fn aws_config() -> ClusterConfig {
        ClusterConfig {
            cluster_name: "test.k8s.local".into(),
            cloud_provider: Some(Cloud::Aws),
            node_zones: vec!["us-east-1a".into(), "us-east-1b".into()],
            master_zones: vec!["us-east-1a".into()],
            kubernetes_version: Some("1.3.0".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_default_aws_topology() {
        let dir = tempfile::tempdir().unwrap();
        let report = command(&dir, aws_config(), TargetKind::DryRun)
            .run()
            .await
            .unwrap();

        let plan = &report.plan;
        assert!(plan.changes.iter().all(|c| c.change_type == ChangeType::Create));

        // Masters run in an ASG without a balancer; protokube owns the record
        let expected: BTreeSet<(&str, &str)> = [
            ("keypair", "master"),
            ("keypair", "kubelet"),
            ("keypair", "kubecfg"),
            ("vpc", "test.k8s.local"),
            ("dhcpOptions", "test.k8s.local"),
            ("vpcDHCPOptionsAssociation", "test.k8s.local"),
            ("internetGateway", "test.k8s.local"),
            ("internetGatewayAttachment", "test.k8s.local"),
            ("routeTable", "test.k8s.local"),
            ("route", "internet.test.k8s.local"),
            ("subnet", "us-east-1a.test.k8s.local"),
            ("subnet", "us-east-1b.test.k8s.local"),
            ("routeTableAssociation", "us-east-1a.test.k8s.local"),
            ("routeTableAssociation", "us-east-1b.test.k8s.local"),
            ("securityGroup", "masters.test.k8s.local"),
            ("securityGroup", "nodes.test.k8s.local"),
            ("securityGroupRule", "all-master-to-master"),
            ("securityGroupRule", "all-master-to-node"),
            ("securityGroupRule", "all-node-to-master"),
            ("securityGroupRule", "all-node-to-node"),
            ("securityGroupRule", "ssh-external-to-master"),
            ("securityGroupRule", "ssh-external-to-node"),
            ("securityGroupRule", "https-external-to-master"),
            ("securityGroupRule", "master-egress"),
            ("securityGroupRule", "node-egress"),
            ("iamRole", "masters.test.k8s.local"),
            ("iamRolePolicy", "masters.test.k8s.local"),
            ("iamInstanceProfile", "masters.test.k8s.local"),
            ("iamInstanceProfileRole", "masters.test.k8s.local"),
            ("iamRole", "nodes.test.k8s.local"),
            ("iamRolePolicy", "nodes.test.k8s.local"),
            ("iamInstanceProfile", "nodes.test.k8s.local"),
            ("iamInstanceProfileRole", "nodes.test.k8s.local"),
            ("sshKey", "kubernetes.test.k8s.local"),
            ("launchConfiguration", "nodes.test.k8s.local"),
            ("autoscalingGroup", "nodes.test.k8s.local"),
            ("ebsVolume", "us-east-1a.etcd-main.test.k8s.local"),
            ("launchConfiguration", "us-east-1a.masters.test.k8s.local"),
            ("autoscalingGroup", "us-east-1a.masters.test.k8s.local"),
            ("dnsZone", "k8s.local"),
        ]
        .into_iter()
        .collect();
        let planned: BTreeSet<(&str, &str)> = plan
            .changes
            .iter()
            .map(|c| (c.kind.as_str(), c.name.as_str()))
            .collect();
        assert_eq!(planned, expected);
        assert_eq!(plan.changes.len(), expected.len());

        let ssh = plan.get("sshKey", "kubernetes.test.k8s.local").unwrap();
        assert_eq!(ssh.desired["publicKey"], "ssh-rsa AAAA test@example");
    }

    #[tokio::test]
    async fn test_single_master_behind_load_balancer() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClusterConfig {
            master_asg: Some(false),
            master_lb: Some(true),
            ..aws_config()
        };
        let report = command(&dir, config, TargetKind::DryRun)
            .run()
            .await
            .unwrap();

        let plan = &report.plan;
        assert!(plan.get("instance", "master.test.k8s.local").is_some());
        assert!(plan.get("elasticIP", "master.test.k8s.local").is_some());
        assert!(plan.get("autoscalingGroup", "us-east-1a.masters.test.k8s.local").is_none());

        let attachment = plan.get("loadBalancerAttachment", "api.test.k8s.local").unwrap();
        assert_eq!(attachment.desired["instance"], "master.test.k8s.local");
        let record = plan.get("dnsName", "api.test.k8s.local").unwrap();
        assert_eq!(record.desired["targetLoadBalancer"], "api.test.k8s.local");
    }

    #[tokio::test]
    async fn test_secrets_survive_runs() {
        let dir = tempfile::tempdir().unwrap();
        let user_data = |report: &RunReport| {
            report
                .plan
                .get("launchConfiguration", "nodes.test.k8s.local")
                .unwrap()
                .desired["userData"]
                .clone()
        };

        let first = command(&dir, aws_config(), TargetKind::DryRun).run().await.unwrap();
        let second = command(&dir, aws_config(), TargetKind::DryRun).run().await.unwrap();
        assert_eq!(user_data(&first), user_data(&second));

        let store = StateStore::open_local(dir.path().join("state")).unwrap();
        assert_eq!(store.secrets().list_ids().unwrap(), vec!["kube", "kubelet"]);
    }

    #[tokio::test]
    async fn test_gce_topology() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClusterConfig {
            cluster_name: "test.k8s.local".into(),
            cloud_provider: Some(Cloud::Gce),
            project: Some("my-project".into()),
            node_zones: vec!["us-central1-b".into(), "us-central1-c".into()],
            master_zones: vec!["us-central1-b".into()],
            kubernetes_version: Some("1.3.0".into()),
            ..Default::default()
        };
        let report = command(&dir, config, TargetKind::DryRun)
            .run()
            .await
            .unwrap();

        let plan = &report.plan;
        assert!(plan.get("instance", "master.test.k8s.local").is_some());
        assert!(plan.get("managedInstanceGroup", "us-central1-c.nodes.test.k8s.local").is_some());
        assert!(plan.get("vpc", "test.k8s.local").is_none());
        assert!(plan.changes.iter().all(|c| c.kind != "sshKey"));
    }

    /// Decode the node configuration embedded in instance user data
    fn node_config(report: &RunReport, kind: &str, name: &str) -> BTreeMap<String, String> {
        let change = report.plan.get(kind, name).unwrap();
        let user_data = change.desired["userData"].as_str().unwrap();
        let encoded = user_data
            .lines()
            .find_map(|line| line.trim().strip_prefix("NODE_CONFIG="))
            .unwrap();
        serde_yaml::from_slice(&BASE64.decode(encoded).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_user_data_carries_node_config() {
        let dir = tempfile::tempdir().unwrap();
        let report = command(&dir, aws_config(), TargetKind::DryRun)
            .run()
            .await
            .unwrap();

        let node = node_config(&report, "launchConfiguration", "nodes.test.k8s.local");
        assert!(node["cluster.yaml"].contains("clusterName: test.k8s.local"));
        assert!(node["kubelet.yaml"].contains("https://api.test.k8s.local"));
        assert!(node.contains_key("_kubernetes_pool/kube-proxy.yaml"));
        assert!(node.contains_key("_aws/cloud.yaml"));
        assert!(!node.contains_key("_kubernetes_master/etcd.yaml"));
        assert!(!node.contains_key("_gce/cloud.yaml"));

        let master = node_config(
            &report,
            "launchConfiguration",
            "us-east-1a.masters.test.k8s.local",
        );
        assert!(master["_kubernetes_master/kube-apiserver.yaml"].contains("v1.3.0"));
        assert!(master.contains_key("_kubernetes_master/etcd.yaml"));
        assert!(master["_protokube/protokube.yaml"].contains("dnsZone: k8s.local"));
        assert!(!master.contains_key("_kubernetes_pool/kube-proxy.yaml"));
    }

    #[tokio::test]
    async fn test_missing_node_model_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut cmd = command(&dir, aws_config(), TargetKind::DryRun);
        cmd.node_model = Some(dir.path().join("absent"));
        let err = cmd.run().await.unwrap_err();
        assert!(format!("{err:#}").contains("error loading node model"));
    }

    #[tokio::test]
    async fn test_options_yield_to_explicit_config() {
        let dir = tempfile::tempdir().unwrap();
        let proto = dir.path().join("proto");
        std::fs::create_dir_all(proto.join("_aws")).unwrap();
        std::fs::write(
            proto.join("_aws/sizes.options"),
            "NodeMachineType: t2.small\nMasterMachineType: m3.large\nNodeCount: 5\n",
        )
        .unwrap();

        let instance_type = |report: &RunReport, name: &str| {
            report.plan.get("launchConfiguration", name).unwrap().desired["instanceType"].clone()
        };

        let mut cmd = command(&dir, aws_config(), TargetKind::DryRun);
        cmd.models = vec![proto.clone(), models_root().join("cloudup")];
        let report = cmd.run().await.unwrap();
        assert_eq!(instance_type(&report, "nodes.test.k8s.local"), "t2.small");
        assert_eq!(instance_type(&report, "us-east-1a.masters.test.k8s.local"), "m3.large");
        let group = report.plan.get("autoscalingGroup", "nodes.test.k8s.local").unwrap();
        assert_eq!(group.desired["minSize"], 5);

        let config = ClusterConfig {
            node_machine_type: Some("c4.large".into()),
            ..aws_config()
        };
        let mut cmd = command(&dir, config, TargetKind::DryRun);
        cmd.models = vec![proto, models_root().join("cloudup")];
        let report = cmd.run().await.unwrap();
        assert_eq!(instance_type(&report, "nodes.test.k8s.local"), "c4.large");
        assert_eq!(instance_type(&report, "us-east-1a.masters.test.k8s.local"), "m3.large");
    }

    #[tokio::test]
    async fn test_aws_requires_ssh_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut cmd = command(&dir, aws_config(), TargetKind::DryRun);
        cmd.ssh_public_key = Some(dir.path().join("missing.pub"));
        let err = cmd.run().await.unwrap_err();
        assert!(err.to_string().contains("SSH public key must be specified"));
    }
}
