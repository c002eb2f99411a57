#![allow(deprecated)] // cargo_bin

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn models_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../models")
}

/// Comma-joined model list as passed to `--model`
fn model_list(dirs: &[PathBuf]) -> String {
    dirs.iter()
        .map(|d| d.display().to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Workspace with a state directory and an SSH public key
struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("id_rsa.pub"),
            "ssh-rsa AAAAB3NzaC1yc2EAAAADAQABAAABAQC7 test@example\n",
        )
        .unwrap();
        Self { dir }
    }

    fn state(&self) -> PathBuf {
        self.dir.path().join("state")
    }

    fn cmd(&self) -> Command {
        self.cmd_with_models(&[models_root().join("proto"), models_root().join("cloudup")])
    }

    fn cmd_with_models(&self, models: &[PathBuf]) -> Command {
        self.cmd_with(models, &models_root().join("nodeup"))
    }

    fn cmd_with(&self, models: &[PathBuf], node_model: &Path) -> Command {
        let mut cmd = Command::cargo_bin("cloudup").unwrap();
        cmd.env_remove("CLOUDUP_TARGET")
            .env_remove("CLOUDUP_CONF")
            .env_remove("CLOUDUP_MODEL")
            .env_remove("CLOUDUP_NODEMODEL")
            .arg("--model")
            .arg(model_list(models))
            .arg("--nodemodel")
            .arg(node_model)
            .arg("--state")
            .arg(self.state())
            .arg("--ssh-public-key")
            .arg(self.dir.path().join("id_rsa.pub"))
            .arg("--kubernetes-version")
            .arg("1.3.0");
        cmd
    }

    /// Command for the three-zone AWS test cluster with one master zone
    fn aws_cluster(&self) -> Command {
        Self::with_aws_cluster(self.cmd())
    }

    fn with_aws_cluster(mut cmd: Command) -> Command {
        cmd.args([
            "--name",
            "test.k8s.local",
            "--cloud",
            "aws",
            "--zones",
            "us-east-1a,us-east-1b,us-east-1c",
            "--master-zones",
            "us-east-1a",
        ]);
        cmd
    }
}

/// Help lists the provisioning flags
#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("cloudup").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--target"))
        .stdout(predicate::str::contains("--master-zones"))
        .stdout(predicate::str::contains("--ssh-public-key"))
        .stdout(predicate::str::contains("--nodemodel"))
        .stdout(predicate::str::contains("models/proto,models/cloudup"))
        .stdout(predicate::str::contains("models/nodeup"));
}

#[test]
fn test_invalid_target() {
    let mut cmd = Command::cargo_bin("cloudup").unwrap();
    cmd.args(["--target", "cloudformation"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported target type"));
}

#[test]
fn test_even_master_zones_rejected() {
    let ws = Workspace::new();
    ws.cmd()
        .args([
            "--name",
            "test.k8s.local",
            "--cloud",
            "aws",
            "--zones",
            "us-east-1a,us-east-1b",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("odd number of master zones"));
    assert!(!ws.state().join("cloud").exists());
}

#[test]
fn test_master_zone_must_be_node_zone() {
    let ws = Workspace::new();
    ws.cmd()
        .args([
            "--name",
            "test.k8s.local",
            "--cloud",
            "aws",
            "--zones",
            "us-east-1a",
            "--master-zones",
            "us-east-1b",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("master zone us-east-1b is not a node zone"));
}

#[test]
fn test_missing_cloud_provider() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["--name", "test.k8s.local", "--zones", "us-east-1a"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("cloud provider is required"));
}

#[test]
fn test_gce_requires_project() {
    let ws = Workspace::new();
    ws.cmd()
        .env_remove("CLOUDUP_PROJECT")
        .args([
            "--name",
            "test.k8s.local",
            "--cloud",
            "gce",
            "--zones",
            "us-central1-b",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("project is required"));
}

#[test]
fn test_dryrun_performs_no_mutation() {
    let ws = Workspace::new();
    ws.aws_cluster()
        .arg("--dryrun")
        .assert()
        .success()
        .stdout(predicate::str::contains("Will create resources:"))
        .stdout(predicate::str::contains("vpc"))
        .stdout(predicate::str::contains("us-east-1a.masters.test.k8s.local"))
        .stdout(predicate::str::contains("Plan: 42 to create, 0 to update, 0 unchanged"));
    // The control plane is only persisted by the direct target
    assert!(!ws.state().join("cloud").join("aws.json").exists());
}

#[test]
fn test_direct_then_dryrun_converges() {
    let ws = Workspace::new();
    ws.aws_cluster()
        .arg("--target")
        .arg("direct")
        .assert()
        .success()
        .stdout(predicate::str::contains("Cluster is up to date"));

    let saved = fs::read_to_string(ws.state().join("cloud").join("aws.json")).unwrap();
    let state: serde_json::Value = serde_json::from_str(&saved).unwrap();
    assert!(state["resources"]["vpc/test.k8s.local"].is_object());

    ws.aws_cluster()
        .arg("--dryrun")
        .assert()
        .success()
        .stdout(predicate::str::contains("No changes need to be applied"))
        .stdout(predicate::str::contains("0 to create, 0 to update"));
}

#[test]
fn test_terraform_output_is_reproducible() {
    let ws = Workspace::new();
    let tf_file = ws.state().join("terraform").join("kubernetes.tf.json");

    ws.aws_cluster()
        .args(["--target", "terraform"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Terraform configuration written"));
    let first = fs::read_to_string(&tf_file).unwrap();

    ws.aws_cluster()
        .args(["--target", "terraform"])
        .assert()
        .success();
    let second = fs::read_to_string(&tf_file).unwrap();
    assert_eq!(first, second);

    let doc: serde_json::Value = serde_json::from_str(&first).unwrap();
    assert_eq!(doc["provider"]["aws"]["region"], "us-east-1");
    assert!(doc["resource"]["aws_vpc"]["test-k8s-local"].is_object());
    assert_eq!(
        doc["resource"]["aws_subnet"]["us-east-1a-test-k8s-local"]["vpc_id"],
        "${aws_vpc.test-k8s-local.id}"
    );
    // Nothing was created against the control plane
    assert!(!ws.state().join("cloud").join("aws.json").exists());
}

#[test]
fn test_gce_terraform() {
    let ws = Workspace::new();
    ws.cmd()
        .args([
            "--name",
            "test.k8s.local",
            "--cloud",
            "gce",
            "--zones",
            "us-central1-b",
            "--project",
            "my-project",
            "--target",
            "terraform",
        ])
        .assert()
        .success();

    let tf_dir = ws.state().join("terraform");
    let text = fs::read_to_string(tf_dir.join("kubernetes.tf.json")).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(doc["provider"]["google"]["project"], "my-project");
    assert_eq!(doc["provider"]["google"]["region"], "us-central1");
    assert!(doc["resource"]["google_compute_instance"]["master-test-k8s-local"].is_object());
    // Startup scripts are written next to the document
    assert!(
        tf_dir
            .join("data")
            .join("google_compute_instance_master-test-k8s-local_metadata_startup-script")
            .exists()
    );
}

#[test]
fn test_direct_failure_keeps_applied_changes() {
    let ws = Workspace::new();
    let model = ws.dir.path().join("model");
    fs::create_dir_all(&model).unwrap();
    fs::write(
        model.join("cluster.yaml"),
        r#"
vpc/test.k8s.local:
  cidr: 172.20.0.0/16

subnet/us-east-1a.test.k8s.local:
  vpc: test.k8s.local
  availabilityZone: us-east-1a
  cidr: 172.20.32.0/19

securityGroup/nodes.test.k8s.local:
  vpc: test.k8s.local
  description: nodes

sshKey/kubernetes.test.k8s.local:
  publicKey: ssh-rsa AAAA test@example

launchConfiguration/nodes.test.k8s.local:
  imageId: ami-12345
  instanceType: t2.medium
  sshKey: kubernetes.test.k8s.local
  securityGroups:
    - nodes.test.k8s.local

autoscalingGroup/nodes.test.k8s.local:
  launchConfiguration: nodes.test.k8s.local
  subnets:
    - us-east-1a.test.k8s.local
  minSize: 3
  maxSize: 1
"#,
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("cloudup").unwrap();
    cmd.env_remove("CLOUDUP_TARGET")
        .env_remove("CLOUDUP_CONF")
        .env_remove("CLOUDUP_MODEL")
        .env_remove("CLOUDUP_NODEMODEL")
        .arg("--model")
        .arg(&model)
        .arg("--nodemodel")
        .arg(models_root().join("nodeup"))
        .arg("--state")
        .arg(ws.state())
        .arg("--ssh-public-key")
        .arg(ws.dir.path().join("id_rsa.pub"))
        .args([
            "--kubernetes-version",
            "1.3.0",
            "--name",
            "test.k8s.local",
            "--cloud",
            "aws",
            "--zones",
            "us-east-1a",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "error running task autoscalingGroup/nodes.test.k8s.local",
        ))
        .stderr(predicate::str::contains("minSize 3 exceeds maxSize 1"));

    // Resources applied before the failure are persisted
    let saved = fs::read_to_string(ws.state().join("cloud").join("aws.json")).unwrap();
    let state: serde_json::Value = serde_json::from_str(&saved).unwrap();
    assert!(state["resources"]["vpc/test.k8s.local"].is_object());
    assert!(state["resources"]["launchConfiguration/nodes.test.k8s.local"].is_object());
    assert!(state["resources"]["autoscalingGroup/nodes.test.k8s.local"].is_null());
}

/// Options from a site proto model size the instances unless a flag wins
#[test]
fn test_proto_options_feed_terraform() {
    let ws = Workspace::new();
    let proto = ws.dir.path().join("proto");
    fs::create_dir_all(proto.join("_aws")).unwrap();
    fs::write(proto.join("_aws").join("sizes.options"), "NodeMachineType: t2.small\n").unwrap();
    let tf_file = ws.state().join("terraform").join("kubernetes.tf.json");
    let models = [proto, models_root().join("cloudup")];

    let node_type = || {
        let doc: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&tf_file).unwrap()).unwrap();
        doc["resource"]["aws_launch_configuration"]["nodes-test-k8s-local"]["instance_type"]
            .clone()
    };

    Workspace::with_aws_cluster(ws.cmd_with_models(&models))
        .args(["--target", "terraform"])
        .assert()
        .success();
    assert_eq!(node_type(), "t2.small");

    Workspace::with_aws_cluster(ws.cmd_with_models(&models))
        .args(["--target", "terraform", "--node-size", "m4.large"])
        .assert()
        .success();
    assert_eq!(node_type(), "m4.large");
}

#[test]
fn test_missing_node_model() {
    let ws = Workspace::new();
    let models = [models_root().join("proto"), models_root().join("cloudup")];
    Workspace::with_aws_cluster(ws.cmd_with(&models, &ws.dir.path().join("absent")))
        .arg("--dryrun")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error loading node model"));
}
