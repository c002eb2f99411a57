//! Route53 hosted zones and records

use super::compute::ElasticIp;
use super::elb::LoadBalancer;
use super::{dep, opt_dep};
use cloudup_cloud::{Attributes, to_attributes};
use cloudup_core::{ResourceTask, TaskContext, TaskError, TaskKey, TerraformOutput, tf_ref};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DnsZone {
    pub name: String,
}

impl ResourceTask for DnsZone {
    const KIND: &'static str = "dnsZone";

    fn name(&self) -> &str {
        &self.name
    }

    fn render_terraform(
        &self,
        _ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        out.add_resource("aws_route53_zone", &self.name, json!({ "name": self.name }))
    }
}

/// A record pointing at a load balancer (alias) or an elastic IP
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DnsName {
    pub name: String,
    pub zone: String,
    #[serde(default = "default_record_type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_load_balancer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_elastic_ip: Option<String>,
}

fn default_record_type() -> String {
    "A".to_string()
}

enum RecordTarget<'a> {
    LoadBalancer(&'a str),
    ElasticIp(&'a str),
}

impl DnsName {
    /// The single target the record points at
    fn check_target(&self) -> Result<RecordTarget<'_>, TaskError> {
        match (&self.target_load_balancer, &self.target_elastic_ip) {
            (Some(lb), None) => Ok(RecordTarget::LoadBalancer(lb)),
            (None, Some(eip)) => Ok(RecordTarget::ElasticIp(eip)),
            _ => Err(TaskError::Invalid(format!(
                "dnsName {}: exactly one of targetLoadBalancer or targetElasticIp must be set",
                self.name
            ))),
        }
    }
}

impl ResourceTask for DnsName {
    const KIND: &'static str = "dnsName";

    fn name(&self) -> &str {
        &self.name
    }

    fn desired(&self) -> Result<Attributes, TaskError> {
        self.check_target()?;
        let mut attributes = to_attributes(Self::KIND, self)?;
        attributes.remove("name");
        Ok(attributes)
    }

    fn dependencies(&self) -> Vec<TaskKey> {
        let mut deps = vec![dep(DnsZone::KIND, &self.zone)];
        deps.extend(opt_dep(LoadBalancer::KIND, self.target_load_balancer.as_ref()));
        deps.extend(opt_dep(ElasticIp::KIND, self.target_elastic_ip.as_ref()));
        deps
    }

    fn render_terraform(
        &self,
        _ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        let target = self.check_target()?;
        let mut body = json!({
            "zone_id": tf_ref("aws_route53_zone", &self.zone, "zone_id"),
            "name": self.name,
            "type": self.resource_type,
        });
        match target {
            RecordTarget::LoadBalancer(lb) => {
                body["alias"] = json!({
                    "name": tf_ref("aws_elb", lb, "dns_name"),
                    "zone_id": tf_ref("aws_elb", lb, "zone_id"),
                    "evaluate_target_health": false,
                });
            }
            RecordTarget::ElasticIp(eip) => {
                body["ttl"] = json!(60);
                body["records"] = json!([tf_ref("aws_eip", eip, "public_ip")]);
            }
        }
        out.add_resource("aws_route53_record", &self.name, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudup_cloud::{CloudApi, LocalControlPlane};
    use cloudup_core::{
        DirectTarget, DryRunTarget, RunContext, Target, Task, TaskMap, TerraformProvider,
        TerraformTarget,
    };
    use cloudup_state::{CaStore, FsVfs};
    use std::sync::Arc;

    #[test]
    fn test_record_targets() {
        let dir = tempfile::tempdir().unwrap();
        let ca = Arc::new(CaStore::new(Arc::new(FsVfs::new(dir.path()))));
        let ctx = TaskContext::new(None, ca, "test.k8s.local");

        let by_ip: DnsName = serde_yaml::from_str(
            "name: api.test.k8s.local\nzone: k8s.local\ntargetElasticIp: master.test.k8s.local\n",
        )
        .unwrap();
        assert_eq!(by_ip.resource_type, "A");
        assert_eq!(
            Task::dependencies(&by_ip),
            vec![
                TaskKey::new("dnsZone", "k8s.local"),
                TaskKey::new("elasticIP", "master.test.k8s.local"),
            ]
        );

        let mut out = TerraformOutput::new();
        Task::render_terraform(&by_ip, &ctx, &mut out).unwrap();
        let block = out.resource("aws_route53_record", "api.test.k8s.local").unwrap();
        assert_eq!(block["records"][0], "${aws_eip.master-test-k8s-local.public_ip}");
        assert_eq!(block["zone_id"], "${aws_route53_zone.k8s-local.zone_id}");

        let dangling = DnsName {
            target_elastic_ip: None,
            ..by_ip
        };
        assert!(Task::render_terraform(&dangling, &ctx, &mut TerraformOutput::new()).is_err());
        assert!(Task::desired(&dangling).is_err());
    }

    /// A zone plus a record that points at both a balancer and an address
    fn ambiguous_record() -> Arc<TaskMap> {
        let mut tasks = TaskMap::new();
        let zone = DnsZone {
            name: "k8s.local".into(),
        };
        let record = DnsName {
            name: "api.test.k8s.local".into(),
            zone: "k8s.local".into(),
            resource_type: default_record_type(),
            target_load_balancer: Some("api.test.k8s.local".into()),
            target_elastic_ip: Some("master.test.k8s.local".into()),
        };
        tasks.insert(Arc::new(zone), "dns.yaml").unwrap();
        tasks.insert(Arc::new(record), "dns.yaml").unwrap();
        Arc::new(tasks)
    }

    #[tokio::test]
    async fn test_invalid_record_rejected_by_every_target() {
        let dir = tempfile::tempdir().unwrap();
        let ca = Arc::new(CaStore::new(Arc::new(FsVfs::new(dir.path()))));
        let plane: Arc<dyn CloudApi> = Arc::new(LocalControlPlane::in_memory("aws"));

        let targets = [
            (
                Target::DryRun(DryRunTarget::new()),
                TaskContext::new(Some(Arc::clone(&plane)), Arc::clone(&ca), "test.k8s.local"),
            ),
            (
                Target::Direct(DirectTarget::new()),
                TaskContext::new(Some(Arc::clone(&plane)), Arc::clone(&ca), "test.k8s.local"),
            ),
            (
                Target::Terraform(TerraformTarget::new(
                    dir.path().join("terraform"),
                    TerraformProvider::new("aws"),
                )),
                TaskContext::new(None, Arc::clone(&ca), "test.k8s.local"),
            ),
        ];
        for (target, ctx) in targets {
            let kind = target.kind();
            let err = RunContext::new(target, ctx)
                .run(ambiguous_record())
                .await
                .unwrap_err();
            let message = err.to_string();
            assert!(
                message.contains("error running task dnsName/api.test.k8s.local"),
                "{kind}: {message}"
            );
            assert!(message.contains("exactly one of"), "{kind}: {message}");
        }
        // No target let the record through to the control plane
        assert!(plane.find("dnsName", "api.test.k8s.local").await.unwrap().is_none());
    }
}
