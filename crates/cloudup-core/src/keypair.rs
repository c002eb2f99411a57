//! Certificates issued by the cluster CA
//!
//! A `keypair` task has no cloud counterpart: its live state is whatever the
//! CA store holds under the task name.

use crate::error::TaskError;
use crate::target::terraform::TerraformOutput;
use crate::task::{ResourceTask, TaskContext};
use async_trait::async_trait;
use cloudup_cloud::{Attributes, Change, ChangeType};
use cloudup_state::IssuedCertificate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Keypair {
    pub name: String,
    pub subject: String,
    #[serde(default)]
    pub alternate_names: Vec<String>,
}

fn attributes_of(cert: &IssuedCertificate) -> Attributes {
    let mut attributes = Attributes::new();
    attributes.insert("subject".into(), Value::String(cert.subject.clone()));
    attributes.insert(
        "alternateNames".into(),
        Value::Array(
            cert.alternate_names
                .iter()
                .cloned()
                .map(Value::String)
                .collect(),
        ),
    );
    attributes
}

impl Keypair {
    /// Key generation and store writes run on the blocking pool
    async fn issue_blocking(
        &self,
        ctx: &TaskContext,
        keep_existing: bool,
    ) -> Result<(), TaskError> {
        let ca = ctx.shared_ca();
        let (name, subject, alternate_names) = (
            self.name.clone(),
            self.subject.clone(),
            self.alternate_names.clone(),
        );
        tokio::task::spawn_blocking(move || {
            if keep_existing {
                ca.get_or_issue(&name, &subject, &alternate_names)
            } else {
                ca.issue(&name, &subject, &alternate_names)
            }
        })
        .await
        .map_err(|e| TaskError::Panicked(e.to_string()))??;
        Ok(())
    }
}

#[async_trait]
impl ResourceTask for Keypair {
    const KIND: &'static str = "keypair";

    fn name(&self) -> &str {
        &self.name
    }

    async fn find(&self, ctx: &TaskContext) -> Result<Option<Attributes>, TaskError> {
        let cert = ctx.ca().find_cert(&self.name)?;
        Ok(cert.as_ref().map(attributes_of))
    }

    async fn apply(&self, ctx: &TaskContext, change: &Change) -> Result<(), TaskError> {
        if change.change_type != ChangeType::NoOp {
            self.issue_blocking(ctx, false).await?;
        }
        Ok(())
    }

    // Terraform cannot hold the CA; certificates are issued into the store
    // so the generated configuration can reference them.
    async fn prepare_terraform(&self, ctx: &TaskContext) -> Result<(), TaskError> {
        self.issue_blocking(ctx, true).await
    }

    fn render_terraform(
        &self,
        _ctx: &TaskContext,
        _out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;
    use cloudup_cloud::compute_change;
    use cloudup_state::{CaStore, FsVfs};
    use std::sync::Arc;

    fn context(dir: &std::path::Path) -> TaskContext {
        let ca = Arc::new(CaStore::new(Arc::new(FsVfs::new(dir))));
        TaskContext::new(None, ca, "test.k8s.local")
    }

    fn master() -> Keypair {
        Keypair {
            name: "master".into(),
            subject: "cn=kubernetes-master".into(),
            alternate_names: vec!["api.test.k8s.local".into(), "kubernetes".into()],
        }
    }

    #[tokio::test]
    async fn test_issue_then_converged() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let task = master();

        assert!(Task::find(&task, &ctx).await.unwrap().is_none());
        let desired = Task::desired(&task).unwrap();
        let change = compute_change("keypair", "master", &desired, None);
        assert_eq!(change.change_type, ChangeType::Create);
        Task::apply(&task, &ctx, &change).await.unwrap();

        let live = Task::find(&task, &ctx).await.unwrap();
        let change = compute_change("keypair", "master", &desired, live.as_ref());
        assert_eq!(change.change_type, ChangeType::NoOp);
    }

    #[tokio::test]
    async fn test_changed_names_need_update() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        ctx.ca()
            .issue("master", "cn=kubernetes-master", &["old.example".to_string()])
            .unwrap();

        let task = master();
        let live = Task::find(&task, &ctx).await.unwrap();
        let desired = Task::desired(&task).unwrap();
        let change = compute_change("keypair", "master", &desired, live.as_ref());
        assert_eq!(change.change_type, ChangeType::Update);
        assert_eq!(change.fields[0].field, "alternateNames");
    }

    #[tokio::test]
    async fn test_terraform_issues_without_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let mut out = TerraformOutput::new();
        Task::prepare_terraform(&master(), &ctx).await.unwrap();
        Task::render_terraform(&master(), &ctx, &mut out).unwrap();

        assert_eq!(out.resource_count(), 0);
        let cert = ctx.ca().find_cert("master").unwrap().unwrap();
        assert_eq!(cert.alternate_names.len(), 2);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let body = serde_yaml::from_str::<serde_yaml::Value>(
            "name: master\nsubject: cn=x\nbogus: true\n",
        )
        .unwrap();
        assert!(serde_yaml::from_value::<Keypair>(body).is_err());
    }
}
