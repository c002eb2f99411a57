//! IAM roles, policies and instance profiles

use super::dep;
use cloudup_core::{ResourceTask, TaskContext, TaskError, TaskKey, TerraformOutput, tf_ref};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IamRole {
    pub name: String,
    /// Assume-role policy (JSON)
    pub role_policy_document: String,
}

impl ResourceTask for IamRole {
    const KIND: &'static str = "iamRole";

    fn name(&self) -> &str {
        &self.name
    }

    fn render_terraform(
        &self,
        _ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        let policy = out.add_file(
            "aws_iam_role",
            &self.name,
            "policy",
            self.role_policy_document.clone(),
        );
        out.add_resource(
            "aws_iam_role",
            &self.name,
            json!({
                "name": self.name,
                "assume_role_policy": policy,
            }),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IamRolePolicy {
    pub name: String,
    pub role: String,
    pub policy_document: String,
}

impl ResourceTask for IamRolePolicy {
    const KIND: &'static str = "iamRolePolicy";

    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<TaskKey> {
        vec![dep(IamRole::KIND, &self.role)]
    }

    fn render_terraform(
        &self,
        _ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        let policy = out.add_file(
            "aws_iam_role_policy",
            &self.name,
            "policy",
            self.policy_document.clone(),
        );
        out.add_resource(
            "aws_iam_role_policy",
            &self.name,
            json!({
                "name": self.name,
                "role": tf_ref("aws_iam_role", &self.role, "name"),
                "policy": policy,
            }),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IamInstanceProfile {
    pub name: String,
}

impl ResourceTask for IamInstanceProfile {
    const KIND: &'static str = "iamInstanceProfile";

    fn name(&self) -> &str {
        &self.name
    }

    fn render_terraform(
        &self,
        _ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        out.add_resource(
            "aws_iam_instance_profile",
            &self.name,
            json!({ "name": self.name }),
        )
    }
}

/// Puts a role into an instance profile
///
/// Terraform models this as the profile's `role` attribute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IamInstanceProfileRole {
    pub name: String,
    pub instance_profile: String,
    pub role: String,
}

impl ResourceTask for IamInstanceProfileRole {
    const KIND: &'static str = "iamInstanceProfileRole";

    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<TaskKey> {
        vec![
            dep(IamInstanceProfile::KIND, &self.instance_profile),
            dep(IamRole::KIND, &self.role),
        ]
    }

    fn render_terraform(
        &self,
        _ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        out.extend_resource(
            "aws_iam_instance_profile",
            &self.instance_profile,
            "role",
            tf_ref("aws_iam_role", &self.role, "name"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudup_core::Task;
    use cloudup_state::{CaStore, FsVfs};
    use std::sync::Arc;

    #[test]
    fn test_profile_role_extends_profile() {
        let dir = tempfile::tempdir().unwrap();
        let ca = Arc::new(CaStore::new(Arc::new(FsVfs::new(dir.path()))));
        let ctx = TaskContext::new(None, ca, "test.k8s.local");
        let mut out = TerraformOutput::new();

        let role = IamRole {
            name: "masters.test.k8s.local".into(),
            role_policy_document: "{}".into(),
        };
        let profile = IamInstanceProfile {
            name: "masters.test.k8s.local".into(),
        };
        let link = IamInstanceProfileRole {
            name: "masters.test.k8s.local".into(),
            instance_profile: "masters.test.k8s.local".into(),
            role: "masters.test.k8s.local".into(),
        };
        let tasks: [&dyn Task; 3] = [&role, &profile, &link];
        for task in tasks {
            task.render_terraform(&ctx, &mut out).unwrap();
        }

        let block = out
            .resource("aws_iam_instance_profile", "masters.test.k8s.local")
            .unwrap();
        assert_eq!(block["role"], "${aws_iam_role.masters-test-k8s-local.name}");
        assert_eq!(
            out.resource("aws_iam_role", "masters.test.k8s.local").unwrap()["assume_role_policy"],
            "${file(\"${path.module}/data/aws_iam_role_masters-test-k8s-local_policy\")}"
        );
    }
}
