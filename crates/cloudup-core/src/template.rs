//! Template functions exposed to model fragments
//!
//! Fragments are Tera templates. Every function they can call closes over an
//! explicit [`Capabilities`] value; nothing is captured from loader state.
//! Functions are evaluated lazily, so a section behind a false `HasTag`
//! never reaches the secret or CA stores.

use crate::nodemodel::NodeModel;
use crate::tags::TagSet;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use cloudup_state::{CaStore, SecretStore};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tera::{Tera, Value};

/// Provider-specific helper such as `MachineTypeInfo`
pub type TemplateFunction =
    Arc<dyn Fn(&HashMap<String, Value>) -> tera::Result<Value> + Send + Sync>;

/// Everything a fragment may observe or trigger during expansion
pub struct Capabilities {
    tags: TagSet,
    ca: Arc<CaStore>,
    secrets: Arc<SecretStore>,
    resources: BTreeMap<String, Vec<u8>>,
    helpers: BTreeMap<String, TemplateFunction>,
    node_model: Option<NodeModel>,
    // First tag referenced outside the declared vocabulary
    undeclared: Mutex<Option<String>>,
}

impl Capabilities {
    pub fn new(tags: TagSet, ca: Arc<CaStore>, secrets: Arc<SecretStore>) -> Self {
        Self {
            tags,
            ca,
            secrets,
            resources: BTreeMap::new(),
            helpers: BTreeMap::new(),
            node_model: None,
            undeclared: Mutex::new(None),
        }
    }

    /// Add a named byte resource (e.g. `ssh-public-key`)
    pub fn with_resource(mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.resources.insert(name.into(), data.into());
        self
    }

    /// Add a provider helper function
    pub fn with_helper(mut self, name: impl Into<String>, helper: TemplateFunction) -> Self {
        self.helpers.insert(name.into(), helper);
        self
    }

    /// Offer the node model to fragments through `NodeConfig`
    pub fn with_node_model(mut self, model: NodeModel) -> Self {
        self.node_model = Some(model);
        self
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    pub fn resource(&self, name: &str) -> Option<&[u8]> {
        self.resources.get(name).map(Vec::as_slice)
    }

    /// Evaluate a tag predicate, remembering undeclared tags
    pub fn has_tag(&self, tag: &str) -> Option<bool> {
        let found = self.tags.has(tag);
        if found.is_none()
            && let Ok(mut undeclared) = self.undeclared.lock()
        {
            undeclared.get_or_insert_with(|| tag.to_string());
        }
        found
    }

    /// Take the undeclared tag recorded during the last expansion
    pub fn take_undeclared(&self) -> Option<String> {
        self.undeclared.lock().ok().and_then(|mut u| u.take())
    }

    /// Register every function and filter on `tera`
    pub fn register(self: &Arc<Self>, tera: &mut Tera) {
        let caps = Arc::clone(self);
        tera.register_function("HasTag", move |args: &HashMap<String, Value>| {
            let tag = string_arg(args, "tag", "HasTag")?;
            match caps.has_tag(&tag) {
                Some(found) => Ok(Value::Bool(found)),
                None => Err(tera::Error::msg(format!("undeclared tag {tag:?}"))),
            }
        });

        let caps = Arc::clone(self);
        tera.register_function("CA", move |_args: &HashMap<String, Value>| {
            caps.ca
                .ca_certificate_pem()
                .map(Value::String)
                .map_err(|e| tera::Error::msg(format!("error reading CA: {e}")))
        });

        let caps = Arc::clone(self);
        tera.register_function("Secrets", move |_args: &HashMap<String, Value>| {
            let ids = caps
                .secrets
                .list_ids()
                .map_err(|e| tera::Error::msg(format!("error listing secrets: {e}")))?;
            Ok(Value::Array(ids.into_iter().map(Value::String).collect()))
        });

        let caps = Arc::clone(self);
        tera.register_function("Secret", move |args: &HashMap<String, Value>| {
            let id = string_arg(args, "id", "Secret")?;
            caps.secrets
                .secret(&id)
                .map(|s| Value::String(s.as_string()))
                .map_err(|e| tera::Error::msg(format!("error reading secret {id:?}: {e}")))
        });

        let caps = Arc::clone(self);
        tera.register_function("GetOrCreateSecret", move |args: &HashMap<String, Value>| {
            let id = string_arg(args, "id", "GetOrCreateSecret")?;
            caps.secrets
                .get_or_create_secret(&id)
                .map(|(s, _)| Value::String(s.as_string()))
                .map_err(|e| tera::Error::msg(format!("error creating secret {id:?}: {e}")))
        });

        let caps = Arc::clone(self);
        tera.register_function("Resource", move |args: &HashMap<String, Value>| {
            let name = string_arg(args, "name", "Resource")?;
            let data = caps
                .resource(&name)
                .ok_or_else(|| tera::Error::msg(format!("resource {name:?} not found")))?;
            String::from_utf8(data.to_vec())
                .map(Value::String)
                .map_err(|_| tera::Error::msg(format!("resource {name:?} is not valid UTF-8")))
        });

        let caps = Arc::clone(self);
        tera.register_function("NodeConfig", move |args: &HashMap<String, Value>| {
            let role = string_arg(args, "role", "NodeConfig")?;
            let model = caps
                .node_model
                .as_ref()
                .ok_or_else(|| tera::Error::msg("NodeConfig: no node model was loaded"))?;
            model
                .render(&role)
                .map(Value::String)
                .map_err(|e| tera::Error::msg(format!("NodeConfig: {e}")))
        });

        for (name, helper) in &self.helpers {
            let helper = Arc::clone(helper);
            tera.register_function(name, move |args: &HashMap<String, Value>| helper(args));
        }

        tera.register_filter("b64encode", b64encode);
    }
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("tags", &self.tags)
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .field("helpers", &self.helpers.keys().collect::<Vec<_>>())
            .field("node_files", &self.node_model.as_ref().map(NodeModel::len))
            .finish()
    }
}

fn string_arg(args: &HashMap<String, Value>, key: &str, function: &str) -> tera::Result<String> {
    match args.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(tera::Error::msg(format!(
            "{function}: argument `{key}` must be a string, got {other}"
        ))),
        None => Err(tera::Error::msg(format!(
            "{function}: missing argument `{key}`"
        ))),
    }
}

fn b64encode(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    match value {
        Value::String(s) => Ok(Value::String(STANDARD.encode(s.as_bytes()))),
        other => Err(tera::Error::msg(format!(
            "b64encode expects a string, got {other}"
        ))),
    }
}

/// Flatten a Tera error and its sources into one line
pub(crate) fn describe_tera_error(e: &tera::Error) -> String {
    use std::error::Error;

    let mut details = vec![e.to_string()];
    let mut source = e.source();
    while let Some(err) = source {
        details.push(err.to_string());
        source = err.source();
    }
    details.join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudup_state::FsVfs;
    use tempfile::tempdir;
    use tera::Context;

    fn capabilities(root: &std::path::Path) -> Arc<Capabilities> {
        let vfs = Arc::new(FsVfs::new(root));
        Arc::new(
            Capabilities::new(
                TagSet::from_tags(["_aws", "_master_asg"]),
                Arc::new(CaStore::new(vfs.clone())),
                Arc::new(SecretStore::new(vfs)),
            )
            .with_resource("ssh-public-key", "ssh-rsa AAAA test@example"),
        )
    }

    fn render(caps: &Arc<Capabilities>, template: &str) -> tera::Result<String> {
        let mut tera = Tera::default();
        caps.register(&mut tera);
        tera.render_str(template, &Context::new())
    }

    #[test]
    fn test_has_tag() {
        let dir = tempdir().unwrap();
        let caps = capabilities(dir.path());
        let out = render(
            &caps,
            r#"{% if HasTag(tag="_aws") %}aws{% endif %}{% if HasTag(tag="_gce") %}gce{% endif %}"#,
        )
        .unwrap();
        assert_eq!(out, "aws");
    }

    #[test]
    fn test_undeclared_tag_recorded() {
        let dir = tempdir().unwrap();
        let caps = capabilities(dir.path());
        assert!(render(&caps, r#"{% if HasTag(tag="_azure") %}x{% endif %}"#).is_err());
        assert_eq!(caps.take_undeclared().as_deref(), Some("_azure"));
        assert_eq!(caps.take_undeclared(), None);
    }

    #[test]
    fn test_false_branch_creates_no_secret() {
        let dir = tempdir().unwrap();
        let caps = capabilities(dir.path());
        let out = render(
            &caps,
            r#"{% if HasTag(tag="_gce") %}{{ GetOrCreateSecret(id="kube") }}{% endif %}"#,
        )
        .unwrap();
        assert_eq!(out, "");
        assert_eq!(caps.secrets.generated_count(), 0);
    }

    #[test]
    fn test_secret_functions() {
        let dir = tempdir().unwrap();
        let caps = capabilities(dir.path());

        let created = render(&caps, r#"{{ GetOrCreateSecret(id="kube") }}"#).unwrap();
        let again = render(&caps, r#"{{ Secret(id="kube") }}"#).unwrap();
        assert_eq!(created, again);

        let ids = render(&caps, r#"{{ Secrets() | join(sep=",") }}"#).unwrap();
        assert_eq!(ids, "kube");

        assert!(render(&caps, r#"{{ Secret(id="absent") }}"#).is_err());
    }

    #[test]
    fn test_ca_and_resource() {
        let dir = tempdir().unwrap();
        let caps = capabilities(dir.path());

        let pem = render(&caps, "{{ CA() }}").unwrap();
        assert!(pem.contains("BEGIN CERTIFICATE"));

        let key = render(&caps, r#"{{ Resource(name="ssh-public-key") | b64encode }}"#).unwrap();
        assert_eq!(key, STANDARD.encode("ssh-rsa AAAA test@example"));

        assert!(render(&caps, r#"{{ Resource(name="missing") }}"#).is_err());
    }

    #[test]
    fn test_helper_function() {
        let dir = tempdir().unwrap();
        let helper: TemplateFunction = Arc::new(|args| {
            Ok(Value::String(format!(
                "info:{}",
                args.get("type").and_then(Value::as_str).unwrap_or_default()
            )))
        });
        let caps = Arc::new(
            Capabilities::new(
                TagSet::default(),
                Arc::new(CaStore::new(Arc::new(FsVfs::new(dir.path())))),
                Arc::new(SecretStore::new(Arc::new(FsVfs::new(dir.path())))),
            )
            .with_helper("MachineTypeInfo", helper),
        );
        assert_eq!(
            render(&caps, r#"{{ MachineTypeInfo(type="m3.medium") }}"#).unwrap(),
            "info:m3.medium"
        );
    }

    #[test]
    fn test_node_config() {
        let dir = tempdir().unwrap();
        let model_dir = dir.path().join("nodeup");
        std::fs::create_dir_all(model_dir.join("_kubernetes_master")).unwrap();
        std::fs::write(model_dir.join("kubelet.yaml"), "kubelet: {}\n").unwrap();
        std::fs::write(model_dir.join("_kubernetes_master/etcd.yaml"), "etcd: {}\n").unwrap();
        let model = NodeModel::load(&model_dir, &Default::default()).unwrap();

        let without = capabilities(dir.path());
        assert!(render(&without, r#"{{ NodeConfig(role="node") }}"#).is_err());

        let vfs = Arc::new(FsVfs::new(dir.path()));
        let caps = Arc::new(
            Capabilities::new(
                TagSet::default(),
                Arc::new(CaStore::new(vfs.clone())),
                Arc::new(SecretStore::new(vfs)),
            )
            .with_node_model(model),
        );
        let node = render(&caps, r#"{{ NodeConfig(role="node") }}"#).unwrap();
        assert!(node.contains("kubelet.yaml"));
        assert!(!node.contains("etcd.yaml"));
        let master = render(&caps, r#"{{ NodeConfig(role="master") }}"#).unwrap();
        assert!(master.contains("_kubernetes_master/etcd.yaml"));
        assert!(render(&caps, r#"{{ NodeConfig(role="bastion") }}"#).is_err());
    }
}
