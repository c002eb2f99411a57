//! Node configuration model
//!
//! A separate tree of templates describing what runs on each instance. Every
//! file is expanded once with the cluster configuration; the `_tag`
//! directories on its path name the nodeup tags it needs. Cloud fragments
//! pull the files for a role with `NodeConfig(role=...)`, usually into
//! instance user data.

use crate::config::ClusterConfig;
use crate::error::LoadError;
use crate::loader::sorted_entries;
use crate::template::describe_tera_error;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tera::{Context, Tera};
use tracing::{debug, info};

/// Tag carried by master instances
pub const MASTER_ROLE_TAG: &str = "_kubernetes_master";
/// Tag carried by pool (node) instances
pub const NODE_ROLE_TAG: &str = "_kubernetes_pool";

#[derive(Debug, Clone, PartialEq, Eq)]
struct NodeFile {
    path: String,
    tags: BTreeSet<String>,
    content: String,
}

/// Expanded node model, filtered per role on demand
#[derive(Debug, Clone, Default)]
pub struct NodeModel {
    files: Vec<NodeFile>,
    node_tags: BTreeSet<String>,
}

impl NodeModel {
    /// Expand every file below `dir` against `config`
    #[tracing::instrument(skip(config), fields(dir = %dir.display()))]
    pub fn load(dir: &Path, config: &ClusterConfig) -> Result<Self, LoadError> {
        let context = Context::from_serialize(config)
            .map_err(|e| LoadError::Context(describe_tera_error(&e)))?;
        let mut files = Vec::new();
        collect(dir, "", &BTreeSet::new(), &context, &mut files)?;
        info!(files = files.len(), "Loaded node model");
        Ok(Self {
            files,
            node_tags: config.node_up_tags.iter().cloned().collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Files an instance of `role` ("master" or "node") receives
    pub fn files_for(&self, role: &str) -> Result<BTreeMap<&str, &str>, String> {
        let role_tag = match role {
            "master" => MASTER_ROLE_TAG,
            "node" => NODE_ROLE_TAG,
            other => return Err(format!("unknown node role {other:?} (master, node)")),
        };
        Ok(self
            .files
            .iter()
            .filter(|file| {
                file.tags
                    .iter()
                    .all(|tag| tag == role_tag || self.node_tags.contains(tag))
            })
            .map(|file| (file.path.as_str(), file.content.as_str()))
            .collect())
    }

    /// The files for `role` as one YAML document keyed by path
    pub fn render(&self, role: &str) -> Result<String, String> {
        let files = self.files_for(role)?;
        serde_yaml::to_string(&files).map_err(|e| e.to_string())
    }
}

fn collect(
    dir: &Path,
    prefix: &str,
    tags: &BTreeSet<String>,
    context: &Context,
    files: &mut Vec<NodeFile>,
) -> Result<(), LoadError> {
    for entry in sorted_entries(dir)? {
        let Some(file_name) = entry.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if file_name.starts_with('.') {
            continue;
        }
        let path = format!("{prefix}{file_name}");

        if entry.is_dir() {
            let mut nested = tags.clone();
            if file_name.starts_with('_') {
                nested.insert(file_name.to_string());
            }
            collect(&entry, &format!("{path}/"), &nested, context, files)?;
            continue;
        }

        let source = std::fs::read_to_string(&entry).map_err(|e| LoadError::Io {
            path: entry.clone(),
            source: e,
        })?;
        let content = Tera::one_off(&source, context, false).map_err(|e| LoadError::Template {
            path: entry.clone(),
            message: describe_tera_error(&e),
        })?;
        debug!(file = %path, tags = ?tags, "Expanded node file");
        files.push(NodeFile {
            path,
            tags: tags.clone(),
            content,
        });
    }
    Ok(())
}
