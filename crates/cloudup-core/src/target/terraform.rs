//! Terraform target: render tasks into `kubernetes.tf.json`
//!
//! Every task appends blocks to an in-memory document keyed by
//! `<type>.<name>`; nothing is written until the run finished. Maps are
//! ordered, so the same task map always produces byte-identical output.

use super::ChangeLog;
use crate::error::{Error, Result, TaskError};
use crate::task::{Task, TaskContext, TaskMap};
use cloudup_cloud::{Change, Plan};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const TERRAFORM_FILE: &str = "kubernetes.tf.json";
pub const DATA_DIR: &str = "data";

/// Terraform-safe resource name (`us-east-1a.k8s.local` → `us-east-1a-k8s-local`)
pub fn tf_name(name: &str) -> String {
    name.replace('.', "-")
}

/// Interpolation of an attribute of another resource
pub fn tf_ref(tf_type: &str, name: &str, attribute: &str) -> Value {
    Value::String(format!("${{{tf_type}.{}.{attribute}}}", tf_name(name)))
}

/// Provider block written at the top of the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerraformProvider {
    pub name: String,
    pub settings: BTreeMap<String, String>,
}

impl TerraformProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: BTreeMap::new(),
        }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }
}

/// The document being generated
#[derive(Debug, Clone, Default)]
pub struct TerraformOutput {
    // tf type → tf name → block
    resources: BTreeMap<String, BTreeMap<String, Value>>,
    // file name under data/ → content
    files: BTreeMap<String, String>,
}

impl TerraformOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource block; each address may only be rendered once
    pub fn add_resource(
        &mut self,
        tf_type: &str,
        name: &str,
        body: Value,
    ) -> std::result::Result<(), TaskError> {
        let tf_name = tf_name(name);
        let blocks = self.resources.entry(tf_type.to_string()).or_default();
        if blocks.contains_key(&tf_name) {
            return Err(TaskError::DuplicateTerraformResource(format!(
                "{tf_type}.{tf_name}"
            )));
        }
        blocks.insert(tf_name, body);
        Ok(())
    }

    /// Set `field` on a block rendered earlier by another task
    pub fn extend_resource(
        &mut self,
        tf_type: &str,
        name: &str,
        field: &str,
        value: Value,
    ) -> std::result::Result<(), TaskError> {
        let tf_name = tf_name(name);
        match self
            .resources
            .get_mut(tf_type)
            .and_then(|blocks| blocks.get_mut(&tf_name))
        {
            Some(Value::Object(block)) => {
                block.insert(field.to_string(), value);
                Ok(())
            }
            Some(_) => Err(TaskError::Invalid(format!(
                "terraform resource {tf_type}.{tf_name} is not an object"
            ))),
            None => Err(TaskError::Invalid(format!(
                "terraform resource {tf_type}.{tf_name} has not been rendered"
            ))),
        }
    }

    /// Store `content` as an auxiliary file and return the expression reading it
    pub fn add_file(&mut self, tf_type: &str, name: &str, field: &str, content: String) -> Value {
        let file_name = format!("{tf_type}_{}_{field}", tf_name(name));
        let reference = format!("${{file(\"${{path.module}}/{DATA_DIR}/{file_name}\")}}");
        self.files.insert(file_name, content);
        Value::String(reference)
    }

    /// Block at `<tf_type>.<tf_name(name)>`
    pub fn resource(&self, tf_type: &str, name: &str) -> Option<&Value> {
        self.resources.get(tf_type)?.get(&tf_name(name))
    }

    pub fn resource_count(&self) -> usize {
        self.resources.values().map(BTreeMap::len).sum()
    }

    /// Auxiliary files, sorted by name
    pub fn files(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Serialize the document with its provider block
    pub fn render(
        &self,
        provider: &TerraformProvider,
    ) -> std::result::Result<String, serde_json::Error> {
        let mut resources = Map::new();
        for (tf_type, blocks) in &self.resources {
            let blocks: Map<String, Value> = blocks
                .iter()
                .map(|(name, block)| (name.clone(), block.clone()))
                .collect();
            resources.insert(tf_type.clone(), Value::Object(blocks));
        }

        let settings: Map<String, Value> = provider
            .settings
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        let mut providers = Map::new();
        providers.insert(provider.name.clone(), Value::Object(settings));

        let doc = json!({
            "provider": providers,
            "resource": resources,
        });
        let mut text = serde_json::to_string_pretty(&doc)?;
        text.push('\n');
        Ok(text)
    }
}

/// Generates Terraform configuration instead of calling the provider
#[derive(Debug)]
pub struct TerraformTarget {
    output_dir: PathBuf,
    provider: TerraformProvider,
    output: Mutex<TerraformOutput>,
    rendered: ChangeLog,
}

impl TerraformTarget {
    pub fn new(output_dir: impl AsRef<Path>, provider: TerraformProvider) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            provider,
            output: Mutex::new(TerraformOutput::new()),
            rendered: ChangeLog::default(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub(crate) async fn render(
        &self,
        task: &dyn Task,
        change: Change,
        ctx: &TaskContext,
    ) -> std::result::Result<(), TaskError> {
        task.prepare_terraform(ctx).await?;
        {
            let mut output = self
                .output
                .lock()
                .map_err(|_| TaskError::Invalid("terraform output lock poisoned".into()))?;
            task.render_terraform(ctx, &mut output)?;
        }
        self.rendered.record(change);
        Ok(())
    }

    /// Write the document and auxiliary files
    pub(crate) async fn finish(&self, tasks: &TaskMap) -> Result<Plan> {
        let (document, files) = {
            let output = match self.output.lock() {
                Ok(output) => output,
                Err(poisoned) => poisoned.into_inner(),
            };
            let document = output.render(&self.provider).map_err(|e| Error::Output {
                path: self.output_dir.join(TERRAFORM_FILE),
                source: std::io::Error::other(e),
            })?;
            let files: Vec<(String, String)> = output
                .files()
                .map(|(name, content)| (name.to_string(), content.to_string()))
                .collect();
            (document, files)
        };

        let data_dir = self.output_dir.join(DATA_DIR);
        // Files from an earlier run may belong to resources that no longer exist
        if tokio::fs::try_exists(&data_dir).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(&data_dir)
                .await
                .map_err(|e| output_error(&data_dir, e))?;
        }
        tokio::fs::create_dir_all(&data_dir)
            .await
            .map_err(|e| output_error(&data_dir, e))?;

        for (name, content) in &files {
            let path = data_dir.join(name);
            tokio::fs::write(&path, content)
                .await
                .map_err(|e| output_error(&path, e))?;
        }

        let path = self.output_dir.join(TERRAFORM_FILE);
        tokio::fs::write(&path, document)
            .await
            .map_err(|e| output_error(&path, e))?;

        tracing::info!(
            path = %path.display(),
            tasks = tasks.len(),
            files = files.len(),
            "Wrote terraform configuration"
        );
        Ok(self.rendered.plan())
    }
}

fn output_error(path: &Path, source: std::io::Error) -> Error {
    Error::Output {
        path: path.to_path_buf(),
        source,
    }
}
