//! Tasks and the task map
//!
//! A task is one desired cloud resource, identified by `(kind, name)`.
//! Resource kinds implement [`ResourceTask`]; the engine only sees the
//! object-safe [`Task`] surface, which every `ResourceTask` gets for free.

use crate::error::{LoadError, TaskError};
use crate::target::terraform::TerraformOutput;
use async_trait::async_trait;
use cloudup_cloud::{Attributes, Change, ChangeType, CloudApi, to_attributes};
use cloudup_state::CaStore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Task identity, rendered `kind/name`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TaskKey {
    pub kind: String,
    pub name: String,
}

impl TaskKey {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Parse `kind/name`; the name may itself contain `/`
    pub fn parse(key: &str) -> Option<Self> {
        let (kind, name) = key.split_once('/')?;
        let (kind, name) = (kind.trim(), name.trim());
        if kind.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::new(kind, name))
    }
}

impl std::fmt::Display for TaskKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Collaborators available to a task while it runs
#[derive(Clone)]
pub struct TaskContext {
    cloud: Option<Arc<dyn CloudApi>>,
    ca: Arc<CaStore>,
    cluster_name: String,
}

impl TaskContext {
    pub fn new(
        cloud: Option<Arc<dyn CloudApi>>,
        ca: Arc<CaStore>,
        cluster_name: impl Into<String>,
    ) -> Self {
        Self {
            cloud,
            ca,
            cluster_name: cluster_name.into(),
        }
    }

    /// The provider control plane (absent for configuration-only targets)
    pub fn cloud(&self) -> Result<&dyn CloudApi, TaskError> {
        self.cloud.as_deref().ok_or(TaskError::NoCloud)
    }

    pub fn ca(&self) -> &CaStore {
        &self.ca
    }

    /// Owned handle on the CA, for work moved onto the blocking pool
    pub fn shared_ca(&self) -> Arc<CaStore> {
        Arc::clone(&self.ca)
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }
}

impl Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("cloud", &self.cloud.as_ref().map(|c| c.provider().to_string()))
            .field("cluster_name", &self.cluster_name)
            .finish()
    }
}

/// A typed resource kind decoded from model fragments
///
/// The body is decoded with the instance name injected as `name`. The
/// default `find`/`apply` go through the cloud control plane keyed by
/// `KIND` and `name`; kinds with different live state override them.
#[async_trait]
pub trait ResourceTask: Serialize + DeserializeOwned + Debug + Send + Sync + 'static {
    /// Registered type name (e.g. "vpc")
    const KIND: &'static str;

    fn name(&self) -> &str;

    /// Tasks that must complete before this one starts
    fn dependencies(&self) -> Vec<TaskKey> {
        Vec::new()
    }

    /// Desired attributes (identity excluded)
    fn desired(&self) -> Result<Attributes, TaskError> {
        let mut attributes = to_attributes(Self::KIND, self)?;
        attributes.remove("name");
        Ok(attributes)
    }

    async fn find(&self, ctx: &TaskContext) -> Result<Option<Attributes>, TaskError> {
        let live = ctx.cloud()?.find(Self::KIND, self.name()).await?;
        Ok(live.map(|resource| resource.attributes))
    }

    async fn apply(&self, ctx: &TaskContext, change: &Change) -> Result<(), TaskError> {
        let cloud = ctx.cloud()?;
        match change.change_type {
            ChangeType::Create => {
                cloud.create(Self::KIND, self.name(), &change.desired).await?;
            }
            ChangeType::Update => {
                cloud.update(Self::KIND, self.name(), &change.desired).await?;
            }
            ChangeType::NoOp => {}
        }
        Ok(())
    }

    /// Side effects that configuration cannot express, run before
    /// [`render_terraform`](Self::render_terraform) without holding the output
    async fn prepare_terraform(&self, _ctx: &TaskContext) -> Result<(), TaskError> {
        Ok(())
    }

    fn render_terraform(
        &self,
        ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError>;
}

/// Object-safe task surface used by the executor and targets
#[async_trait]
pub trait Task: Debug + Send + Sync {
    fn key(&self) -> TaskKey;

    fn dependencies(&self) -> Vec<TaskKey>;

    fn desired(&self) -> Result<Attributes, TaskError>;

    /// Live attributes, `None` when the resource does not exist
    async fn find(&self, ctx: &TaskContext) -> Result<Option<Attributes>, TaskError>;

    async fn apply(&self, ctx: &TaskContext, change: &Change) -> Result<(), TaskError>;

    async fn prepare_terraform(&self, ctx: &TaskContext) -> Result<(), TaskError>;

    fn render_terraform(
        &self,
        ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError>;
}

#[async_trait]
impl<T: ResourceTask> Task for T {
    fn key(&self) -> TaskKey {
        TaskKey::new(T::KIND, ResourceTask::name(self))
    }

    fn dependencies(&self) -> Vec<TaskKey> {
        ResourceTask::dependencies(self)
    }

    fn desired(&self) -> Result<Attributes, TaskError> {
        ResourceTask::desired(self)
    }

    async fn find(&self, ctx: &TaskContext) -> Result<Option<Attributes>, TaskError> {
        ResourceTask::find(self, ctx).await
    }

    async fn apply(&self, ctx: &TaskContext, change: &Change) -> Result<(), TaskError> {
        ResourceTask::apply(self, ctx, change).await
    }

    async fn prepare_terraform(&self, ctx: &TaskContext) -> Result<(), TaskError> {
        ResourceTask::prepare_terraform(self, ctx).await
    }

    fn render_terraform(
        &self,
        ctx: &TaskContext,
        out: &mut TerraformOutput,
    ) -> Result<(), TaskError> {
        ResourceTask::render_terraform(self, ctx, out)
    }
}

#[derive(Debug, Clone)]
struct TaskEntry {
    task: Arc<dyn Task>,
    source: PathBuf,
}

/// Uniquely keyed tasks in insertion order
///
/// Read-only once the loader hands it over.
#[derive(Debug, Clone, Default)]
pub struct TaskMap {
    order: Vec<TaskKey>,
    entries: HashMap<TaskKey, TaskEntry>,
}

impl TaskMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task defined in `source`; a second definition of a key is an error
    pub fn insert(
        &mut self,
        task: Arc<dyn Task>,
        source: impl AsRef<Path>,
    ) -> Result<(), LoadError> {
        let key = task.key();
        if let Some(existing) = self.entries.get(&key) {
            return Err(LoadError::DuplicateKey {
                key,
                first: existing.source.clone(),
                second: source.as_ref().to_path_buf(),
            });
        }
        self.order.push(key.clone());
        self.entries.insert(
            key,
            TaskEntry {
                task,
                source: source.as_ref().to_path_buf(),
            },
        );
        Ok(())
    }

    pub fn get(&self, key: &TaskKey) -> Option<&Arc<dyn Task>> {
        self.entries.get(key).map(|e| &e.task)
    }

    /// Fragment the task was defined in
    pub fn source(&self, key: &TaskKey) -> Option<&Path> {
        self.entries.get(key).map(|e| e.source.as_path())
    }

    pub fn contains(&self, key: &TaskKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &TaskKey> {
        self.order.iter()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TaskKey, &Arc<dyn Task>)> {
        self.order
            .iter()
            .filter_map(|key| self.entries.get(key).map(|e| (key, &e.task)))
    }
}
