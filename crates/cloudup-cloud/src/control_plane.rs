//! File-backed local control plane
//!
//! Keeps the provider's view of every resource in `<state>/cloud/<provider>.json`.
//! It stands in for the real provider API: Direct runs mutate it, dry runs
//! only read it, and tests seed it to simulate pre-existing infrastructure.

use crate::api::{CloudApi, LiveResource};
use crate::attributes::Attributes;
use crate::error::{CloudError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::fs;
use tokio::sync::Mutex;

const STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ControlPlaneState {
    version: u32,
    updated_at: DateTime<Utc>,
    next_id: u64,
    /// Resources indexed by kind/name
    resources: BTreeMap<String, LiveResource>,
}

impl Default for ControlPlaneState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            next_id: 1,
            resources: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: ControlPlaneState,
    // kind → rejection message
    rejections: HashMap<String, String>,
}

/// Local stand-in for a provider API
#[derive(Debug)]
pub struct LocalControlPlane {
    provider: String,
    path: Option<PathBuf>,
    inner: Mutex<Inner>,
    mutations: AtomicUsize,
}

fn resource_key(kind: &str, name: &str) -> String {
    format!("{kind}/{name}")
}

impl LocalControlPlane {
    /// Control plane that is never persisted
    pub fn in_memory(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            path: None,
            inner: Mutex::new(Inner::default()),
            mutations: AtomicUsize::new(0),
        }
    }

    /// Load the control plane persisted at `path`, starting empty when absent
    pub async fn load(provider: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if fs::try_exists(&path).await? {
            let content = fs::read_to_string(&path).await?;
            let state: ControlPlaneState = serde_json::from_str(&content)?;
            if state.version > STATE_VERSION {
                return Err(CloudError::UnsupportedVersion {
                    found: state.version,
                    supported: STATE_VERSION,
                });
            }
            tracing::debug!(
                path = %path.display(),
                resources = state.resources.len(),
                "Loaded control plane state"
            );
            state
        } else {
            tracing::debug!(
                path = %path.display(),
                "Control plane state not found, starting empty"
            );
            ControlPlaneState::default()
        };

        Ok(Self {
            provider: provider.into(),
            path: Some(path),
            inner: Mutex::new(Inner {
                state,
                rejections: HashMap::new(),
            }),
            mutations: AtomicUsize::new(0),
        })
    }

    /// Persist the current state (no-op for in-memory planes)
    pub async fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let inner = self.inner.lock().await;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(&inner.state)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, path).await?;

        tracing::debug!(
            path = %path.display(),
            resources = inner.state.resources.len(),
            "Saved control plane state"
        );
        Ok(())
    }

    /// Make every create/update of `kind` fail with `message`
    pub async fn reject_kind(&self, kind: impl Into<String>, message: impl Into<String>) {
        self.inner
            .lock()
            .await
            .rejections
            .insert(kind.into(), message.into());
    }

    /// Insert a live resource directly, without counting a mutation
    pub async fn seed(&self, kind: &str, name: &str, attributes: Attributes) -> LiveResource {
        let mut inner = self.inner.lock().await;
        Self::insert(&mut inner.state, kind, name, attributes)
    }

    /// Number of create/update calls that succeeded
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Snapshot of every live resource
    pub async fn resources(&self) -> Vec<LiveResource> {
        self.inner
            .lock()
            .await
            .state
            .resources
            .values()
            .cloned()
            .collect()
    }

    fn insert(
        state: &mut ControlPlaneState,
        kind: &str,
        name: &str,
        mut attributes: Attributes,
    ) -> LiveResource {
        let now = Utc::now();
        let id = format!("{}-{:06}", kind.to_lowercase(), state.next_id);
        state.next_id += 1;
        attributes.insert("id".to_string(), Value::String(id.clone()));

        let resource = LiveResource {
            id,
            kind: kind.to_string(),
            name: name.to_string(),
            attributes,
            created_at: now,
            updated_at: now,
        };
        state.resources.insert(resource_key(kind, name), resource.clone());
        state.updated_at = now;
        resource
    }

    fn check_rejected(inner: &Inner, kind: &str, name: &str) -> Result<()> {
        match inner.rejections.get(kind) {
            Some(message) => Err(CloudError::Rejected {
                kind: kind.to_string(),
                name: name.to_string(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CloudApi for LocalControlPlane {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn find(&self, kind: &str, name: &str) -> Result<Option<LiveResource>> {
        let inner = self.inner.lock().await;
        Ok(inner.state.resources.get(&resource_key(kind, name)).cloned())
    }

    async fn create(
        &self,
        kind: &str,
        name: &str,
        attributes: &Attributes,
    ) -> Result<LiveResource> {
        let mut inner = self.inner.lock().await;
        Self::check_rejected(&inner, kind, name)?;

        let key = resource_key(kind, name);
        if inner.state.resources.contains_key(&key) {
            return Err(CloudError::ResourceAlreadyExists(key));
        }

        let resource = Self::insert(&mut inner.state, kind, name, attributes.clone());
        self.mutations.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            provider = %self.provider,
            key = %key,
            id = %resource.id,
            "Created resource"
        );
        Ok(resource)
    }

    async fn update(
        &self,
        kind: &str,
        name: &str,
        attributes: &Attributes,
    ) -> Result<LiveResource> {
        let mut inner = self.inner.lock().await;
        Self::check_rejected(&inner, kind, name)?;

        let key = resource_key(kind, name);
        let now = Utc::now();
        let resource = inner
            .state
            .resources
            .get_mut(&key)
            .ok_or_else(|| CloudError::ResourceNotFound(key.clone()))?;

        // Provider-assigned attributes survive the update
        for (field, value) in attributes {
            resource.attributes.insert(field.clone(), value.clone());
        }
        resource.updated_at = now;
        let resource = resource.clone();
        inner.state.updated_at = now;

        self.mutations.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(provider = %self.provider, key = %key, "Updated resource");
        Ok(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn attrs(cidr: &str) -> Attributes {
        let mut a = Attributes::new();
        a.insert("cidr".into(), json!(cidr));
        a
    }

    #[tokio::test]
    async fn test_create_find_update() {
        let plane = LocalControlPlane::in_memory("aws");
        assert!(plane.find("vpc", "main").await.unwrap().is_none());

        let created = plane.create("vpc", "main", &attrs("10.0.0.0/16")).await.unwrap();
        assert_eq!(created.attributes["id"], json!(created.id));

        let updated = plane.update("vpc", "main", &attrs("10.1.0.0/16")).await.unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.attributes["cidr"], json!("10.1.0.0/16"));
        assert_eq!(plane.mutation_count(), 2);
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let plane = LocalControlPlane::in_memory("aws");
        plane.create("vpc", "main", &attrs("10.0.0.0/16")).await.unwrap();
        assert!(matches!(
            plane.create("vpc", "main", &attrs("10.0.0.0/16")).await,
            Err(CloudError::ResourceAlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_update_missing_fails() {
        let plane = LocalControlPlane::in_memory("gce");
        assert!(matches!(
            plane.update("network", "default", &Attributes::new()).await,
            Err(CloudError::ResourceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejected_kind() {
        let plane = LocalControlPlane::in_memory("aws");
        plane.reject_kind("subnet", "quota exceeded").await;

        let err = plane.create("subnet", "a", &attrs("10.0.0.0/24")).await.unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
        assert_eq!(plane.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_seed_does_not_count() {
        let plane = LocalControlPlane::in_memory("aws");
        plane.seed("vpc", "main", attrs("10.0.0.0/16")).await;
        assert_eq!(plane.mutation_count(), 0);
        assert_eq!(plane.resources().await.len(), 1);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cloud/aws.json");

        let plane = LocalControlPlane::load("aws", &path).await.unwrap();
        plane.create("vpc", "main", &attrs("10.0.0.0/16")).await.unwrap();
        plane.save().await.unwrap();

        let reloaded = LocalControlPlane::load("aws", &path).await.unwrap();
        let found = reloaded.find("vpc", "main").await.unwrap().unwrap();
        assert_eq!(found.attributes["cidr"], json!("10.0.0.0/16"));

        // Ids keep increasing across reloads
        let second = reloaded.create("vpc", "other", &attrs("10.2.0.0/16")).await.unwrap();
        assert_ne!(second.id, found.id);
    }

    #[tokio::test]
    async fn test_newer_version_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aws.json");
        std::fs::write(
            &path,
            r#"{"version":9,"updated_at":"2025-01-01T00:00:00Z","next_id":1,"resources":{}}"#,
        )
        .unwrap();

        assert!(matches!(
            LocalControlPlane::load("aws", &path).await,
            Err(CloudError::UnsupportedVersion { found: 9, .. })
        ));
    }
}
