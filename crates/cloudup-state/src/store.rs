//! Versioned state store holding the CA and secret collections

use crate::ca::CaStore;
use crate::error::{Result, StateError};
use crate::secrets::SecretStore;
use crate::vfs::{FsVfs, Vfs};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

const STATE_VERSION: u32 = 1;
const META_FILE: &str = "meta.json";

#[derive(Debug, Serialize, Deserialize)]
struct StateMeta {
    version: u32,
}

/// Entry point to persisted cluster state
///
/// The store outlives a single run: the same CA and secrets are returned by
/// every run against the same location.
#[derive(Debug, Clone)]
pub struct StateStore {
    vfs: Arc<dyn Vfs>,
    ca: Arc<CaStore>,
    secrets: Arc<SecretStore>,
}

impl StateStore {
    /// Open (and initialise when empty) a store on any [`Vfs`]
    pub fn open(vfs: Arc<dyn Vfs>) -> Result<Self> {
        match vfs.read(META_FILE)? {
            Some(raw) => {
                let meta: StateMeta =
                    serde_json::from_slice(&raw).map_err(|e| StateError::json(META_FILE, e))?;
                if meta.version > STATE_VERSION {
                    return Err(StateError::UnsupportedVersion {
                        found: meta.version,
                        supported: STATE_VERSION,
                    });
                }
                tracing::debug!(
                    version = meta.version,
                    location = %vfs.location(),
                    "Opened state store"
                );
            }
            None => {
                let meta = StateMeta {
                    version: STATE_VERSION,
                };
                let raw =
                    serde_json::to_vec_pretty(&meta).map_err(|e| StateError::json(META_FILE, e))?;
                vfs.write(META_FILE, &raw)?;
                tracing::info!(location = %vfs.location(), "Initialised state store");
            }
        }

        Ok(Self {
            ca: Arc::new(CaStore::new(Arc::clone(&vfs))),
            secrets: Arc::new(SecretStore::new(Arc::clone(&vfs))),
            vfs,
        })
    }

    /// Open a store on the local filesystem
    pub fn open_local(root: impl AsRef<Path>) -> Result<Self> {
        Self::open(Arc::new(FsVfs::new(root)))
    }

    pub fn ca(&self) -> Arc<CaStore> {
        Arc::clone(&self.ca)
    }

    pub fn secrets(&self) -> Arc<SecretStore> {
        Arc::clone(&self.secrets)
    }

    pub fn location(&self) -> String {
        self.vfs.location()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_initialises_meta() {
        let dir = tempdir().unwrap();
        StateStore::open_local(dir.path()).unwrap();
        assert!(dir.path().join(META_FILE).exists());

        // Second open reads the existing meta
        StateStore::open_local(dir.path()).unwrap();
    }

    #[test]
    fn test_newer_version_rejected() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(META_FILE), r#"{"version": 99}"#).unwrap();

        let err = StateStore::open_local(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            StateError::UnsupportedVersion {
                found: 99,
                supported: STATE_VERSION
            }
        ));
    }

    #[test]
    fn test_stores_share_location() {
        let dir = tempdir().unwrap();
        let store = StateStore::open_local(dir.path()).unwrap();
        store.secrets().get_or_create_secret("kube").unwrap();
        store.ca().ca_certificate_pem().unwrap();

        assert!(dir.path().join("secrets/kube").exists());
        assert!(dir.path().join("pki/issued/ca.crt").exists());
        assert!(dir.path().join("pki/private/ca.key").exists());
    }
}
