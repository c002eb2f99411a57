//! Named secret store with get-or-create semantics

use crate::error::{Result, StateError};
use crate::vfs::{Vfs, validate_id};
use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const SECRETS_DIR: &str = "secrets";
const SECRET_BYTES: usize = 32;

/// Secret material as stored
#[derive(Clone, PartialEq, Eq)]
pub struct Secret {
    data: Vec<u8>,
}

impl Secret {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Printable form handed to templates (URL-safe base64, no padding)
    pub fn as_string(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.data)
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secret")
            .field("len", &self.data.len())
            .finish()
    }
}

#[derive(Serialize, Deserialize)]
struct SecretFile {
    data: String,
}

/// Persistent id → secret mapping
#[derive(Debug)]
pub struct SecretStore {
    vfs: Arc<dyn Vfs>,
    cache: Mutex<HashMap<String, Secret>>,
    generated: AtomicUsize,
}

impl SecretStore {
    pub fn new(vfs: Arc<dyn Vfs>) -> Self {
        Self {
            vfs,
            cache: Mutex::new(HashMap::new()),
            generated: AtomicUsize::new(0),
        }
    }

    fn path(id: &str) -> String {
        format!("{SECRETS_DIR}/{id}")
    }

    fn read(&self, id: &str) -> Result<Option<Secret>> {
        let path = Self::path(id);
        let Some(raw) = self.vfs.read(&path)? else {
            return Ok(None);
        };
        let file: SecretFile =
            serde_json::from_slice(&raw).map_err(|e| StateError::json(&path, e))?;
        let data = STANDARD
            .decode(file.data.as_bytes())
            .map_err(|e| StateError::CorruptSecret {
                id: id.to_string(),
                message: e.to_string(),
            })?;
        Ok(Some(Secret::new(data)))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Secret>>> {
        self.cache
            .lock()
            .map_err(|_| StateError::LockPoisoned)
    }

    /// Look up an existing secret
    pub fn find_secret(&self, id: &str) -> Result<Option<Secret>> {
        validate_id(id)?;
        let mut cache = self.lock()?;
        if let Some(secret) = cache.get(id) {
            return Ok(Some(secret.clone()));
        }
        let found = self.read(id)?;
        if let Some(secret) = &found {
            cache.insert(id.to_string(), secret.clone());
        }
        Ok(found)
    }

    /// Existing secret or `SecretNotFound`
    pub fn secret(&self, id: &str) -> Result<Secret> {
        self.find_secret(id)?
            .ok_or_else(|| StateError::SecretNotFound(id.to_string()))
    }

    /// Return the persisted secret for `id`, generating and persisting it first
    /// when absent
    ///
    /// The store lock is held across lookup, generation and write, so
    /// concurrent callers for the same id observe a single generation. The
    /// boolean is true when this call created the secret.
    #[tracing::instrument(skip(self))]
    pub fn get_or_create_secret(&self, id: &str) -> Result<(Secret, bool)> {
        validate_id(id)?;
        let mut cache = self.lock()?;
        if let Some(secret) = cache.get(id) {
            return Ok((secret.clone(), false));
        }
        if let Some(secret) = self.read(id)? {
            cache.insert(id.to_string(), secret.clone());
            return Ok((secret, false));
        }

        let mut data = vec![0u8; SECRET_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut data);
        let secret = Secret::new(data);

        let path = Self::path(id);
        let file = SecretFile {
            data: STANDARD.encode(secret.data()),
        };
        let encoded = serde_json::to_vec_pretty(&file).map_err(|e| StateError::json(&path, e))?;
        self.vfs.write(&path, &encoded)?;

        self.generated.fetch_add(1, Ordering::SeqCst);
        cache.insert(id.to_string(), secret.clone());
        tracing::info!(id = %id, "Created secret");
        Ok((secret, true))
    }

    /// Ids of every persisted secret
    pub fn list_ids(&self) -> Result<Vec<String>> {
        self.vfs.list(SECRETS_DIR)
    }

    /// Number of secrets generated by this store instance
    pub fn generated_count(&self) -> usize {
        self.generated.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::FsVfs;
    use tempfile::tempdir;

    fn store(root: &std::path::Path) -> SecretStore {
        SecretStore::new(Arc::new(FsVfs::new(root)))
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let dir = tempdir().unwrap();
        let secrets = store(dir.path());

        let (first, created) = secrets.get_or_create_secret("token-1").unwrap();
        assert!(created);
        let (second, created) = secrets.get_or_create_secret("token-1").unwrap();
        assert!(!created);

        assert_eq!(first, second);
        assert_eq!(first.data().len(), SECRET_BYTES);
        assert_eq!(secrets.generated_count(), 1);
    }

    #[test]
    fn test_concurrent_get_or_create_generates_once() {
        let dir = tempdir().unwrap();
        let secrets = Arc::new(store(dir.path()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let secrets = Arc::clone(&secrets);
                std::thread::spawn(move || secrets.get_or_create_secret("token-1").unwrap().0)
            })
            .collect();
        let results: Vec<Secret> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(secrets.generated_count(), 1);
    }

    #[test]
    fn test_secret_survives_new_store_instance() {
        let dir = tempdir().unwrap();
        let (original, _) = store(dir.path()).get_or_create_secret("kube").unwrap();

        let reopened = store(dir.path());
        let (again, created) = reopened.get_or_create_secret("kube").unwrap();
        assert!(!created);
        assert_eq!(original, again);
        assert_eq!(reopened.generated_count(), 0);
        assert_eq!(reopened.list_ids().unwrap(), vec!["kube"]);
    }

    #[test]
    fn test_missing_secret() {
        let dir = tempdir().unwrap();
        let secrets = store(dir.path());
        assert!(secrets.find_secret("absent").unwrap().is_none());
        assert!(matches!(
            secrets.secret("absent"),
            Err(StateError::SecretNotFound(_))
        ));
    }

    #[test]
    fn test_invalid_id_rejected() {
        let dir = tempdir().unwrap();
        let secrets = store(dir.path());
        assert!(matches!(
            secrets.get_or_create_secret("../escape"),
            Err(StateError::InvalidId(_))
        ));
    }

    #[test]
    fn test_similar_ids_do_not_clobber_each_other() {
        let dir = tempdir().unwrap();
        let (tmp_like, _) = store(dir.path()).get_or_create_secret("a.tmp").unwrap();
        assert_eq!(store(dir.path()).list_ids().unwrap(), vec!["a.tmp"]);

        store(dir.path()).get_or_create_secret("a").unwrap();

        let reopened = store(dir.path());
        assert_eq!(reopened.find_secret("a.tmp").unwrap(), Some(tmp_like));
        assert_eq!(reopened.list_ids().unwrap(), vec!["a", "a.tmp"]);
    }

    #[test]
    fn test_hidden_id_rejected() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            store(dir.path()).get_or_create_secret(".staging-kube"),
            Err(StateError::InvalidId(_))
        ));
    }
}
