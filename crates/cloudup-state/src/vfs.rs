//! Path-like storage abstraction underneath the state store
//!
//! Paths handed to a [`Vfs`] are relative, `/`-separated locations such as
//! `pki/issued/ca.crt`. The local filesystem implementation maps them onto a
//! root directory; remote object stores can implement the same trait.

use crate::error::{Result, StateError};
use std::fmt;
use std::io::Write as _;
use std::path::{Path, PathBuf};

/// Minimal storage operations the CA and secret stores rely on
pub trait Vfs: Send + Sync + fmt::Debug {
    /// Read a file, returning `None` when it does not exist
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>>;

    /// Write a file atomically, replacing any previous content
    fn write(&self, path: &str, data: &[u8]) -> Result<()>;

    /// List the file names directly inside a directory (sorted)
    fn list(&self, dir: &str) -> Result<Vec<String>>;

    /// Human readable location, used in logs and errors
    fn location(&self) -> String;
}

/// Local filesystem storage rooted at a directory
#[derive(Debug, Clone)]
pub struct FsVfs {
    root: PathBuf,
}

impl FsVfs {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        path.split('/')
            .filter(|p| !p.is_empty())
            .fold(self.root.clone(), |acc, part| acc.join(part))
    }
}

impl Vfs for FsVfs {
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let full = self.resolve(path);
        match std::fs::read(&full) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StateError::io(full, e)),
        }
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StateError::io(parent, e))?;
        }

        // Stage in a hidden file next to the target then rename, so readers
        // never see a partial file. Ids never start with '.', so staging names
        // cannot collide with stored entries.
        let dir = full.parent().unwrap_or(&self.root);
        let mut staged = tempfile::Builder::new()
            .prefix(".staging-")
            .tempfile_in(dir)
            .map_err(|e| StateError::io(dir, e))?;
        staged
            .write_all(data)
            .map_err(|e| StateError::io(staged.path(), e))?;
        staged
            .persist(&full)
            .map_err(|e| StateError::io(&full, e.error))?;

        tracing::debug!(path = %full.display(), bytes = data.len(), "Wrote state file");
        Ok(())
    }

    fn list(&self, dir: &str) -> Result<Vec<String>> {
        let full = self.resolve(dir);
        let entries = match std::fs::read_dir(&full) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StateError::io(full, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StateError::io(&full, e))?;
            let is_file = entry
                .file_type()
                .map_err(|e| StateError::io(entry.path(), e))?
                .is_file();
            if !is_file {
                continue;
            }
            if let Some(name) = entry.file_name().to_str()
                && !name.starts_with('.')
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn location(&self) -> String {
        self.root.display().to_string()
    }
}

/// Reject ids that would escape their directory or shadow staging files
pub(crate) fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || id.contains('/') || id.contains('\\') || id.starts_with('.') {
        return Err(StateError::InvalidId(id.to_string()));
    }
    Ok(())
}
