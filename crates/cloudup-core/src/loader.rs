//! Model loader
//!
//! Walks the model directories in order, expands each fragment as a template
//! and decodes the resulting `kind/name` entries into tasks. A directory
//! named `_tag` is only entered when `HasTag(_tag)` holds.
//!
//! `*.options` files in the same tree carry configuration defaults; they are
//! collected by [`Loader::build_options`] before any task is built.

use crate::config::ClusterConfig;
use crate::error::LoadError;
use crate::registry::Registry;
use crate::task::{TaskKey, TaskMap};
use crate::template::{Capabilities, describe_tera_error};
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tera::{Context, Tera};
use tracing::{debug, info};

/// Expands model directories into a [`TaskMap`]
#[derive(Debug)]
pub struct Loader<'a> {
    registry: &'a Registry,
    capabilities: Arc<Capabilities>,
    context: Context,
}

impl<'a> Loader<'a> {
    pub fn new(
        registry: &'a Registry,
        capabilities: Arc<Capabilities>,
        config: &ClusterConfig,
    ) -> Result<Self, LoadError> {
        let context =
            Context::from_serialize(config)
                .map_err(|e| LoadError::Context(describe_tera_error(&e)))?;
        Ok(Self {
            registry,
            capabilities,
            context,
        })
    }

    /// Build the task map; any error discards every task
    #[tracing::instrument(skip(self, model_dirs))]
    pub fn build(&self, model_dirs: &[PathBuf]) -> Result<TaskMap, LoadError> {
        let mut tasks = TaskMap::new();
        for dir in model_dirs {
            debug!(model = %dir.display(), "Loading model directory");
            self.walk(dir, &mut |path| {
                if is_fragment(path) {
                    self.load_fragment(path, &mut tasks)
                } else {
                    if !is_options(path) {
                        debug!(file = %path.display(), "Ignoring non-model file");
                    }
                    Ok(())
                }
            })?;
        }
        info!(
            tasks = tasks.len(),
            models = model_dirs.len(),
            "Built task map"
        );
        Ok(tasks)
    }

    /// Collect configuration defaults from `*.options` files
    ///
    /// Files are expanded like fragments and must hold a mapping of
    /// configuration keys. Later files override earlier ones, so a model
    /// listed after `models/proto` refines its defaults.
    #[tracing::instrument(skip(self, model_dirs))]
    pub fn build_options(&self, model_dirs: &[PathBuf]) -> Result<Mapping, LoadError> {
        let mut options = Mapping::new();
        for dir in model_dirs {
            self.walk(dir, &mut |path| {
                if !is_options(path) {
                    return Ok(());
                }
                let document = self.parse_expanded(path)?;
                match document {
                    Value::Null => {}
                    Value::Mapping(mapping) => {
                        debug!(file = %path.display(), keys = mapping.len(), "Loaded options");
                        options.extend(mapping);
                    }
                    _ => {
                        return Err(LoadError::Parse {
                            path: path.to_path_buf(),
                            message: "expected a mapping of configuration keys".to_string(),
                        });
                    }
                }
                Ok(())
            })?;
        }
        Ok(options)
    }

    /// Visit every file below `dir` in sorted order, entering `_tag`
    /// directories only when the tag holds
    fn walk(
        &self,
        dir: &Path,
        visit: &mut dyn FnMut(&Path) -> Result<(), LoadError>,
    ) -> Result<(), LoadError> {
        for entry in sorted_entries(dir)? {
            let Some(file_name) = entry.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if file_name.starts_with('.') {
                continue;
            }

            if entry.is_dir() {
                if file_name.starts_with('_') {
                    match self.capabilities.has_tag(file_name) {
                        Some(true) => {}
                        Some(false) => {
                            debug!(dir = %entry.display(), "Skipping gated directory");
                            continue;
                        }
                        None => {
                            self.capabilities.take_undeclared();
                            return Err(LoadError::UndeclaredTag {
                                path: entry.clone(),
                                tag: file_name.to_string(),
                            });
                        }
                    }
                }
                self.walk(&entry, visit)?;
            } else {
                visit(&entry)?;
            }
        }
        Ok(())
    }

    fn parse_expanded(&self, path: &Path) -> Result<Value, LoadError> {
        let source = std::fs::read_to_string(path).map_err(|e| LoadError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let expanded = self.expand(path, &source)?;
        serde_yaml::from_str(&expanded).map_err(|e| LoadError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    fn load_fragment(&self, path: &Path, tasks: &mut TaskMap) -> Result<(), LoadError> {
        let mapping = match self.parse_expanded(path)? {
            Value::Null => return Ok(()),
            Value::Mapping(mapping) => mapping,
            _ => {
                return Err(LoadError::Parse {
                    path: path.to_path_buf(),
                    message: "expected a mapping of <type>/<name> keys".to_string(),
                });
            }
        };

        for (raw_key, body) in mapping {
            let raw_key = match raw_key {
                Value::String(s) => s,
                other => {
                    return Err(LoadError::MalformedKey {
                        path: path.to_path_buf(),
                        key: format!("{other:?}"),
                    });
                }
            };
            let key = TaskKey::parse(&raw_key).ok_or_else(|| LoadError::MalformedKey {
                path: path.to_path_buf(),
                key: raw_key.clone(),
            })?;

            let task = self
                .registry
                .decode(&key.kind, &key.name, body)
                .ok_or_else(|| LoadError::UnknownType {
                    path: path.to_path_buf(),
                    kind: key.kind.clone(),
                })?
                .map_err(|message| LoadError::Decode {
                    path: path.to_path_buf(),
                    key: key.clone(),
                    message,
                })?;

            debug!(task = %key, file = %path.display(), "Loaded task");
            tasks.insert(task, path)?;
        }
        Ok(())
    }

    fn expand(&self, path: &Path, source: &str) -> Result<String, LoadError> {
        let mut tera = Tera::default();
        self.capabilities.register(&mut tera);

        let result = tera.render_str(source, &self.context);
        if let Some(tag) = self.capabilities.take_undeclared() {
            return Err(LoadError::UndeclaredTag {
                path: path.to_path_buf(),
                tag,
            });
        }
        result.map_err(|e| LoadError::Template {
            path: path.to_path_buf(),
            message: describe_tera_error(&e),
        })
    }
}

fn is_fragment(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn is_options(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("options")
}

pub(crate) fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let io_err = |e| LoadError::Io {
        path: dir.to_path_buf(),
        source: e,
    };
    let mut entries = std::fs::read_dir(dir)
        .map_err(io_err)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?;
    entries.sort();
    Ok(entries)
}
