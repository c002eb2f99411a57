//! Resource type registry
//!
//! One registry value is built per run for the selected provider and passed
//! to the loader explicitly.

use crate::error::LoadError;
use crate::task::{ResourceTask, Task};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

type Decoder = Box<dyn Fn(&str, Value) -> Result<Arc<dyn Task>, String> + Send + Sync>;

/// Maps resource-type names to decoders producing fresh tasks
#[derive(Default)]
pub struct Registry {
    decoders: BTreeMap<String, Decoder>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a decoder under `kind`
    pub fn register<F>(&mut self, kind: impl Into<String>, decoder: F) -> Result<(), LoadError>
    where
        F: Fn(&str, Value) -> Result<Arc<dyn Task>, String> + Send + Sync + 'static,
    {
        let kind = kind.into();
        if self.decoders.contains_key(&kind) {
            return Err(LoadError::DuplicateType(kind));
        }
        tracing::trace!(kind = %kind, "Registered resource type");
        self.decoders.insert(kind, Box::new(decoder));
        Ok(())
    }

    /// Register a typed resource under its `KIND`
    pub fn register_type<T: ResourceTask>(&mut self) -> Result<(), LoadError> {
        self.register(T::KIND, |name, body| {
            let body = inject_name(name, body)?;
            let task: T = serde_yaml::from_value(body).map_err(|e| e.to_string())?;
            Ok(Arc::new(task) as Arc<dyn Task>)
        })
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.decoders.contains_key(kind)
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.decoders.keys().map(String::as_str)
    }

    /// Decode a fresh task; `None` when `kind` is not registered
    pub fn decode(
        &self,
        kind: &str,
        name: &str,
        body: Value,
    ) -> Option<Result<Arc<dyn Task>, String>> {
        self.decoders.get(kind).map(|decoder| decoder(name, body))
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("kinds", &self.decoders.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn inject_name(name: &str, body: Value) -> Result<Value, String> {
    let mut mapping = match body {
        Value::Null => Mapping::new(),
        Value::Mapping(mapping) => mapping,
        other => {
            return Err(format!(
                "expected a mapping, found {}",
                match other {
                    Value::Sequence(_) => "a sequence",
                    _ => "a scalar",
                }
            ));
        }
    };
    let key = Value::String("name".into());
    match mapping.get(&key) {
        None => {}
        Some(Value::String(body_name)) if body_name == name => {}
        Some(other) => {
            return Err(format!(
                "name {} in the body does not match the task name {name:?}",
                serde_yaml::to_string(other)
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default()
            ));
        }
    }
    mapping.insert(key, Value::String(name.into()));
    Ok(Value::Mapping(mapping))
}
