//! Flat attribute maps describing desired and live resource state

use crate::error::{CloudError, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Attribute name → value, ordered for stable diffs and output
pub type Attributes = BTreeMap<String, Value>;

/// Serialize a task body into attributes
///
/// Null values are dropped: an unset optional field is not part of the
/// desired state and never produces a diff.
pub fn to_attributes<T: Serialize>(kind: &str, value: &T) -> Result<Attributes> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map.into_iter().filter(|(_, v)| !v.is_null()).collect()),
        _ => Err(CloudError::InvalidAttributes(kind.to_string())),
    }
}

/// Render an attribute value for human output
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
