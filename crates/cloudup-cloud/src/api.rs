//! Cloud control-plane trait definition

use crate::attributes::Attributes;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provider control plane as seen by tasks
///
/// Direct and dry-run execution both talk to an implementation of this trait;
/// only Direct ever calls the mutating methods.
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// Returns the provider name (e.g., "aws", "gce")
    fn provider(&self) -> &str;

    /// Live state of `kind/name`, if the resource exists
    async fn find(&self, kind: &str, name: &str) -> Result<Option<LiveResource>>;

    /// Create `kind/name` with the given attributes
    async fn create(&self, kind: &str, name: &str, attributes: &Attributes)
    -> Result<LiveResource>;

    /// Converge an existing `kind/name` to the given attributes
    async fn update(&self, kind: &str, name: &str, attributes: &Attributes)
    -> Result<LiveResource>;
}

/// A resource as reported by the control plane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveResource {
    /// Provider-assigned identifier
    pub id: String,

    pub kind: String,

    pub name: String,

    /// Attributes including provider-assigned ones
    pub attributes: Attributes,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}
