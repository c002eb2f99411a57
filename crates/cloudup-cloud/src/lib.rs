//! cloudup cloud boundary
//!
//! Everything the task engine knows about a provider's control plane:
//!
//! - **attributes**: flat, ordered attribute maps for desired and live state
//! - **action**: the change model (`Change`, `Plan`) and the single
//!   `compute_change` function every target uses
//! - **api**: the `CloudApi` trait a provider binding implements
//! - **control_plane**: a file-backed implementation used for direct and
//!   dry-run execution

pub mod action;
pub mod api;
pub mod attributes;
pub mod control_plane;
pub mod error;

// Re-exports
pub use action::{Change, ChangeType, FieldChange, Plan, PlanSummary, compute_change};
pub use api::{CloudApi, LiveResource};
pub use attributes::{Attributes, display_value, to_attributes};
pub use control_plane::LocalControlPlane;
pub use error::{CloudError, Result};
