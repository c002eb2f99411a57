//! cloudup engine
//!
//! Turns a directory tree of templated model fragments into a graph of
//! typed resource tasks and realizes it against a target.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────┐   ┌─────────┐   ┌─────────────────────┐
//! │ models/<dir> │──▶│  Loader  │──▶│ TaskMap │──▶│ RunContext (graph + │
//! │ tera + tags  │   │ Registry │   └─────────┘   │ bounded executor)   │
//! └──────────────┘   └──────────┘                 └──────────┬──────────┘
//!                                                            │
//!                         ┌──────────────┬───────────────────┼
//!                         ▼              ▼                   ▼
//!                     Direct          DryRun             Terraform
//!                  (control plane)  (plan only)     (kubernetes.tf.json)
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod keypair;
pub mod loader;
pub mod nodemodel;
pub mod registry;
pub mod tags;
pub mod target;
pub mod task;
pub mod template;

// Re-exports
pub use config::{Cloud, ClusterConfig, NodeUpConfig};
pub use context::{DEFAULT_JOBS, RunContext, RunReport};
pub use error::{ConfigError, DependencyError, Error, LoadError, Result, TaskError};
pub use graph::DependencyGraph;
pub use keypair::Keypair;
pub use loader::Loader;
pub use nodemodel::NodeModel;
pub use registry::Registry;
pub use tags::TagSet;
pub use target::{
    DirectTarget, DryRunTarget, Target, TargetKind, TerraformOutput, TerraformProvider,
    TerraformTarget, tf_name, tf_ref,
};
pub use task::{ResourceTask, Task, TaskContext, TaskKey, TaskMap};
pub use template::{Capabilities, TemplateFunction};

/// Register the provider-independent kinds
pub fn register_builtin_tasks(registry: &mut Registry) -> std::result::Result<(), LoadError> {
    registry.register_type::<Keypair>()
}
