//! cloudup command
//!
//! Merges the configuration file with the command-line flags, resolves the
//! kubernetes version and runs the create-cluster flow against the selected
//! target.

pub mod cli;
pub mod create_cluster;
pub mod version;

pub use cli::Cli;
pub use create_cluster::CreateCluster;
