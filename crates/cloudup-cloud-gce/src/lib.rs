//! Google Compute Engine provider for cloudup
//!
//! Kinds: `network`, `firewallRule`, `ipAddress`, `persistentDisk`,
//! `instance`, `instanceTemplate`, `managedInstanceGroup`.

pub mod tasks;
pub mod validate;

pub use tasks::gce_name;
pub use validate::{apply_defaults, validate, zone_region};

use cloudup_core::{LoadError, Registry, TerraformProvider};
use tasks::{compute, network};

pub const PROVIDER: &str = "gce";

pub fn register_tasks(registry: &mut Registry) -> Result<(), LoadError> {
    registry.register_type::<network::Network>()?;
    registry.register_type::<network::FirewallRule>()?;
    registry.register_type::<network::IpAddress>()?;
    registry.register_type::<compute::PersistentDisk>()?;
    registry.register_type::<compute::Instance>()?;
    registry.register_type::<compute::InstanceTemplate>()?;
    registry.register_type::<compute::ManagedInstanceGroup>()?;
    Ok(())
}

pub fn terraform_provider(project: &str, region: &str) -> TerraformProvider {
    TerraformProvider::new("google")
        .with_setting("project", project)
        .with_setting("region", region)
}
