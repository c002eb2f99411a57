//! EC2 machine type facts exposed to templates

use cloudup_core::TemplateFunction;
use serde::Serialize;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tera::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MachineTypeInfo {
    pub name: &'static str,
    #[serde(rename = "MemoryGB")]
    pub memory_gb: f32,
    pub cores: u32,
    /// Instance store volume sizes in GB
    pub ephemeral_disks: &'static [u32],
}

const fn machine(
    name: &'static str,
    memory_gb: f32,
    cores: u32,
    ephemeral_disks: &'static [u32],
) -> MachineTypeInfo {
    MachineTypeInfo {
        name,
        memory_gb,
        cores,
        ephemeral_disks,
    }
}

pub const MACHINE_TYPES: &[MachineTypeInfo] = &[
    machine("c3.large", 3.75, 2, &[16, 16]),
    machine("c3.xlarge", 7.5, 4, &[40, 40]),
    machine("c4.large", 3.75, 2, &[]),
    machine("c4.xlarge", 7.5, 4, &[]),
    machine("m3.medium", 3.75, 1, &[4]),
    machine("m3.large", 7.5, 2, &[32]),
    machine("m3.xlarge", 15.0, 4, &[40, 40]),
    machine("m3.2xlarge", 30.0, 8, &[80, 80]),
    machine("m4.large", 8.0, 2, &[]),
    machine("m4.xlarge", 16.0, 4, &[]),
    machine("m4.2xlarge", 32.0, 8, &[]),
    machine("r3.large", 15.25, 2, &[32]),
    machine("r3.xlarge", 30.5, 4, &[80]),
    machine("t2.micro", 1.0, 1, &[]),
    machine("t2.small", 2.0, 1, &[]),
    machine("t2.medium", 4.0, 2, &[]),
    machine("t2.large", 8.0, 2, &[]),
];

pub fn machine_type_info(name: &str) -> Option<&'static MachineTypeInfo> {
    MACHINE_TYPES.iter().find(|m| m.name == name)
}

/// `MachineTypeInfo(type="m3.medium")`
pub fn machine_type_helper() -> TemplateFunction {
    Arc::new(|args: &HashMap<String, Value>| {
        let name = args
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| tera::Error::msg("MachineTypeInfo: missing string argument `type`"))?;
        let info = machine_type_info(name)
            .ok_or_else(|| tera::Error::msg(format!("unknown machine type {name:?}")))?;
        serde_json::to_value(info).map_err(|e| tera::Error::msg(e.to_string()))
    })
}

/// The `index`th /(prefix+3) block of a network (eight per network)
pub fn subnet_cidr(network: &str, index: u32) -> Result<String, String> {
    let (addr, prefix) = network
        .split_once('/')
        .ok_or_else(|| format!("invalid CIDR {network:?}"))?;
    let addr: Ipv4Addr = addr
        .parse()
        .map_err(|_| format!("invalid CIDR {network:?}"))?;
    let prefix: u32 = prefix
        .parse()
        .map_err(|_| format!("invalid CIDR {network:?}"))?;
    if prefix > 32 {
        return Err(format!("invalid CIDR {network:?}"));
    }
    let subnet_prefix = prefix + 3;
    if subnet_prefix > 32 {
        return Err(format!("network {network} is too small to split"));
    }
    if index >= 8 {
        return Err(format!("subnet index {index} out of range for {network}"));
    }

    let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
    let base = u32::from(addr) & mask;
    let subnet = base | (index << (32 - subnet_prefix));
    Ok(format!("{}/{subnet_prefix}", Ipv4Addr::from(subnet)))
}

/// `SubnetCIDR(index=1)` over the cluster network
pub fn subnet_cidr_helper(network: String) -> TemplateFunction {
    Arc::new(move |args: &HashMap<String, Value>| {
        let index = args
            .get("index")
            .and_then(Value::as_u64)
            .ok_or_else(|| tera::Error::msg("SubnetCIDR: missing integer argument `index`"))?;
        let index =
            u32::try_from(index).map_err(|_| tera::Error::msg("SubnetCIDR: index too large"))?;
        subnet_cidr(&network, index)
            .map(Value::String)
            .map_err(tera::Error::msg)
    })
}
