//! Engine error types
//!
//! Every error here is fatal to the run; the first one encountered is
//! reported.

use crate::task::TaskKey;
use cloudup_cloud::CloudError;
use cloudup_state::StateError;
use std::path::PathBuf;
use thiserror::Error;

/// Invalid, conflicting or missing cluster configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("cluster name is required (e.g. mycluster.example.com)")]
    MissingClusterName,

    #[error("cloud provider is required (aws or gce)")]
    MissingCloudProvider,

    #[error("unknown cloud provider {0:?}")]
    UnknownCloudProvider(String),

    #[error("must specify at least one node zone")]
    NoNodeZones,

    #[error("must specify at least one master zone")]
    NoMasterZones,

    #[error("{list} contained a duplicate value: {zone}")]
    DuplicateZone { list: &'static str, zone: String },

    #[error(
        "there should be an odd number of master zones for etcd quorum, got {0}; \
         use --zones and --master-zones to declare node and master zones separately"
    )]
    EvenMasterZones(usize),

    #[error("master zone {0} is not a node zone; all master zones must also be node zones")]
    MasterZoneNotNodeZone(String),

    #[error("invalid zone {0:?}")]
    InvalidZone(String),

    #[error("clusters cannot span multiple regions ({0} and {1})")]
    MultipleRegions(String, String),

    #[error("unknown region {0:?}")]
    UnknownRegion(String),

    #[error("project is required for GCE")]
    MissingProject,

    #[error("SSH public key must be specified when running with AWS")]
    MissingSshKey,

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },

    #[error("unknown configuration option {0}")]
    UnknownOption(String),
}

/// Failure while turning model directories into a task map
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("error reading model {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error expanding template {path}: {message}")]
    Template { path: PathBuf, message: String },

    #[error("tag {tag:?} referenced in {path} is not a declared tag")]
    UndeclaredTag { path: PathBuf, tag: String },

    #[error("error parsing {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("malformed task key {key:?} in {path}: expected <type>/<name>")]
    MalformedKey { path: PathBuf, key: String },

    #[error("unknown resource type {kind:?} in {path}")]
    UnknownType { path: PathBuf, kind: String },

    #[error("error decoding {key} in {path}: {message}")]
    Decode {
        path: PathBuf,
        key: TaskKey,
        message: String,
    },

    #[error("duplicate task {key}: defined in {first} and {second}")]
    DuplicateKey {
        key: TaskKey,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("resource type {0:?} is already registered")]
    DuplicateType(String),

    #[error("configuration cannot be exposed to templates: {0}")]
    Context(String),
}

/// Errors in the declared dependency structure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DependencyError {
    #[error("dependency cycle detected: {}", format_cycle(.0))]
    Cycle(Vec<TaskKey>),

    #[error("{task} depends on {dependency}, which is not defined")]
    MissingDependency { task: TaskKey, dependency: TaskKey },
}

fn format_cycle(path: &[TaskKey]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Failure of a single task against its target
#[derive(Error, Debug)]
pub enum TaskError {
    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("no cloud control plane is available for this target")]
    NoCloud,

    #[error("terraform resource {0} rendered twice")]
    DuplicateTerraformResource(String),

    #[error("{0}")]
    Invalid(String),

    #[error("task panicked: {0}")]
    Panicked(String),
}

/// Top-level engine error
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Dependency(#[from] DependencyError),

    #[error("error running task {task}: {source}")]
    Execution {
        task: TaskKey,
        #[source]
        source: TaskError,
    },

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error("error writing output {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
