//! Capability tags gating model fragments

use crate::config::{Cloud, ClusterConfig};
use std::collections::BTreeSet;

/// Every tag a model may test with `HasTag` or a `_tag` directory
pub const DECLARED_TAGS: &[&str] = &[
    "_aws",
    "_gce",
    "_master_asg",
    "_master_single",
    "_master_lb",
    "_not_master_lb",
    "_master_dns",
    "_protokube",
    "_not_protokube",
];

/// Immutable set of capability flags for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    tags: BTreeSet<String>,
}

impl TagSet {
    /// Tags implied by the configuration and topology
    pub fn for_cluster(config: &ClusterConfig, cloud: Cloud) -> Self {
        let mut tags = BTreeSet::new();
        tags.insert(cloud.tag().to_string());

        let protokube = if config.use_protokube() {
            "_protokube"
        } else {
            "_not_protokube"
        };
        tags.insert(protokube.to_string());

        let master = if config.use_master_asg() {
            "_master_asg"
        } else {
            "_master_single"
        };
        tags.insert(master.to_string());

        let lb = if config.use_master_lb() {
            "_master_lb"
        } else {
            "_not_master_lb"
        };
        tags.insert(lb.to_string());

        if config
            .master_public_name
            .as_deref()
            .is_some_and(|n| !n.is_empty())
        {
            tags.insert("_master_dns".to_string());
        }

        Self { tags }
    }

    pub fn from_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// `None` when `tag` is outside the declared vocabulary
    pub fn has(&self, tag: &str) -> Option<bool> {
        if !is_declared(tag) {
            return None;
        }
        Some(self.tags.contains(tag))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }
}

pub fn is_declared(tag: &str) -> bool {
    DECLARED_TAGS.contains(&tag)
}

/// Tags handed to nodeup on the instances
pub fn nodeup_tags(config: &ClusterConfig, cloud: Cloud) -> Vec<String> {
    let mut tags = config.node_up_tags.clone();
    let protokube = if config.use_protokube() {
        "_protokube"
    } else {
        "_not_protokube"
    };
    for tag in ["_jessie", "_debian_family", "_systemd", protokube, cloud.tag()] {
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}
