//! Cluster group aggregate

use crate::domain::ports::ClusterRef;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Network Ranges
// =============================================================================

/// IPv4 ranges used by a cluster's pods and services
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ipv4Cidrs {
    pub pod_ip_ranges: Vec<String>,
    pub service_cluster_ip_ranges: Vec<String>,
}

impl Ipv4Cidrs {
    pub fn new(pod_ip_ranges: Vec<String>, service_cluster_ip_ranges: Vec<String>) -> Self {
        Self {
            pod_ip_ranges,
            service_cluster_ip_ranges,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pod_ip_ranges.is_empty() && self.service_cluster_ip_ranges.is_empty()
    }

    /// Pod ranges followed by service ranges, comma separated
    pub fn include_ip_ranges(&self) -> String {
        self.pod_ip_ranges
            .iter()
            .chain(self.service_cluster_ip_ranges.iter())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

// =============================================================================
// Cluster Group
// =============================================================================

/// One master cluster plus member clusters, managed as a unit
#[derive(Clone)]
pub struct ClusterGroup {
    pub id: u32,
    pub name: String,
    pub organization_id: u32,
    pub master: ClusterRef,
    pub members: Vec<ClusterRef>,
}

impl ClusterGroup {
    pub fn new(
        id: u32,
        name: impl Into<String>,
        organization_id: u32,
        master: ClusterRef,
        members: Vec<ClusterRef>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            organization_id,
            master,
            members,
        }
    }

    /// All clusters, master first
    pub fn clusters(&self) -> impl Iterator<Item = &ClusterRef> {
        std::iter::once(&self.master).chain(self.members.iter())
    }

    /// Look up any cluster of the group by id
    pub fn cluster(&self, id: u32) -> Option<&ClusterRef> {
        self.clusters().find(|c| c.id() == id)
    }

    pub fn cluster_ids(&self) -> Vec<u32> {
        self.clusters().map(|c| c.id()).collect()
    }
}

impl fmt::Debug for ClusterGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterGroup")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("organization_id", &self.organization_id)
            .field("master", &self.master.name())
            .field(
                "members",
                &self.members.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
