//! Cluster adapters
//!
//! Connects the [`crate::domain::ports::Cluster`] port to real clusters
//! described in a cluster group file.

pub mod kube;

pub use self::kube::{
    ClusterDescriptor, ClusterGroupDescriptor, KubeCluster, KubeResourceClient,
    DEFAULT_NODE_POOL_LABEL,
};
