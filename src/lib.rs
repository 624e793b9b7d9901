//! Cluster Group Operator - Feature Reconciliation Engine
//!
//! Manages optional features of a cluster group (a set of Kubernetes
//! clusters managed as a unit). Each feature is a plugin that validates its
//! properties and converges the clusters to the persisted desired state.
//! The service mesh feature federates the group into one Istio mesh.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                          Feature Manager                           │
//! │        enable / update / disable / reconcile / disable-all         │
//! ├───────────────────────┬──────────────────────┬─────────────────────┤
//! │   Feature Registry    │  Feature Repository  │   Feature Handlers  │
//! │  (name -> handler)    │  (memory / file)     │   (servicemesh)     │
//! ├───────────────────────┴──────────────────────┴─────────────────────┤
//! │                         Mesh Reconciler                            │
//! │  namespace -> Istio -> RemoteIstio per remote -> uistio release    │
//! ├────────────────────────────────────────────────────────────────────┤
//! │     Cluster Adapters (kube)       │   Deployment Installer (helm)  │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`features`]: Registry, manager and repositories
//! - [`mesh`]: Service mesh feature handler and reconciler
//! - [`cluster`]: Kubernetes cluster adapters
//! - [`deployment`]: Helm deployment installer
//! - [`crd`]: Istio custom resources
//! - [`backoff`]: Constant backoff for bounded waits
//! - [`domain`]: Core domain types and ports
//! - [`error`]: Error types and handling

pub mod backoff;
pub mod cluster;
pub mod crd;
pub mod deployment;
pub mod domain;
pub mod error;
pub mod features;
pub mod mesh;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use crate::backoff::ConstantBackoffConfig;

pub use cluster::{ClusterDescriptor, ClusterGroupDescriptor, KubeCluster};

pub use crd::{Istio, IstioSpec, RemoteIstio, RemoteIstioSpec};

pub use deployment::HelmInstaller;

pub use domain::cluster::{ClusterGroup, Ipv4Cidrs};
pub use domain::feature::{DesiredState, Feature, FeatureRecord, FeatureResponse};
pub use domain::ports::{
    Cluster, ClusterRef, DeploymentInstaller, DeploymentRequest, FeatureHandler,
    FeatureRepository, ResourceClient,
};

pub use error::{Error, ErrorAction, FeatureFailure, Result};

pub use features::{FeatureManager, FeatureRegistry, FileFeatureRepository, MemoryFeatureRepository};

pub use mesh::{MeshConfig, MeshSettings, ServiceMeshFeatureHandler};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
