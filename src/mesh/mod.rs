//! Service mesh feature
//!
//! Federates the clusters of a group into one Istio mesh: a control plane
//! on the chosen master and a RemoteIstio registration for every other
//! cluster, plus the uistio dashboard.

pub mod config;
pub mod handler;
mod istio;
mod namespace;
pub mod reconciler;
mod remote_istio;
pub mod resource;
mod uistio;

pub use config::{CompanionSettings, MeshConfig, MeshSettings};
pub use handler::ServiceMeshFeatureHandler;
pub use reconciler::{MeshReconciler, STATUS_PENDING, STATUS_READY, STATUS_UNAVAILABLE};
pub use resource::{Change, ExistingPolicy, ManagedResource};

/// Feature name the handler is registered under
pub const FEATURE_NAME: &str = "servicemesh";

pub const CONTROLLER_TOOLS_LABEL: &str = "controller-tools.k8s.io";
pub const CONTROLLER_TOOLS_VERSION: &str = "1.0";
pub const CLUSTER_ID_LABEL: &str = "clustergroup.io/cluster-id";
pub const CLOUD_LABEL: &str = "clustergroup.io/cloud";
pub const DISTRIBUTION_LABEL: &str = "clustergroup.io/distribution";

/// Control plane services exposed to remote clusters
pub const ENABLED_SERVICES: [&str; 3] = ["istio-pilot", "istio-policy", "istio-telemetry"];
pub const REMOTE_SERVICE_PORT: i32 = 65000;

pub(crate) const STEP_NAMESPACE: &str = "namespace";
pub(crate) const STEP_ISTIO: &str = "istio";
pub(crate) const STEP_REMOTE_ISTIO: &str = "remote istio";
pub(crate) const STEP_UISTIO: &str = "uistio";
