//! Domain Ports - Core trait definitions for the cluster group operator
//!
//! These traits define the boundaries between the reconciliation engine and
//! external systems: cluster APIs, feature persistence and deployment
//! tooling. Adapters implement these traits to provide concrete
//! functionality; tests substitute fakes.

use crate::crd::{Istio, RemoteIstio};
use crate::domain::cluster::{ClusterGroup, Ipv4Cidrs};
use crate::domain::feature::{Feature, FeatureRecord};
use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

// =============================================================================
// Resource Client Port
// =============================================================================

/// Name-addressed access to one kind of API object, scoped to a cluster
/// (and namespace, for namespaced kinds)
#[async_trait]
pub trait ResourceClient<K>: Send + Sync
where
    K: Send + Sync + 'static,
{
    /// Fetch an object, `None` if it does not exist
    async fn get(&self, name: &str) -> Result<Option<K>>;

    /// Create a new object
    async fn create(&self, resource: &K) -> Result<K>;

    /// Replace an existing object
    async fn update(&self, resource: &K) -> Result<K>;

    /// Delete an object
    ///
    /// Returns `false` when the object was already gone.
    async fn delete(&self, name: &str) -> Result<bool>;
}

pub type ResourceClientRef<K> = Arc<dyn ResourceClient<K>>;

// =============================================================================
// Cluster Port
// =============================================================================

/// A member cluster as needed by the reconciliation engine
#[async_trait]
pub trait Cluster: Send + Sync {
    fn id(&self) -> u32;

    fn name(&self) -> &str;

    fn cloud(&self) -> &str;

    fn distribution(&self) -> &str;

    /// Kubeconfig context used by external tooling
    fn kube_context(&self) -> Option<&str> {
        None
    }

    /// Kubeconfig file used by external tooling
    fn kubeconfig_path(&self) -> Option<&Path> {
        None
    }

    /// Pod and service IPv4 ranges
    async fn ipv4_cidrs(&self) -> Result<Ipv4Cidrs>;

    /// Node names keyed by node pool
    async fn node_names(&self) -> Result<BTreeMap<String, Vec<String>>>;

    async fn namespaces(&self) -> Result<ResourceClientRef<Namespace>>;

    async fn custom_resource_definitions(
        &self,
    ) -> Result<ResourceClientRef<CustomResourceDefinition>>;

    async fn istios(&self, namespace: &str) -> Result<ResourceClientRef<Istio>>;

    async fn remote_istios(&self, namespace: &str) -> Result<ResourceClientRef<RemoteIstio>>;
}

pub type ClusterRef = Arc<dyn Cluster>;

// =============================================================================
// Feature Handler Port
// =============================================================================

/// Contract every cluster group feature plugin implements
#[async_trait]
pub trait FeatureHandler: Send + Sync {
    /// Decode and validate proposed properties before they are persisted
    fn validate_properties(&self, cluster_group: &ClusterGroup, properties: &Value) -> Result<()>;

    /// Converge the real world to the persisted feature state
    ///
    /// Must be idempotent.
    async fn reconcile_state(&self, feature: &Feature) -> Result<()>;

    /// Point-in-time status per cluster id
    async fn members_status(&self, feature: &Feature) -> Result<BTreeMap<u32, String>>;

    /// Optional consistency check run before reconciliation
    async fn validate_state(&self, _feature: &Feature) -> Result<()> {
        Ok(())
    }
}

pub type FeatureHandlerRef = Arc<dyn FeatureHandler>;

// =============================================================================
// Feature Repository Port
// =============================================================================

/// Persistence of feature records
///
/// A missing record is reported as [`crate::Error::FeatureNotFound`].
#[async_trait]
pub trait FeatureRepository: Send + Sync {
    async fn get_all_features(&self, cluster_group_id: u32) -> Result<Vec<FeatureRecord>>;

    async fn get_feature(&self, cluster_group_id: u32, name: &str) -> Result<FeatureRecord>;

    async fn save_feature(&self, record: &FeatureRecord) -> Result<()>;
}

pub type FeatureRepositoryRef = Arc<dyn FeatureRepository>;

// =============================================================================
// Deployment Installer Port
// =============================================================================

/// Chart release to install on a cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRequest {
    pub namespace: String,
    pub chart: String,
    pub release_name: String,
    /// YAML values document, may be empty
    pub values: Vec<u8>,
    /// Chart version, latest when empty
    pub version: String,
    /// Block until the release is ready
    pub wait: bool,
}

/// Installs and removes packaged deployments on clusters
#[async_trait]
pub trait DeploymentInstaller: Send + Sync {
    async fn install_deployment(&self, cluster: &dyn Cluster, request: &DeploymentRequest)
        -> Result<()>;

    /// Remove a release; a release that is not installed is not an error
    async fn delete_deployment(
        &self,
        cluster: &dyn Cluster,
        namespace: &str,
        release_name: &str,
    ) -> Result<()>;
}

pub type DeploymentInstallerRef = Arc<dyn DeploymentInstaller>;
