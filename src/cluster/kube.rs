//! Kubernetes adapters for the cluster ports

use crate::crd::{Istio, RemoteIstio};
use crate::domain::cluster::{ClusterGroup, Ipv4Cidrs};
use crate::domain::ports::{Cluster, ClusterRef, ResourceClient, ResourceClientRef};
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Node};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_NODE_POOL_LABEL: &str = "clustergroup.io/nodepool";

/// Pool name for nodes without the node pool label
pub const UNLABELED_POOL: &str = "default";

// =============================================================================
// Resource Client
// =============================================================================

/// [`ResourceClient`] over a typed `kube::Api`
pub struct KubeResourceClient<K> {
    api: Api<K>,
}

impl<K> KubeResourceClient<K>
where
    K: Resource + Clone + DeserializeOwned + Debug,
    <K as Resource>::DynamicType: Default,
{
    pub fn namespaced(client: Client, namespace: &str) -> Self
    where
        K: Resource<Scope = NamespaceResourceScope>,
    {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }

    pub fn cluster_scoped(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait]
impl<K> ResourceClient<K> for KubeResourceClient<K>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug + Send + Sync + 'static,
    <K as Resource>::DynamicType: Default,
{
    async fn get(&self, name: &str) -> Result<Option<K>> {
        Ok(self.api.get_opt(name).await?)
    }

    async fn create(&self, resource: &K) -> Result<K> {
        Ok(self.api.create(&PostParams::default(), resource).await?)
    }

    async fn update(&self, resource: &K) -> Result<K> {
        let name = resource.name_any();
        Ok(self
            .api
            .replace(&name, &PostParams::default(), resource)
            .await?)
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        match self.api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

// =============================================================================
// Descriptors
// =============================================================================

/// How to reach one cluster, as written in the cluster group file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDescriptor {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub cloud: String,
    #[serde(default)]
    pub distribution: String,

    /// Kubeconfig context, current context when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// Kubeconfig file, default lookup when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,

    /// Pod ranges; read from node specs when empty
    #[serde(default)]
    pub pod_cidrs: Vec<String>,

    #[serde(default)]
    pub service_cidrs: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_pool_label: Option<String>,
}

/// Cluster group file contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterGroupDescriptor {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub organization_id: u32,
    pub master: ClusterDescriptor,
    #[serde(default)]
    pub members: Vec<ClusterDescriptor>,
}

impl ClusterGroupDescriptor {
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let descriptor: Self = serde_yaml::from_str(contents)?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await?;
        Self::from_yaml(&contents)
    }

    fn validate(&self) -> Result<()> {
        let mut ids = BTreeSet::new();
        for cluster in std::iter::once(&self.master).chain(self.members.iter()) {
            if cluster.id == 0 {
                return Err(Error::Configuration(format!(
                    "cluster {} has no id",
                    cluster.name
                )));
            }
            if !ids.insert(cluster.id) {
                return Err(Error::Configuration(format!(
                    "duplicate cluster id {} in cluster group {}",
                    cluster.id, self.name
                )));
            }
        }
        Ok(())
    }

    /// Connect to every cluster of the group
    pub async fn connect(&self) -> Result<ClusterGroup> {
        let master: ClusterRef = Arc::new(KubeCluster::connect(self.master.clone()).await?);

        let mut members = Vec::with_capacity(self.members.len());
        for descriptor in &self.members {
            let member: ClusterRef = Arc::new(KubeCluster::connect(descriptor.clone()).await?);
            members.push(member);
        }

        info!(
            cluster_group = %self.name,
            clusters = members.len() + 1,
            "cluster group connected"
        );

        Ok(ClusterGroup::new(
            self.id,
            self.name.clone(),
            self.organization_id,
            master,
            members,
        ))
    }
}

// =============================================================================
// Cluster
// =============================================================================

/// A cluster reached through a kubeconfig
pub struct KubeCluster {
    descriptor: ClusterDescriptor,
    client: Client,
}

impl KubeCluster {
    pub async fn connect(descriptor: ClusterDescriptor) -> Result<Self> {
        let options = KubeConfigOptions {
            context: descriptor.context.clone(),
            ..Default::default()
        };

        let mut config = match &descriptor.kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    Error::Configuration(format!(
                        "failed to read kubeconfig {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Config::from_custom_kubeconfig(kubeconfig, &options).await
            }
            None => Config::from_kubeconfig(&options).await,
        }
        .map_err(|e| {
            Error::Configuration(format!(
                "failed to load kubeconfig for cluster {}: {}",
                descriptor.name, e
            ))
        })?;

        config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
        config.read_timeout = Some(DEFAULT_READ_TIMEOUT);
        let client = Client::try_from(config)?;

        debug!(cluster = %descriptor.name, id = descriptor.id, "cluster client created");
        Ok(Self::from_client(descriptor, client))
    }

    pub fn from_client(descriptor: ClusterDescriptor, client: Client) -> Self {
        Self { descriptor, client }
    }

    pub fn descriptor(&self) -> &ClusterDescriptor {
        &self.descriptor
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        Ok(nodes.list(&ListParams::default()).await?.items)
    }

    fn node_pool_label(&self) -> &str {
        self.descriptor
            .node_pool_label
            .as_deref()
            .unwrap_or(DEFAULT_NODE_POOL_LABEL)
    }
}

#[async_trait]
impl Cluster for KubeCluster {
    fn id(&self) -> u32 {
        self.descriptor.id
    }

    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn cloud(&self) -> &str {
        &self.descriptor.cloud
    }

    fn distribution(&self) -> &str {
        &self.descriptor.distribution
    }

    fn kube_context(&self) -> Option<&str> {
        self.descriptor.context.as_deref()
    }

    fn kubeconfig_path(&self) -> Option<&Path> {
        self.descriptor.kubeconfig.as_deref()
    }

    async fn ipv4_cidrs(&self) -> Result<Ipv4Cidrs> {
        let pod_ip_ranges = if self.descriptor.pod_cidrs.is_empty() {
            node_pod_cidrs(&self.list_nodes().await?)
        } else {
            self.descriptor.pod_cidrs.clone()
        };

        Ok(Ipv4Cidrs::new(
            pod_ip_ranges,
            self.descriptor.service_cidrs.clone(),
        ))
    }

    async fn node_names(&self) -> Result<BTreeMap<String, Vec<String>>> {
        Ok(group_node_names(&self.list_nodes().await?, self.node_pool_label()))
    }

    async fn namespaces(&self) -> Result<ResourceClientRef<Namespace>> {
        Ok(Arc::new(KubeResourceClient::cluster_scoped(self.client.clone())))
    }

    async fn custom_resource_definitions(
        &self,
    ) -> Result<ResourceClientRef<CustomResourceDefinition>> {
        Ok(Arc::new(KubeResourceClient::cluster_scoped(self.client.clone())))
    }

    async fn istios(&self, namespace: &str) -> Result<ResourceClientRef<Istio>> {
        Ok(Arc::new(KubeResourceClient::namespaced(
            self.client.clone(),
            namespace,
        )))
    }

    async fn remote_istios(&self, namespace: &str) -> Result<ResourceClientRef<RemoteIstio>> {
        Ok(Arc::new(KubeResourceClient::namespaced(
            self.client.clone(),
            namespace,
        )))
    }
}

/// Distinct IPv4 pod ranges assigned to nodes
fn node_pod_cidrs(nodes: &[Node]) -> Vec<String> {
    let mut cidrs = BTreeSet::new();
    for spec in nodes.iter().filter_map(|n| n.spec.as_ref()) {
        cidrs.extend(spec.pod_cidrs.iter().flatten().cloned());
        cidrs.extend(spec.pod_cidr.iter().cloned());
    }
    cidrs.into_iter().filter(|c| !c.contains(':')).collect()
}

/// Node names keyed by the value of the node pool label
fn group_node_names(nodes: &[Node], label: &str) -> BTreeMap<String, Vec<String>> {
    let mut pools: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for node in nodes {
        let pool = node
            .labels()
            .get(label)
            .cloned()
            .unwrap_or_else(|| UNLABELED_POOL.to_string());
        pools.entry(pool).or_default().push(node.name_any());
    }
    pools
}
