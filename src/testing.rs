//! In-memory fakes for the domain ports, shared by unit tests

use crate::crd::{Istio, RemoteIstio};
use crate::domain::ports::{
    Cluster, ClusterRef, DeploymentInstaller, DeploymentRequest, ResourceClient,
    ResourceClientRef,
};
use crate::domain::Ipv4Cidrs;
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{Resource, ResourceExt};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Ordered record of calls made against fakes, shared across clusters
#[derive(Debug, Default)]
pub(crate) struct CallLog(Mutex<Vec<String>>);

impl CallLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, entry: String) {
        self.0.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Entries that changed something, reads and client lookups filtered out
    pub fn mutations(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|e| !e.starts_with("get ") && !e.starts_with("open "))
            .collect()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.0.lock().iter().filter(|e| e.starts_with(prefix)).count()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

// =============================================================================
// Resource Client
// =============================================================================

/// Object store keyed by name, logging `<verb> <Kind>/<name>@<cluster>`
pub(crate) struct FakeResourceClient<K> {
    kind: &'static str,
    cluster: String,
    objects: Mutex<BTreeMap<String, K>>,
    log: Arc<CallLog>,
    /// Deletes are acknowledged but the object never goes away
    sticky: Mutex<bool>,
    /// Gets miss every object, as if the cache lagged behind
    stale_reads: Mutex<bool>,
    /// Every call fails with this message
    failure: Mutex<Option<String>>,
}

impl<K> FakeResourceClient<K>
where
    K: Resource + Clone + Send + Sync + 'static,
{
    pub fn new(kind: &'static str, cluster: &str, log: Arc<CallLog>) -> Arc<Self> {
        Arc::new(Self {
            kind,
            cluster: cluster.to_string(),
            objects: Mutex::new(BTreeMap::new()),
            log,
            sticky: Mutex::new(false),
            stale_reads: Mutex::new(false),
            failure: Mutex::new(None),
        })
    }

    pub fn insert(&self, object: K) {
        self.objects.lock().insert(object.name_any(), object);
    }

    pub fn object(&self, name: &str) -> Option<K> {
        self.objects.lock().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn set_sticky(&self, sticky: bool) {
        *self.sticky.lock() = sticky;
    }

    pub fn set_stale_reads(&self, stale: bool) {
        *self.stale_reads.lock() = stale;
    }

    pub fn fail_with(&self, message: &str) {
        *self.failure.lock() = Some(message.to_string());
    }

    fn record(&self, verb: &str, name: &str) -> Result<()> {
        self.log
            .push(format!("{} {}/{}@{}", verb, self.kind, name, self.cluster));
        match self.failure.lock().as_ref() {
            Some(message) => Err(Error::Internal(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<K> ResourceClient<K> for FakeResourceClient<K>
where
    K: Resource + Clone + Send + Sync + 'static,
{
    async fn get(&self, name: &str) -> Result<Option<K>> {
        self.record("get", name)?;
        if *self.stale_reads.lock() {
            return Ok(None);
        }
        Ok(self.object(name))
    }

    async fn create(&self, resource: &K) -> Result<K> {
        let name = resource.name_any();
        self.record("create", &name)?;
        let mut objects = self.objects.lock();
        if objects.contains_key(&name) {
            return Err(Error::ResourceAlreadyExists {
                kind: self.kind.to_string(),
                name,
            });
        }
        objects.insert(name, resource.clone());
        Ok(resource.clone())
    }

    async fn update(&self, resource: &K) -> Result<K> {
        let name = resource.name_any();
        self.record("update", &name)?;
        let mut objects = self.objects.lock();
        if !objects.contains_key(&name) {
            return Err(Error::ResourceNotFound {
                kind: self.kind.to_string(),
                name,
            });
        }
        objects.insert(name, resource.clone());
        Ok(resource.clone())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        self.record("delete", name)?;
        if *self.sticky.lock() {
            return Ok(self.objects.lock().contains_key(name));
        }
        Ok(self.objects.lock().remove(name).is_some())
    }
}

// =============================================================================
// Cluster
// =============================================================================

pub(crate) struct FakeCluster {
    pub id: u32,
    pub name: String,
    pub cidrs: Ipv4Cidrs,
    pub log: Arc<CallLog>,
    pub namespaces: Arc<FakeResourceClient<Namespace>>,
    pub crds: Arc<FakeResourceClient<CustomResourceDefinition>>,
    pub istios: Arc<FakeResourceClient<Istio>>,
    pub remote_istios: Arc<FakeResourceClient<RemoteIstio>>,
}

impl FakeCluster {
    pub fn new(id: u32, name: &str) -> Self {
        Self::with_log(id, name, CallLog::new())
    }

    pub fn with_log(id: u32, name: &str, log: Arc<CallLog>) -> Self {
        Self {
            id,
            name: name.to_string(),
            cidrs: Ipv4Cidrs::new(vec!["10.0.0.0/16".into()], vec!["10.1.0.0/16".into()]),
            namespaces: FakeResourceClient::new("Namespace", name, log.clone()),
            crds: FakeResourceClient::new("CustomResourceDefinition", name, log.clone()),
            istios: FakeResourceClient::new("Istio", name, log.clone()),
            remote_istios: FakeResourceClient::new("RemoteIstio", name, log.clone()),
            log,
        }
    }

    pub fn with_cidrs(mut self, pods: &str, services: &str) -> Self {
        self.cidrs = Ipv4Cidrs::new(vec![pods.into()], vec![services.into()]);
        self
    }

    /// Register a CRD by name so availability waits succeed
    pub fn with_crd(self, name: &str) -> Self {
        let mut crd = CustomResourceDefinition::default();
        crd.metadata.name = Some(name.to_string());
        self.crds.insert(crd);
        self
    }

    pub fn into_ref(self) -> ClusterRef {
        Arc::new(self)
    }
}

#[async_trait]
impl Cluster for FakeCluster {
    fn id(&self) -> u32 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn cloud(&self) -> &str {
        "amazon"
    }

    fn distribution(&self) -> &str {
        "eks"
    }

    async fn ipv4_cidrs(&self) -> Result<Ipv4Cidrs> {
        Ok(self.cidrs.clone())
    }

    async fn node_names(&self) -> Result<BTreeMap<String, Vec<String>>> {
        Ok(BTreeMap::from([(
            "pool1".to_string(),
            vec![format!("{}-node-0", self.name)],
        )]))
    }

    async fn namespaces(&self) -> Result<ResourceClientRef<Namespace>> {
        Ok(self.namespaces.clone())
    }

    async fn custom_resource_definitions(
        &self,
    ) -> Result<ResourceClientRef<CustomResourceDefinition>> {
        Ok(self.crds.clone())
    }

    /// Logged as `open Istio in <namespace>@<cluster>`
    async fn istios(&self, namespace: &str) -> Result<ResourceClientRef<Istio>> {
        self.log
            .push(format!("open Istio in {}@{}", namespace, self.name));
        Ok(self.istios.clone())
    }

    async fn remote_istios(&self, namespace: &str) -> Result<ResourceClientRef<RemoteIstio>> {
        self.log
            .push(format!("open RemoteIstio in {}@{}", namespace, self.name));
        Ok(self.remote_istios.clone())
    }
}

// =============================================================================
// Deployment Installer
// =============================================================================

pub(crate) struct FakeInstaller {
    log: Arc<CallLog>,
}

impl FakeInstaller {
    pub fn new(log: Arc<CallLog>) -> Arc<Self> {
        Arc::new(Self { log })
    }
}

#[async_trait]
impl DeploymentInstaller for FakeInstaller {
    async fn install_deployment(
        &self,
        cluster: &dyn Cluster,
        request: &DeploymentRequest,
    ) -> Result<()> {
        self.log
            .push(format!("install {}@{}", request.release_name, cluster.name()));
        Ok(())
    }

    async fn delete_deployment(
        &self,
        cluster: &dyn Cluster,
        _namespace: &str,
        release_name: &str,
    ) -> Result<()> {
        self.log
            .push(format!("uninstall {}@{}", release_name, cluster.name()));
        Ok(())
    }
}
