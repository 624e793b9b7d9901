//! Service mesh reconciliation
//!
//! Steps run in a fixed order on enable:
//!
//! 1. mesh namespace on the master
//! 2. Istio control plane resource on the master
//! 3. one RemoteIstio per remote cluster
//! 4. companion release, once the metrics CRD is served
//!
//! Disable runs the same steps in the same order with every resource
//! desired absent. Each step converges from whatever state it finds, so an
//! interrupted pass is finished by the next one.

use super::config::{MeshConfig, MeshSettings};
use super::{STEP_ISTIO, STEP_NAMESPACE, STEP_UISTIO};
use crate::domain::feature::DesiredState;
use crate::domain::ports::{ClusterRef, DeploymentInstallerRef};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

pub const STATUS_READY: &str = "ready";
pub const STATUS_PENDING: &str = "pending";
pub const STATUS_UNAVAILABLE: &str = "unavailable";

/// One reconciliation pass over a bound mesh configuration
pub struct MeshReconciler {
    pub(crate) config: MeshConfig,
    pub(crate) master: ClusterRef,
    pub(crate) remotes: Vec<ClusterRef>,
    pub(crate) settings: Arc<MeshSettings>,
    pub(crate) installer: DeploymentInstallerRef,
}

impl MeshReconciler {
    /// Resolve the mesh master and remotes from the bound cluster group
    pub fn new(
        config: MeshConfig,
        settings: Arc<MeshSettings>,
        installer: DeploymentInstallerRef,
    ) -> Result<Self> {
        let group = config
            .cluster_group
            .as_ref()
            .ok_or_else(|| Error::Internal("mesh config is not bound to a cluster group".into()))?;

        config.validate(group)?;

        let master = group
            .cluster(config.master_cluster_id)
            .cloned()
            .ok_or_else(|| {
                Error::Validation(format!(
                    "master cluster {} is not part of cluster group {}",
                    config.master_cluster_id, group.name
                ))
            })?;

        let remotes = group
            .clusters()
            .filter(|c| c.id() != master.id())
            .cloned()
            .collect();

        Ok(Self {
            config,
            master,
            remotes,
            settings,
            installer,
        })
    }

    pub fn master(&self) -> &ClusterRef {
        &self.master
    }

    pub fn remotes(&self) -> &[ClusterRef] {
        &self.remotes
    }

    pub fn desired_state(&self) -> DesiredState {
        DesiredState::from(self.config.enabled)
    }

    /// Run all steps, stopping at the first failing one
    pub async fn reconcile(&self) -> Result<()> {
        let desired = self.desired_state();
        let master = self.master.name().to_string();

        info!(
            %desired,
            master = %master,
            remotes = self.remotes.len(),
            "reconciling service mesh"
        );

        let change = self
            .reconcile_namespace(desired)
            .await
            .map_err(|e| e.in_step(STEP_NAMESPACE, &master))?;
        debug!(?change, "namespace reconciled");

        let change = self
            .reconcile_istio(desired)
            .await
            .map_err(|e| e.in_step(STEP_ISTIO, &master))?;
        debug!(?change, "istio reconciled");

        self.reconcile_remote_istios(desired).await?;

        self.reconcile_uistio(desired)
            .await
            .map_err(|e| e.in_step(STEP_UISTIO, &master))?;

        info!(%desired, "service mesh reconciled");
        Ok(())
    }

    /// Status per cluster id, read from the master
    pub async fn members_status(&self) -> BTreeMap<u32, String> {
        let namespace = &self.settings.namespace;
        let mut status = BTreeMap::new();

        let master_status = match self.master.istios(namespace).await {
            Ok(client) => presence(client.get(&self.config.name).await),
            Err(_) => STATUS_UNAVAILABLE.to_string(),
        };
        status.insert(self.master.id(), master_status);

        let remote_client = self.master.remote_istios(namespace).await;
        for remote in &self.remotes {
            let remote_status = match &remote_client {
                Ok(client) => presence(client.get(remote.name()).await),
                Err(_) => STATUS_UNAVAILABLE.to_string(),
            };
            status.insert(remote.id(), remote_status);
        }

        status
    }
}

fn presence<K>(result: Result<Option<K>>) -> String {
    match result {
        Ok(Some(_)) => STATUS_READY,
        Ok(None) => STATUS_PENDING,
        Err(_) => STATUS_UNAVAILABLE,
    }
    .to_string()
}
